use std::sync::Arc;

use cartkeeper_agent::ConversationMemoryStore;
use cartkeeper_core::UserId;
use cartkeeper_db::SqlConversationRepository;

use crate::commands::{execute, open_pool, storage_failure, CommandResult, Failure};

/// Empties a user's conversation log. The cart is left alone.
pub fn run(user_id: &str) -> CommandResult {
    let user_id = UserId::from(user_id.trim());

    execute("forget", |config| async move {
        if user_id.as_str().is_empty() {
            return Err(("invalid_input", "user id is required".to_string(), 8));
        }
        let pool = open_pool(&config).await?;
        let memory = ConversationMemoryStore::new(
            Arc::new(SqlConversationRepository::new(pool.clone())),
            config.memory.context_window,
        );

        let forgotten = memory.history(&user_id).await.map_err(storage_failure)?.len();
        memory.clear(&user_id).await.map_err(storage_failure)?;
        pool.close().await;

        Ok::<_, Failure>(CommandResult::success(
            "forget",
            format!("cleared {forgotten} conversation entr(ies) for {user_id}"),
        ))
    })
}
