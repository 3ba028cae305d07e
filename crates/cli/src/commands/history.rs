use std::sync::Arc;

use cartkeeper_agent::ConversationMemoryStore;
use cartkeeper_core::UserId;
use cartkeeper_db::SqlConversationRepository;
use serde_json::json;

use crate::commands::{execute, open_pool, storage_failure, to_data, CommandResult, Failure};

pub fn run(user_id: &str) -> CommandResult {
    let user_id = UserId::from(user_id.trim());

    execute("history", |config| async move {
        if user_id.as_str().is_empty() {
            return Err(("invalid_input", "user id is required".to_string(), 8));
        }
        let pool = open_pool(&config).await?;
        let memory = ConversationMemoryStore::new(
            Arc::new(SqlConversationRepository::new(pool.clone())),
            config.memory.context_window,
        );

        let entries = memory.history(&user_id).await.map_err(storage_failure)?;
        let context = memory.recent_context(&user_id).await.map_err(storage_failure)?;
        pool.close().await;

        let data = json!({
            "user_id": user_id,
            "entries": to_data(&entries)?,
            "recent_context": context,
        });
        Ok::<_, Failure>(CommandResult::success_with_data(
            "history",
            format!("{} conversation entr(ies) for {user_id}", entries.len()),
            Some(data),
        ))
    })
}
