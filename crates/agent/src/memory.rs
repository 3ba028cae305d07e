use std::sync::Arc;

use tracing::{debug, warn};

use cartkeeper_core::{ApplicationError, ConversationEntry, ConversationLog, UserId};
use cartkeeper_db::ConversationRepository;

/// Per-user conversation log backed by a [`ConversationRepository`].
pub struct ConversationMemoryStore {
    repository: Arc<dyn ConversationRepository>,
    context_window: usize,
}

impl ConversationMemoryStore {
    pub fn new(repository: Arc<dyn ConversationRepository>, context_window: usize) -> Self {
        Self { repository, context_window }
    }

    /// Appends one turn and persists the capped log. Returns the new length.
    pub async fn append(
        &self,
        user_id: &UserId,
        user_input: &str,
        agent_response: &str,
    ) -> Result<usize, ApplicationError> {
        let mut log = self.load(user_id).await?;
        log.append(user_input, agent_response);
        let version = self.repository.save(user_id, &log).await?;
        debug!(
            event_name = "memory.turn_recorded",
            user_id = %user_id,
            version,
            entries = log.len(),
            "conversation turn recorded"
        );
        Ok(log.len())
    }

    pub async fn recent_context(&self, user_id: &UserId) -> Result<String, ApplicationError> {
        self.recent_context_with_window(user_id, self.context_window).await
    }

    pub async fn recent_context_with_window(
        &self,
        user_id: &UserId,
        window: usize,
    ) -> Result<String, ApplicationError> {
        Ok(self.load(user_id).await?.recent_context(user_id, window))
    }

    pub async fn history(&self, user_id: &UserId) -> Result<Vec<ConversationEntry>, ApplicationError> {
        Ok(self.load(user_id).await?.entries().cloned().collect())
    }

    pub async fn clear(&self, user_id: &UserId) -> Result<(), ApplicationError> {
        self.repository.save(user_id, &ConversationLog::new()).await?;
        debug!(event_name = "memory.cleared", user_id = %user_id, "conversation log cleared");
        Ok(())
    }

    async fn load(&self, user_id: &UserId) -> Result<ConversationLog, ApplicationError> {
        match self.repository.find_by_user(user_id).await {
            Ok(log) => Ok(log.unwrap_or_default()),
            Err(error) if error.is_decode() => {
                warn!(
                    event_name = "memory.record_discarded",
                    user_id = %user_id,
                    error = %error,
                    "stored conversation log is invalid; starting empty"
                );
                Ok(ConversationLog::new())
            }
            Err(error) => Err(error.into()),
        }
    }
}
