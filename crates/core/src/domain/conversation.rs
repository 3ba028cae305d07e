use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cart::UserId;

/// Oldest entries are evicted once a log grows past this many turns.
pub const MAX_CONVERSATION_ENTRIES: usize = 50;

/// How many of the most recent turns `recent_context` renders by default.
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;

const RESPONSE_PREVIEW_CHARS: usize = 150;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub agent_response: String,
}

impl ConversationEntry {
    pub fn new(user_input: impl Into<String>, agent_response: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_input: user_input.into(),
            agent_response: agent_response.into(),
        }
    }
}

/// Bounded, append-only record of one user's turns, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLog {
    entries: VecDeque<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ConversationEntry>) -> Self {
        let mut log = Self::new();
        for entry in entries {
            log.push(entry);
        }
        log
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.iter()
    }

    pub fn append(&mut self, user_input: impl Into<String>, agent_response: impl Into<String>) {
        self.push(ConversationEntry::new(user_input, agent_response));
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > MAX_CONVERSATION_ENTRIES {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Renders the memory block fed to the dialogue layer.
    ///
    /// The assistant side of each turn is cut to its first 150 characters and
    /// always followed by `...`, whether or not anything was cut.
    pub fn recent_context(&self, user_id: &UserId, window: usize) -> String {
        let mut context = format!("=== MEMORY ABOUT {} ===\n", user_id.as_str().to_uppercase());

        if !self.entries.is_empty() && window > 0 {
            context.push_str("RECENT CONVERSATION HISTORY:\n");
            let skip = self.entries.len().saturating_sub(window);
            for (index, entry) in self.entries.iter().skip(skip).enumerate() {
                context.push_str(&format!("{}. User: {}\n", index + 1, entry.user_input));
                context.push_str(&format!(
                    "   Assistant: {}...\n",
                    preview(&entry.agent_response, RESPONSE_PREVIEW_CHARS)
                ));
            }
            context.push('\n');
        }

        context.push_str("=== END OF MEMORY ===\n");
        context
    }
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConversationEntry, ConversationLog, DEFAULT_CONTEXT_WINDOW, MAX_CONVERSATION_ENTRIES,
    };
    use crate::domain::cart::UserId;

    #[test]
    fn log_is_capped_to_most_recent_entries() {
        let mut log = ConversationLog::new();
        for turn in 0..(MAX_CONVERSATION_ENTRIES + 5) {
            log.append(format!("question {turn}"), format!("answer {turn}"));
        }

        assert_eq!(log.len(), MAX_CONVERSATION_ENTRIES);
        let first = log.entries().next().expect("first entry");
        assert_eq!(first.user_input, "question 5");
        let last = log.entries().last().expect("last entry");
        assert_eq!(last.user_input, format!("question {}", MAX_CONVERSATION_ENTRIES + 4));
    }

    #[test]
    fn empty_log_renders_header_and_footer_only() {
        let log = ConversationLog::new();
        let context = log.recent_context(&UserId::from("alice"), DEFAULT_CONTEXT_WINDOW);

        assert_eq!(context, "=== MEMORY ABOUT ALICE ===\n=== END OF MEMORY ===\n");
    }

    #[test]
    fn context_numbers_the_last_three_turns() {
        let mut log = ConversationLog::new();
        for turn in 1..=5 {
            log.append(format!("q{turn}"), format!("a{turn}"));
        }

        let context = log.recent_context(&UserId::from("bob"), DEFAULT_CONTEXT_WINDOW);

        assert_eq!(
            context,
            "=== MEMORY ABOUT BOB ===\n\
             RECENT CONVERSATION HISTORY:\n\
             1. User: q3\n   Assistant: a3...\n\
             2. User: q4\n   Assistant: a4...\n\
             3. User: q5\n   Assistant: a5...\n\
             \n\
             === END OF MEMORY ===\n"
        );
    }

    #[test]
    fn long_responses_are_truncated_on_character_boundaries() {
        let mut log = ConversationLog::new();
        let response = "₹".repeat(200);
        log.append("price?", response);

        let context = log.recent_context(&UserId::from("carol"), DEFAULT_CONTEXT_WINDOW);
        let line = context
            .lines()
            .find(|line| line.starts_with("   Assistant: "))
            .expect("assistant line");
        let body = line.trim_start_matches("   Assistant: ").trim_end_matches("...");

        assert_eq!(body.chars().count(), 150);
    }

    #[test]
    fn log_serializes_as_plain_array() {
        let log = ConversationLog::from_entries([ConversationEntry::new("hi", "hello")]);
        let value = serde_json::to_value(&log).expect("serialize");

        assert!(value.is_array());
        assert_eq!(value[0]["user_input"], "hi");

        let restored: ConversationLog = serde_json::from_value(value).expect("deserialize");
        assert_eq!(restored, log);
    }
}
