use crate::session::{ChatTurn, Role, SessionStore};
use std::sync::Arc;

/// What the provider sees besides the new message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    pub history: Vec<ChatTurn>,
    /// Appended to the system instruction, never to the history.
    pub summary: Option<String>,
}

/// Derives provider context from a session.
pub trait ContextBuilder: Send + Sync {
    /// `pending` is the user message about to be sent. It has already been
    /// recorded in the session and must not be repeated in the history.
    fn build(&self, session_key: &str, pending: &str) -> ConversationContext;
}

/// Recent history slice plus the session's topic summary.
pub struct SessionContextBuilder {
    sessions: Arc<SessionStore>,
    max_messages: usize,
}

impl SessionContextBuilder {
    pub fn new(sessions: Arc<SessionStore>, max_messages: usize) -> Self {
        Self {
            sessions,
            max_messages,
        }
    }
}

impl ContextBuilder for SessionContextBuilder {
    fn build(&self, session_key: &str, pending: &str) -> ConversationContext {
        let mut history = self
            .sessions
            .history_for_generation(session_key, self.max_messages + 1);

        let ends_with_pending = history
            .last()
            .map(|t| t.role == Role::User && t.content == pending)
            .unwrap_or(false);
        if ends_with_pending {
            history.pop();
        }
        if history.len() > self.max_messages {
            history.drain(..history.len() - self.max_messages);
        }

        ConversationContext {
            history,
            summary: self.sessions.context_summary(session_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SessionConfig;
    use crate::topics::{TopicRule, TopicTable};

    fn sessions() -> Arc<SessionStore> {
        let topics = Arc::new(TopicTable::new(vec![TopicRule::new(
            "python",
            "Python",
            &["python"],
        )]));
        Arc::new(SessionStore::new(
            SessionConfig::default(),
            topics,
            Arc::new(ManualClock::default()),
        ))
    }

    #[test]
    fn test_pending_message_not_duplicated() {
        let store = sessions();
        store.add_message("s", Role::User, "q1");
        store.add_message("s", Role::Assistant, "a1");
        store.add_message("s", Role::User, "what is python");

        let ctx = SessionContextBuilder::new(store, 10).build("s", "what is python");
        assert_eq!(
            ctx.history,
            vec![ChatTurn::user("q1"), ChatTurn::assistant("a1")]
        );
        assert!(ctx.summary.unwrap().contains("Python"));
    }

    #[test]
    fn test_history_bounded() {
        let store = sessions();
        for i in 0..8 {
            store.add_message("s", Role::User, &format!("q{}", i));
            store.add_message("s", Role::Assistant, &format!("a{}", i));
        }
        store.add_message("s", Role::User, "next");

        let ctx = SessionContextBuilder::new(store, 4).build("s", "next");
        let contents: Vec<_> = ctx.history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q6", "a6", "q7", "a7"]);
        assert!(ctx.summary.is_none());
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let ctx = SessionContextBuilder::new(sessions(), 4).build("nope", "hi");
        assert_eq!(ctx, ConversationContext::default());
    }
}
