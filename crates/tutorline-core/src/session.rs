use crate::clock::{to_chrono, Clock};
use crate::config::SessionConfig;
use crate::topics::{classify, TopicTable};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Provider-facing turn: role and content only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&SessionMessage> for ChatTurn {
    fn from(m: &SessionMessage) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub history: Vec<SessionMessage>,
    pub topics: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Every message ever added; trimming never lowers it.
    pub message_count: u64,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            history: Vec::new(),
            topics: BTreeSet::new(),
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }
}

/// Keep the first two entries as anchor context plus the most recent
/// `max - 2`, preserving order.
pub(crate) fn trim_history<T>(history: &mut Vec<T>, max: usize) {
    if history.len() <= max {
        return;
    }
    let keep_recent = max.saturating_sub(2);
    let drop_end = history.len() - keep_recent;
    history.drain(2.min(drop_end)..drop_end);
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub session_ttl_secs: u64,
    pub max_history_length: usize,
}

/// Rolling per-conversation history, keyed by session.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    config: SessionConfig,
    topics: Arc<TopicTable>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(config: SessionConfig, topics: Arc<TopicTable>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            topics,
            clock,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn topic_table(&self) -> &TopicTable {
        &self.topics
    }

    /// Snapshot of the session, creating an empty one if needed. Touches `last_activity`.
    pub fn get_or_create(&self, session_key: &str) -> Session {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_key.to_string())
            .or_insert_with(|| Session::new(now));
        session.last_activity = now;
        session.clone()
    }

    pub fn add_message(&self, session_key: &str, role: Role, content: &str) {
        let now = self.clock.now();
        let found = classify(content, &self.topics);

        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_key.to_string())
            .or_insert_with(|| Session::new(now));

        session.last_activity = now;
        session.history.push(SessionMessage {
            role,
            content: content.to_string(),
            timestamp: now,
        });
        session.message_count += 1;
        session.topics.extend(found);
        trim_history(&mut session.history, self.config.max_history);
    }

    /// The most recent `max_messages` entries as provider turns.
    pub fn history_for_generation(&self, session_key: &str, max_messages: usize) -> Vec<ChatTurn> {
        let sessions = self.sessions.lock();
        match sessions.get(session_key) {
            None => Vec::new(),
            Some(session) => {
                let start = session.history.len().saturating_sub(max_messages);
                session.history[start..].iter().map(ChatTurn::from).collect()
            }
        }
    }

    /// Full timestamped history, empty when the session does not exist.
    pub fn history(&self, session_key: &str) -> Vec<SessionMessage> {
        self.sessions
            .lock()
            .get(session_key)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// One-line description of what the session has been about, for the
    /// system instruction. `None` until a topic has been seen.
    pub fn context_summary(&self, session_key: &str) -> Option<String> {
        let sessions = self.sessions.lock();
        let session = sessions.get(session_key)?;
        if session.topics.is_empty() {
            return None;
        }

        // Table order first, then anything the table no longer knows about.
        let mut labels: Vec<&str> = self
            .topics
            .rules()
            .iter()
            .filter(|r| session.topics.contains(&r.topic))
            .map(|r| r.label.as_str())
            .collect();
        for topic in &session.topics {
            if self.topics.label_of(topic).is_none() {
                labels.push(topic.as_str());
            }
        }

        Some(format!(
            "[Контекст сессии: обсуждаемые темы — {}. Сообщений: {}]",
            labels.join(", "),
            session.message_count
        ))
    }

    pub fn clear(&self, session_key: &str) -> bool {
        let removed = self.sessions.lock().remove(session_key).is_some();
        if removed {
            log::info!("session {} cleared", session_key);
        }
        removed
    }

    /// Drop sessions idle for longer than the configured TTL.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = to_chrono(self.config.ttl());
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| now.signed_duration_since(s.last_activity) <= ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            log::info!("session cleanup: removed {} expired sessions", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active_sessions: self.len(),
            session_ttl_secs: self.config.ttl_secs,
            max_history_length: self.config.max_history,
        }
    }
}
