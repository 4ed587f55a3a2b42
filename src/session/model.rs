//! Session state machine types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::BrowserDriver;
use crate::channels::{InboundMessage, MessageRef};
use crate::error::SessionError;
use crate::fields::FieldRequest;

/// Status of an automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Actively filling/submitting.
    Running,
    /// Suspended on a question to the session owner.
    WaitingUser,
    /// Form submitted, summary available.
    Completed,
    /// Unrecoverable failure.
    Error,
    /// Owner cancelled while waiting.
    Cancelled,
}

impl SessionStatus {
    /// Check if this status allows transitioning to another.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;

        matches!(
            (self, target),
            (Running, WaitingUser) | (Running, Completed) | (Running, Error) |
            // An answer puts the session back to work; cancel is only
            // reachable while waiting.
            (WaitingUser, Running) | (WaitingUser, Cancelled) | (WaitingUser, Error)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::WaitingUser => "waiting_user",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One in-flight automation attempt.
///
/// Exclusively owns its browser handle; the handle must be taken and
/// closed on every terminal transition.
pub struct AutomationSession {
    pub decision_id: String,
    pub email_id: String,
    /// The human who may be asked questions.
    pub owner_id: String,
    /// Channel questions are asked on.
    pub channel: String,
    pub status: SessionStatus,
    /// Values accumulated from user answers, keyed by normalized field key.
    pub context: HashMap<String, String>,
    pub pending_field: Option<FieldRequest>,
    /// Key of the last field we asked about, for repeat detection.
    pub last_requested_key: Option<String>,
    pub driver: Option<Box<dyn BrowserDriver>>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationSession {
    pub fn new(
        decision_id: impl Into<String>,
        email_id: impl Into<String>,
        owner_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            email_id: email_id.into(),
            owner_id: owner_id.into(),
            channel: channel.into(),
            status: SessionStatus::Running,
            context: HashMap::new(),
            pending_field: None,
            last_requested_key: None,
            driver: None,
            summary: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Transition to a new status.
    pub fn transition_to(&mut self, target: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(target) {
            return Err(SessionError::InvalidTransition {
                decision_id: self.decision_id.clone(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Take the browser handle for release. Returns `None` if it was
    /// already taken, so close runs at most once.
    pub fn take_driver(&mut self) -> Option<Box<dyn BrowserDriver>> {
        self.driver.take()
    }

    /// Durable snapshot for audit/crash-recovery/UI display.
    pub fn snapshot(&self) -> AutomationRun {
        let (session_url, debug_url) = match &self.driver {
            Some(d) => (d.session_url(), d.debug_url()),
            None => (None, None),
        };
        AutomationRun {
            decision_id: self.decision_id.clone(),
            email_id: self.email_id.clone(),
            status: self.status,
            session_url,
            debug_url,
            pending_field: self.pending_field.clone(),
            summary: self.summary.clone(),
            error: self.error.clone(),
            context: self.context.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// A single outstanding question waiting on one specific human.
#[derive(Debug, Clone)]
pub struct PendingUserInput {
    /// Back-reference to the session; does not own it.
    pub decision_id: String,
    pub owner_id: String,
    pub field: FieldRequest,
    /// Channel the question was asked on.
    pub channel: String,
    /// The question message itself, preferred for direct-reply routing.
    pub prompt: MessageRef,
}

impl PendingUserInput {
    /// Decide whether an inbound message answers this question.
    ///
    /// True when the message is in the same channel as the prompt, is a
    /// direct reply to the prompt message, or is a thread whose parent is
    /// the prompt's channel. Anything else is ordinary chat and must not
    /// be consumed as form data.
    pub fn matches(&self, message: &InboundMessage) -> bool {
        if message.channel == self.prompt.channel {
            return true;
        }
        if message.reply_to.as_deref() == Some(self.prompt.message_id.as_str()) {
            return true;
        }
        if message.thread_parent.as_deref() == Some(self.prompt.channel.as_str()) {
            return true;
        }
        false
    }
}

/// Persisted mirror of a session's state, written at every transition.
///
/// Not authoritative for live control flow — the in-memory session is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRun {
    pub decision_id: String,
    pub email_id: String,
    pub status: SessionStatus,
    pub session_url: Option<String>,
    pub debug_url: Option<String>,
    pub pending_field: Option<FieldRequest>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub context: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(key: &str) -> FieldRequest {
        FieldRequest {
            key: key.to_string(),
            label: key.to_string(),
            placeholder: String::new(),
            name: String::new(),
            field_type: String::new(),
            question: format!("What should I enter for \"{key}\"?"),
        }
    }

    fn pending() -> PendingUserInput {
        PendingUserInput {
            decision_id: "d1".into(),
            owner_id: "u1".into(),
            field: field("email"),
            channel: "chan-9".into(),
            prompt: MessageRef {
                channel: "chan-9".into(),
                message_id: "m-42".into(),
            },
        }
    }

    fn message(channel: &str, reply_to: Option<&str>, thread_parent: Option<&str>) -> InboundMessage {
        InboundMessage {
            channel: channel.to_string(),
            author_id: "u1".to_string(),
            content: "hi".to_string(),
            reply_to: reply_to.map(str::to_string),
            thread_parent: thread_parent.map(str::to_string),
        }
    }

    #[test]
    fn status_transitions_valid() {
        use SessionStatus::*;
        assert!(Running.can_transition_to(WaitingUser));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));
        assert!(WaitingUser.can_transition_to(Running));
        assert!(WaitingUser.can_transition_to(Cancelled));
        assert!(WaitingUser.can_transition_to(Error));
    }

    #[test]
    fn status_transitions_invalid() {
        use SessionStatus::*;
        // Cancel is only reachable while waiting on the user.
        assert!(!Running.can_transition_to(Cancelled));
        assert!(!WaitingUser.can_transition_to(Completed));
        for terminal in [Completed, Error, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Running));
            assert!(!terminal.can_transition_to(WaitingUser));
        }
    }

    #[test]
    fn session_transition_updates_status() {
        let mut session = AutomationSession::new("d1", "e1", "u1", "chan");
        assert_eq!(session.status, SessionStatus::Running);
        session.transition_to(SessionStatus::WaitingUser).unwrap();
        assert_eq!(session.status, SessionStatus::WaitingUser);
        let err = session.transition_to(SessionStatus::Completed).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[test]
    fn take_driver_is_one_shot() {
        let mut session = AutomationSession::new("d1", "e1", "u1", "chan");
        assert!(session.take_driver().is_none());
        // With no driver attached both takes are None; the orchestrator
        // relies on take() returning None the second time.
        assert!(session.take_driver().is_none());
    }

    #[test]
    fn routing_same_channel_matches() {
        assert!(pending().matches(&message("chan-9", None, None)));
    }

    #[test]
    fn routing_direct_reply_matches() {
        assert!(pending().matches(&message("elsewhere", Some("m-42"), None)));
    }

    #[test]
    fn routing_thread_of_prompt_channel_matches() {
        assert!(pending().matches(&message("thread-1", None, Some("chan-9"))));
    }

    #[test]
    fn routing_unrelated_message_does_not_match() {
        assert!(!pending().matches(&message("elsewhere", Some("m-99"), Some("other"))));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut session = AutomationSession::new("d1", "e1", "u1", "chan");
        session.context.insert("email".into(), "a@b.com".into());
        session.pending_field = Some(field("email"));
        let run = session.snapshot();

        let json = serde_json::to_string(&run).unwrap();
        let back: AutomationRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decision_id, "d1");
        assert_eq!(back.status, SessionStatus::Running);
        assert_eq!(back.context["email"], "a@b.com");
        assert_eq!(back.pending_field.unwrap().key, "email");
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&SessionStatus::WaitingUser).unwrap();
        assert_eq!(json, "\"waiting_user\"");
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionStatus::WaitingUser);
    }
}
