//! In-memory registry of live sessions and outstanding questions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channels::InboundMessage;
use crate::error::SessionError;
use crate::session::model::{AutomationSession, PendingUserInput};

/// Shared handle to one live session.
pub type SessionHandle = Arc<Mutex<AutomationSession>>;

/// Tracks live sessions by decision id and pending questions by owner.
///
/// Enforces two invariants: at most one live session per decision id, and
/// at most one outstanding question per owner.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    pending: Mutex<HashMap<String, PendingUserInput>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session, rejecting a duplicate decision id.
    pub async fn insert_if_absent(
        &self,
        session: AutomationSession,
    ) -> Result<SessionHandle, SessionError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.decision_id) {
            return Err(SessionError::AlreadyRunning {
                decision_id: session.decision_id,
            });
        }
        let decision_id = session.decision_id.clone();
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(decision_id, Arc::clone(&handle));
        Ok(handle)
    }

    pub async fn get(&self, decision_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(decision_id).cloned()
    }

    /// Drop a session once it reaches a terminal status.
    pub async fn remove(&self, decision_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.remove(decision_id)
    }

    /// Record the outstanding question for an owner.
    ///
    /// Returns the previous question if one was displaced; the caller is
    /// expected to notify its channel that it was superseded.
    pub async fn set_pending(&self, input: PendingUserInput) -> Option<PendingUserInput> {
        self.pending
            .lock()
            .await
            .insert(input.owner_id.clone(), input)
    }

    /// Find the pending question (if any) that an inbound message answers,
    /// removing it from the registry. A message that matches no pending
    /// question leaves the registry untouched.
    pub async fn take_matching_pending(
        &self,
        message: &InboundMessage,
    ) -> Option<PendingUserInput> {
        let mut pending = self.pending.lock().await;
        let entry = pending.get(&message.author_id)?;
        if !entry.matches(message) {
            return None;
        }
        pending.remove(&message.author_id)
    }

    /// Drop the pending question tied to a session, if any. Used when the
    /// session dies while waiting so a later reply isn't consumed.
    pub async fn clear_pending_for(&self, decision_id: &str) {
        self.pending
            .lock()
            .await
            .retain(|_, p| p.decision_id != decision_id);
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::channels::MessageRef;
    use crate::fields::FieldRequest;

    fn session(decision_id: &str) -> AutomationSession {
        AutomationSession::new(decision_id, "e1", "u1", "chan")
    }

    fn pending(decision_id: &str, owner: &str, channel: &str) -> PendingUserInput {
        PendingUserInput {
            decision_id: decision_id.into(),
            owner_id: owner.into(),
            field: FieldRequest {
                key: "email".into(),
                label: "Email".into(),
                placeholder: String::new(),
                name: String::new(),
                field_type: String::new(),
                question: "What should I enter for \"Email\"?".into(),
            },
            channel: channel.into(),
            prompt: MessageRef {
                channel: channel.into(),
                message_id: "m-1".into(),
            },
        }
    }

    fn reply(author: &str, channel: &str) -> InboundMessage {
        InboundMessage {
            channel: channel.into(),
            author_id: author.into(),
            content: "Jane".into(),
            reply_to: None,
            thread_parent: None,
        }
    }

    #[tokio::test]
    async fn duplicate_decision_id_is_rejected() {
        let registry = SessionRegistry::new();
        registry.insert_if_absent(session("d1")).await.unwrap();
        // The handle type has no Debug impl, so match instead of unwrap_err.
        assert!(matches!(
            registry.insert_if_absent(session("d1")).await,
            Err(SessionError::AlreadyRunning { .. })
        ));
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn remove_frees_the_decision_id() {
        let registry = SessionRegistry::new();
        registry.insert_if_absent(session("d1")).await.unwrap();
        registry.remove("d1").await.unwrap();
        assert!(registry.get("d1").await.is_none());
        // A fresh attempt for the same decision may now start.
        registry.insert_if_absent(session("d1")).await.unwrap();
    }

    #[tokio::test]
    async fn set_pending_displaces_previous_owner_entry() {
        let registry = SessionRegistry::new();
        assert!(registry.set_pending(pending("d1", "u1", "c1")).await.is_none());
        let displaced = registry.set_pending(pending("d2", "u1", "c2")).await.unwrap();
        assert_eq!(displaced.decision_id, "d1");
    }

    #[tokio::test]
    async fn take_matching_pending_consumes_only_matches() {
        let registry = SessionRegistry::new();
        registry.set_pending(pending("d1", "u1", "c1")).await;

        // Wrong channel, no reply linkage: not consumed.
        assert!(registry.take_matching_pending(&reply("u1", "c9")).await.is_none());
        // Different author: not consumed.
        assert!(registry.take_matching_pending(&reply("u2", "c1")).await.is_none());
        // Matching author + channel: consumed exactly once.
        assert!(registry.take_matching_pending(&reply("u1", "c1")).await.is_some());
        assert!(registry.take_matching_pending(&reply("u1", "c1")).await.is_none());
    }

    #[tokio::test]
    async fn clear_pending_for_targets_one_session() {
        let registry = SessionRegistry::new();
        registry.set_pending(pending("d1", "u1", "c1")).await;
        registry.set_pending(pending("d2", "u2", "c2")).await;

        registry.clear_pending_for("d1").await;
        assert!(registry.take_matching_pending(&reply("u1", "c1")).await.is_none());
        assert!(registry.take_matching_pending(&reply("u2", "c2")).await.is_some());
    }
}
