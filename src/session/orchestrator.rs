//! Drives automation sessions from email to submitted form.
//!
//! The orchestrator owns the whole lifecycle: pick a link, open a browser,
//! fill what it knows, ask the session owner for what it doesn't, submit,
//! and release the browser exactly once on every terminal transition.

use std::collections::HashMap;
use std::sync::Arc;

use crate::browser::BrowserFactory;
use crate::channels::{InboundMessage, NotificationChannel};
use crate::config::AutomationConfig;
use crate::email::EmailContent;
use crate::error::{Result, SessionError};
use crate::fields::{FieldRequest, FieldResolver};
use crate::links::LinkSelector;
use crate::llm::LlmProvider;
use crate::session::model::{AutomationSession, PendingUserInput, SessionStatus};
use crate::session::registry::{SessionHandle, SessionRegistry};
use crate::store::Database;

/// What an advance cycle left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A question went out; the session is parked in `waiting_user`.
    NeedsInput,
    /// The form was submitted and the session is done.
    Completed,
}

/// Whole-message keywords that cancel a waiting session.
const CANCEL_KEYWORDS: &[&str] = &["cancel", "stop", "abort"];

pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn Database>,
    browser_factory: Arc<dyn BrowserFactory>,
    channel: Arc<dyn NotificationChannel>,
    links: LinkSelector,
    config: AutomationConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn Database>,
        browser_factory: Arc<dyn BrowserFactory>,
        channel: Arc<dyn NotificationChannel>,
        llm: Arc<dyn LlmProvider>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            registry,
            store,
            browser_factory,
            channel,
            links: LinkSelector::new(llm),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session for one triage decision.
    ///
    /// The session is registered before any browser work so a second start
    /// for the same decision id is rejected even while this one is still
    /// opening its browser.
    pub async fn start_automation(
        &self,
        decision_id: &str,
        email: &EmailContent,
        owner_id: &str,
        channel_id: &str,
    ) -> Result<AdvanceOutcome> {
        let session = AutomationSession::new(decision_id, &email.id, owner_id, channel_id);
        let handle = self.registry.insert_if_absent(session).await?;

        tracing::info!(
            decision_id = %decision_id,
            email_id = %email.id,
            links = email.links.len(),
            "Starting automation session"
        );

        let url = match self.links.select_link(&email.links).await {
            Some(url) => url.to_string(),
            None => {
                let mut session = handle.lock().await;
                self.finish_error(&mut session, "no actionable link found in the email")
                    .await;
                return Err(SessionError::NoActionableLink {
                    decision_id: decision_id.to_string(),
                }
                .into());
            }
        };

        let driver = match self.browser_factory.open().await {
            Ok(driver) => driver,
            Err(e) => {
                let mut session = handle.lock().await;
                self.finish_error(&mut session, &format!("browser init failed: {e}"))
                    .await;
                return Err(e.into());
            }
        };

        {
            let mut session = handle.lock().await;
            session.driver = Some(driver);
            let nav = match session.driver.as_deref() {
                Some(d) => d.navigate(&url).await,
                None => Ok(()),
            };
            if let Err(e) = nav {
                self.finish_error(&mut session, &format!("navigation failed: {e}"))
                    .await;
                return Err(e.into());
            }
            self.persist(&session).await;
        }

        self.advance(&handle).await
    }

    /// Run one fill/ask/submit cycle against the live page.
    pub async fn advance(&self, handle: &SessionHandle) -> Result<AdvanceOutcome> {
        let mut session = handle.lock().await;

        let missing = self.resolve_fields(&session).await?;
        if let Some(field) = missing.into_iter().next() {
            self.ask(&mut session, field).await?;
            return Ok(AdvanceOutcome::NeedsInput);
        }

        // The first extraction can be stale by the time the fills land;
        // look at the page once more before committing to a submit.
        let recheck = self.missing_fields(&session).await?;
        if let Some(field) = recheck.into_iter().next() {
            tracing::info!(
                decision_id = %session.decision_id,
                field = %field.key,
                "Pre-submit re-check found a missing field"
            );
            self.ask(&mut session, field).await?;
            return Ok(AdvanceOutcome::NeedsInput);
        }

        // Everything required is filled; submit and wait for the page to
        // settle before judging the outcome.
        let no_vars = HashMap::new();
        let submit = match session.driver.as_deref() {
            Some(d) => d.act("submit the form", &no_vars).await,
            None => {
                return Err(SessionError::Stale {
                    decision_id: session.decision_id.clone(),
                }
                .into())
            }
        };
        if let Err(e) = submit {
            self.finish_error(&mut session, &format!("submission failed: {e}"))
                .await;
            return Err(SessionError::Submission {
                reason: e.to_string(),
            }
            .into());
        }
        if let Some(driver) = session.driver.as_deref() {
            if let Err(e) = driver
                .act(
                    "wait until a confirmation message or a validation error is visible",
                    &no_vars,
                )
                .await
            {
                tracing::debug!("Post-submit wait did not settle cleanly: {e}");
            }
        }

        // Submission may have bounced back with validation errors; if
        // required fields resurfaced, go back to asking.
        let after_submit = self.resolve_fields(&session).await?;
        if let Some(field) = after_submit.into_iter().next() {
            tracing::info!(
                decision_id = %session.decision_id,
                field = %field.key,
                "Form bounced after submit, asking again"
            );
            self.ask(&mut session, field).await?;
            return Ok(AdvanceOutcome::NeedsInput);
        }

        let summary = self.extract_summary(&session).await;
        self.finish_completed(&mut session, summary).await;
        Ok(AdvanceOutcome::Completed)
    }

    /// Route an inbound message. Returns `true` when the message answered
    /// a pending question (or cancelled a session) and was consumed.
    pub async fn handle_inbound(&self, message: &InboundMessage) -> Result<bool> {
        let Some(pending) = self.registry.take_matching_pending(message).await else {
            return Ok(false);
        };

        let Some(handle) = self.registry.get(&pending.decision_id).await else {
            tracing::warn!(
                decision_id = %pending.decision_id,
                "Answer arrived for a session that no longer exists"
            );
            let _ = self
                .channel
                .send(
                    &message.channel,
                    "That request is no longer active, so I can't use this answer.",
                )
                .await;
            return Err(SessionError::Stale {
                decision_id: pending.decision_id,
            }
            .into());
        };

        {
            let mut session = handle.lock().await;
            if session.status != SessionStatus::WaitingUser {
                tracing::warn!(
                    decision_id = %session.decision_id,
                    status = %session.status,
                    "Answer arrived but the session isn't waiting"
                );
                return Err(SessionError::Stale {
                    decision_id: session.decision_id.clone(),
                }
                .into());
            }

            let answer = message.content.trim();
            if CANCEL_KEYWORDS
                .iter()
                .any(|kw| answer.eq_ignore_ascii_case(kw))
            {
                self.finish_cancelled(&mut session).await;
                return Ok(true);
            }

            apply_answer(&mut session.context, &pending.field.key, answer);
            session.pending_field = None;
            if let Err(e) = session.transition_to(SessionStatus::Running) {
                return Err(e.into());
            }
            self.persist(&session).await;
            tracing::info!(
                decision_id = %session.decision_id,
                field = %pending.field.key,
                "Answer applied, resuming"
            );
        }

        self.advance(&handle).await?;
        Ok(true)
    }

    // ── Internals ──

    /// Fill known values and list what is still missing.
    async fn resolve_fields(&self, session: &AutomationSession) -> Result<Vec<FieldRequest>> {
        let Some(driver) = session.driver.as_deref() else {
            return Err(SessionError::Stale {
                decision_id: session.decision_id.clone(),
            }
            .into());
        };
        FieldResolver::new(driver)
            .fill_known_fields(&session.context)
            .await;
        self.missing_fields(session).await
    }

    /// List required fields still empty on the page, without filling.
    /// Extraction failures degrade to "nothing missing" so a flaky page
    /// read never kills the session.
    async fn missing_fields(&self, session: &AutomationSession) -> Result<Vec<FieldRequest>> {
        let Some(driver) = session.driver.as_deref() else {
            return Err(SessionError::Stale {
                decision_id: session.decision_id.clone(),
            }
            .into());
        };
        match FieldResolver::new(driver).find_missing_fields().await {
            Ok(missing) => Ok(missing),
            Err(e) => {
                tracing::warn!(
                    decision_id = %session.decision_id,
                    "Field extraction failed, proceeding as if none are missing: {e}"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Park the session on a question to its owner.
    async fn ask(&self, session: &mut AutomationSession, field: FieldRequest) -> Result<()> {
        let repeat = session.last_requested_key.as_deref() == Some(field.key.as_str());
        let question = if repeat {
            format!("{} {}", field.question, self.config.repeat_hint)
        } else {
            field.question.clone()
        };

        session.transition_to(SessionStatus::WaitingUser)?;

        let prompt = match self.channel.send(&session.channel, &question).await {
            Ok(prompt) => prompt,
            Err(e) => {
                self.finish_error(session, &format!("could not reach the session owner: {e}"))
                    .await;
                return Err(e.into());
            }
        };

        session.last_requested_key = Some(field.key.clone());
        session.pending_field = Some(field.clone());

        let displaced = self
            .registry
            .set_pending(PendingUserInput {
                decision_id: session.decision_id.clone(),
                owner_id: session.owner_id.clone(),
                field,
                channel: session.channel.clone(),
                prompt,
            })
            .await;
        if let Some(old) = displaced {
            tracing::warn!(
                owner = %old.owner_id,
                superseded = %old.decision_id,
                by = %session.decision_id,
                "Displacing an earlier pending question"
            );
            let _ = self
                .channel
                .send(
                    &old.channel,
                    &format!(
                        "Never mind the earlier question about \"{}\" for now, a newer request needs your attention first.",
                        old.field.question
                    ),
                )
                .await;
        }

        self.persist(session).await;
        Ok(())
    }

    /// Pull a result summary off the confirmation page, tolerantly.
    async fn extract_summary(&self, session: &AutomationSession) -> String {
        let Some(driver) = session.driver.as_deref() else {
            return "Form submitted.".to_string();
        };

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "reference": { "type": "string" }
            }
        });
        let summary = match driver
            .extract(
                "Summarize the confirmation shown on this page in one sentence. \
                 Include any confirmation or reference number as `reference`.",
                &schema,
            )
            .await
        {
            Ok(value) => {
                let text = value
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Form submitted.")
                    .to_string();
                match value.get("reference").and_then(|v| v.as_str()) {
                    Some(r) if !r.is_empty() => format!("{text} (ref: {r})"),
                    _ => text,
                }
            }
            Err(e) => {
                tracing::debug!("Confirmation extraction failed: {e}");
                "Form submitted.".to_string()
            }
        };

        if self.config.screenshot_on_complete {
            match driver.screenshot().await {
                Ok(bytes) => {
                    tracing::debug!(bytes = bytes.len(), "Captured confirmation screenshot")
                }
                Err(e) => tracing::debug!("Confirmation screenshot failed: {e}"),
            }
        }

        summary
    }

    async fn finish_completed(&self, session: &mut AutomationSession, summary: String) {
        session.summary = Some(summary.clone());
        if let Err(e) = session.transition_to(SessionStatus::Completed) {
            tracing::error!(decision_id = %session.decision_id, "Completion transition refused: {e}");
        }
        self.release(session).await;
        let _ = self
            .channel
            .send(&session.channel, &format!("Done: {summary}"))
            .await;
        tracing::info!(decision_id = %session.decision_id, "Session completed");
    }

    async fn finish_error(&self, session: &mut AutomationSession, reason: &str) {
        session.error = Some(reason.to_string());
        if let Err(e) = session.transition_to(SessionStatus::Error) {
            tracing::error!(decision_id = %session.decision_id, "Error transition refused: {e}");
        }
        self.release(session).await;
        let _ = self
            .channel
            .send(
                &session.channel,
                &format!("I couldn't finish this automatically: {reason}"),
            )
            .await;
        tracing::warn!(decision_id = %session.decision_id, reason = %reason, "Session failed");
    }

    async fn finish_cancelled(&self, session: &mut AutomationSession) {
        if let Err(e) = session.transition_to(SessionStatus::Cancelled) {
            tracing::error!(decision_id = %session.decision_id, "Cancel transition refused: {e}");
        }
        self.release(session).await;
        let _ = self
            .channel
            .send(
                &session.channel,
                "Cancelled. The browser session has been released.",
            )
            .await;
        tracing::info!(decision_id = %session.decision_id, "Session cancelled by owner");
    }

    /// Terminal bookkeeping: close the browser exactly once, persist the
    /// final snapshot, and drop the session and any question tied to it.
    async fn release(&self, session: &mut AutomationSession) {
        if let Some(driver) = session.take_driver() {
            if let Err(e) = driver.close().await {
                tracing::warn!(decision_id = %session.decision_id, "Browser close failed: {e}");
            }
        }
        self.persist(session).await;
        self.registry.clear_pending_for(&session.decision_id).await;
        self.registry.remove(&session.decision_id).await;
    }

    /// Mirror the session into the store. The store is an audit trail,
    /// not the control plane, so failures are logged and swallowed.
    async fn persist(&self, session: &AutomationSession) {
        if let Err(e) = self.store.upsert_run(&session.snapshot()).await {
            tracing::warn!(
                decision_id = %session.decision_id,
                "Failed to persist session snapshot: {e}"
            );
        }
    }
}

/// Store an answer in the session context, deriving name parts when the
/// owner hands over a full name in one message.
fn apply_answer(context: &mut HashMap<String, String>, key: &str, answer: &str) {
    context.insert(key.to_string(), answer.to_string());

    if is_person_name_key(key) {
        let parts: Vec<&str> = answer.split_whitespace().collect();
        if parts.len() >= 2 {
            context
                .entry("first_name".to_string())
                .or_insert_with(|| parts[0].to_string());
            context
                .entry("last_name".to_string())
                .or_insert_with(|| parts[parts.len() - 1].to_string());
        }
    }
}

/// Does this context key ask for a person's whole name?
///
/// `full_name`, `name`, `your_name`, `applicant_name` qualify; keys that
/// name an organization or account (`company_name`, `user_name`) and
/// keys already scoped to one part (`first_name`, `last_name`) do not.
fn is_person_name_key(key: &str) -> bool {
    let tokens: Vec<&str> = key.split('_').collect();
    if !tokens.contains(&"name") {
        return false;
    }
    const NON_PERSON: &[&str] = &[
        "company", "organization", "business", "employer", "user", "account", "host", "domain",
        "file", "first", "last", "middle",
    ];
    !tokens.iter().any(|t| NON_PERSON.contains(t))
}
