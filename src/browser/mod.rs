//! Remote browser capability surface.
//!
//! The orchestrator consumes this trait; it never reimplements browser
//! automation itself. A driver handle is exclusively owned by one
//! automation session for its whole lifetime and must be closed on every
//! terminal transition.

pub mod remote;

pub use remote::{RemoteBrowserFactory, RemoteDriver};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BrowserError;

/// A live browser page handle.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Load a URL in the page.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Execute a natural-language UI action. `variables` are substituted
    /// by the driver so sensitive values never appear in the instruction.
    async fn act(
        &self,
        instruction: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(), BrowserError>;

    /// Extract structured data from the current page against a JSON schema.
    async fn extract(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BrowserError>;

    /// Capture a screenshot of the current page.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Tear down the remote session. Idempotent on the remote side.
    async fn close(&self) -> Result<(), BrowserError>;

    /// Public replay/live-view URL for the session, if the bridge has one.
    fn session_url(&self) -> Option<String> {
        None
    }

    /// Debugger URL for the session, if the bridge has one.
    fn debug_url(&self) -> Option<String> {
        None
    }
}

/// Creates fresh driver handles, one per automation session.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserDriver>, BrowserError>;
}
