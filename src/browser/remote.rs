//! HTTP driver for a Browserbase/Stagehand-style session bridge.
//!
//! The bridge exposes a session API: `POST /v1/sessions` creates a remote
//! page and returns its id plus replay/debug URLs; per-session endpoints
//! accept natural-language `act` instructions and schema-driven `extract`
//! requests; `DELETE` releases the remote browser.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::browser::{BrowserDriver, BrowserFactory};
use crate::config::BrowserConfig;
use crate::error::BrowserError;

/// Factory that opens sessions against the bridge.
pub struct RemoteBrowserFactory {
    config: BrowserConfig,
    client: reqwest::Client,
}

impl RemoteBrowserFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    id: String,
    #[serde(default)]
    session_url: Option<String>,
    #[serde(default)]
    debug_url: Option<String>,
}

#[async_trait]
impl BrowserFactory for RemoteBrowserFactory {
    async fn open(&self) -> Result<Box<dyn BrowserDriver>, BrowserError> {
        let resp = self
            .client
            .post(format!("{}/v1/sessions", self.config.api_base))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| BrowserError::Init {
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BrowserError::Init {
                reason: format!("session create returned {status}: {body}"),
            });
        }

        let created: CreateSessionResponse =
            resp.json().await.map_err(|e| BrowserError::Init {
                reason: format!("bad session create response: {e}"),
            })?;

        tracing::info!(session_id = %created.id, "Remote browser session opened");

        Ok(Box::new(RemoteDriver {
            client: self.client.clone(),
            base: format!("{}/v1/sessions/{}", self.config.api_base, created.id),
            api_key: self.config.api_key.clone(),
            session_url: created.session_url,
            debug_url: created.debug_url,
        }))
    }
}

/// One live remote page.
pub struct RemoteDriver {
    client: reqwest::Client,
    base: String,
    api_key: secrecy::SecretString,
    session_url: Option<String>,
    debug_url: Option<String>,
}

impl RemoteDriver {
    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}/{path}", self.base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
    }
}

/// Read an error body without masking the HTTP status.
async fn status_and_body(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    format!("{status}: {body}")
}

#[async_trait]
impl BrowserDriver for RemoteDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let resp = self
            .post("navigate", serde_json::json!({ "url": url }))
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: status_and_body(resp).await,
            });
        }
        Ok(())
    }

    async fn act(
        &self,
        instruction: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(), BrowserError> {
        let resp = self
            .post(
                "act",
                serde_json::json!({ "instruction": instruction, "variables": variables }),
            )
            .await
            .map_err(|e| BrowserError::Act {
                instruction: instruction.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(BrowserError::Act {
                instruction: instruction.to_string(),
                reason: status_and_body(resp).await,
            });
        }
        Ok(())
    }

    async fn extract(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BrowserError> {
        let resp = self
            .post(
                "extract",
                serde_json::json!({ "prompt": prompt, "schema": schema }),
            )
            .await
            .map_err(|e| BrowserError::Extraction {
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(BrowserError::Extraction {
                reason: status_and_body(resp).await,
            });
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| BrowserError::Extraction {
            reason: format!("malformed extract response: {e}"),
        })?;

        // Bridges wrap the result in {"data": ...}; tolerate a bare object too.
        Ok(body.get("data").cloned().unwrap_or(body))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let resp = self
            .post("screenshot", serde_json::json!({}))
            .await
            .map_err(|e| BrowserError::Screenshot {
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(BrowserError::Screenshot {
                reason: status_and_body(resp).await,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| BrowserError::Screenshot {
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let resp = self
            .client
            .delete(&self.base)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| BrowserError::Close {
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(BrowserError::Close {
                reason: status_and_body(resp).await,
            });
        }
        tracing::debug!(session = %self.base, "Remote browser session closed");
        Ok(())
    }

    fn session_url(&self) -> Option<String> {
        self.session_url.clone()
    }

    fn debug_url(&self) -> Option<String> {
        self.debug_url.clone()
    }
}
