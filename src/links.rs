//! Link selection — picking the one actionable URL out of an email.

use std::sync::Arc;

use crate::llm::{CompletionRequest, LlmProvider};

/// Picks the most actionable link from a candidate list.
pub struct LinkSelector {
    llm: Arc<dyn LlmProvider>,
}

impl LinkSelector {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Select one link, or `None` when there are no candidates.
    ///
    /// A single candidate is returned directly without a ranking call.
    /// For multiple candidates the model is asked for a 1-based index;
    /// the index is clamped into range and any parse or call failure
    /// falls back to the first candidate. Failing open to *some* link is
    /// deliberate: a wrong guess merely fails later at fill/submit,
    /// whereas aborting always fails.
    pub async fn select_link<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        match candidates {
            [] => None,
            [only] => Some(only.as_str()),
            _ => {
                let index = self.rank(candidates).await;
                Some(candidates[index - 1].as_str())
            }
        }
    }

    /// Ask the model for a 1-based index, clamped into `[1, len]`.
    async fn rank(&self, candidates: &[String]) -> usize {
        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, url)| format!("{}. {}", i + 1, url))
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest::new(format!(
            "These links were extracted from one email:\n{listing}\n\n\
             Which single link is the actionable one (a check-in, signup, \
             or form to complete)? Answer with just its number."
        ))
        .with_system(
            "You pick the most actionable link from an email. \
             Reply with a single 1-based number and nothing else.",
        );

        let picked = match self.llm.complete(request).await {
            Ok(response) => parse_index(&response.content),
            Err(e) => {
                tracing::warn!("Link ranking call failed, defaulting to first: {e}");
                None
            }
        };

        picked.unwrap_or(1).clamp(1, candidates.len())
    }
}

/// Pull the first integer out of a model reply.
fn parse_index(text: &str) -> Option<usize> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    /// Provider that returns a canned reply and counts calls.
    struct CannedLlm {
        reply: Result<&'static str, ()>,
        calls: AtomicUsize,
    }

    impl CannedLlm {
        fn new(reply: Result<&'static str, ()>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "canned".into(),
                    reason: "down".into(),
                }),
            }
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_candidates_yield_none() {
        let llm = Arc::new(CannedLlm::new(Ok("1")));
        let selector = LinkSelector::new(llm);
        assert!(selector.select_link(&[]).await.is_none());
    }

    #[tokio::test]
    async fn single_candidate_skips_ranking() {
        let llm = Arc::new(CannedLlm::new(Ok("2")));
        let selector = LinkSelector::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);
        let candidates = urls(&["https://a.example/checkin"]);

        let picked = selector.select_link(&candidates).await;
        assert_eq!(picked, Some("https://a.example/checkin"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_index_is_honored() {
        let llm = Arc::new(CannedLlm::new(Ok("The answer is 2.")));
        let selector = LinkSelector::new(llm);
        let candidates = urls(&["https://a.example", "https://b.example", "https://c.example"]);

        assert_eq!(
            selector.select_link(&candidates).await,
            Some("https://b.example")
        );
    }

    #[tokio::test]
    async fn out_of_range_index_is_clamped() {
        let llm = Arc::new(CannedLlm::new(Ok("17")));
        let selector = LinkSelector::new(llm);
        let candidates = urls(&["https://a.example", "https://b.example"]);

        assert_eq!(
            selector.select_link(&candidates).await,
            Some("https://b.example")
        );
    }

    #[tokio::test]
    async fn zero_index_is_clamped_up() {
        let llm = Arc::new(CannedLlm::new(Ok("0")));
        let selector = LinkSelector::new(llm);
        let candidates = urls(&["https://a.example", "https://b.example"]);

        assert_eq!(
            selector.select_link(&candidates).await,
            Some("https://a.example")
        );
    }

    #[tokio::test]
    async fn unparseable_reply_defaults_to_first() {
        let llm = Arc::new(CannedLlm::new(Ok("the second one")));
        let selector = LinkSelector::new(llm);
        let candidates = urls(&["https://a.example", "https://b.example"]);

        // "second" carries no digits, so the default wins.
        assert_eq!(
            selector.select_link(&candidates).await,
            Some("https://a.example")
        );
    }

    #[tokio::test]
    async fn provider_failure_defaults_to_first() {
        let llm = Arc::new(CannedLlm::new(Err(())));
        let selector = LinkSelector::new(llm);
        let candidates = urls(&["https://a.example", "https://b.example"]);

        assert_eq!(
            selector.select_link(&candidates).await,
            Some("https://a.example")
        );
    }

    #[test]
    fn parse_index_finds_first_integer() {
        assert_eq!(parse_index("3"), Some(3));
        assert_eq!(parse_index("  Link #2 looks right"), Some(2));
        assert_eq!(parse_index("none of them"), None);
    }
}
