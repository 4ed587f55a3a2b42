//! Email ingestion — what the orchestrator needs from a triaged email.
//!
//! The triage pipeline that decided this email should be automated is an
//! external collaborator; all we take from it is an id, an owner, and the
//! candidate links.

use std::sync::OnceLock;

use mail_parser::MessageParser;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The slice of an email the orchestrator works with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailContent {
    /// Channel-native email id.
    pub id: String,
    pub subject: Option<String>,
    pub from: Option<String>,
    /// Candidate links in order of appearance, deduplicated.
    pub links: Vec<String>,
}

impl EmailContent {
    pub fn new(id: impl Into<String>, links: Vec<String>) -> Self {
        Self {
            id: id.into(),
            subject: None,
            from: None,
            links,
        }
    }

    /// Parse a raw RFC 822 message and harvest its links.
    ///
    /// Links come from `href` attributes in the HTML body plus bare URLs
    /// in the text body. Returns `None` when the bytes aren't a parseable
    /// message at all.
    pub fn parse(id: impl Into<String>, raw: &[u8]) -> Option<Self> {
        let message = MessageParser::default().parse(raw)?;

        let subject = message.subject().map(str::to_string);
        let from = message
            .from()
            .and_then(|a| a.first())
            .and_then(|addr| addr.address())
            .map(str::to_string);

        let mut corpus = String::new();
        if let Some(html) = message.body_html(0) {
            corpus.push_str(&html);
            corpus.push('\n');
        }
        if let Some(text) = message.body_text(0) {
            corpus.push_str(&text);
        }

        Some(Self {
            id: id.into(),
            subject,
            from,
            links: extract_links(&corpus),
        })
    }
}

/// Harvest http(s) links from a blob of HTML and/or plain text,
/// deduplicated in order of appearance.
pub fn extract_links(corpus: &str) -> Vec<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let href = HREF.get_or_init(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("static regex"));
    let bare =
        BARE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>)\]]+"#).expect("static regex"));

    let mut links = Vec::new();
    let mut push = |raw: &str| {
        let url = raw.trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return;
        }
        if !links.iter().any(|existing| existing == url) {
            links.push(url.to_string());
        }
    };

    for cap in href.captures_iter(corpus) {
        push(&cap[1]);
    }
    for m in bare.find_iter(corpus) {
        push(m.as_str());
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hrefs_and_bare_urls() {
        let corpus = r#"<a href="https://a.example/checkin?c=1">Check in</a>
            Or paste this: https://b.example/form."#;
        let links = extract_links(corpus);
        assert_eq!(
            links,
            vec![
                "https://a.example/checkin?c=1".to_string(),
                "https://b.example/form".to_string(),
            ]
        );
    }

    #[test]
    fn dedupes_preserving_order() {
        let corpus = r#"<a href="https://a.example">x</a> https://a.example https://b.example"#;
        let links = extract_links(corpus);
        assert_eq!(links, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn ignores_mailto_and_fragments() {
        let corpus = r##"<a href="mailto:x@y.com">mail</a> <a href="#top">top</a>"##;
        assert!(extract_links(corpus).is_empty());
    }

    #[test]
    fn strips_trailing_punctuation() {
        let links = extract_links("see https://a.example/x, then stop");
        assert_eq!(links, vec!["https://a.example/x"]);
    }

    #[test]
    fn parses_raw_message() {
        let raw = b"From: Airline <noreply@air.example>\r\n\
            To: jane@example.com\r\n\
            Subject: Check in now\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            Check in here: https://air.example/checkin/ABC123\r\n";

        let email = EmailContent::parse("msg-1", raw).unwrap();
        assert_eq!(email.subject.as_deref(), Some("Check in now"));
        assert_eq!(email.from.as_deref(), Some("noreply@air.example"));
        assert_eq!(email.links, vec!["https://air.example/checkin/ABC123"]);
    }

    #[test]
    fn email_with_no_links_parses_to_empty() {
        let raw = b"Subject: hi\r\n\r\njust words\r\n";
        let email = EmailContent::parse("msg-2", raw).unwrap();
        assert!(email.links.is_empty());
    }
}
