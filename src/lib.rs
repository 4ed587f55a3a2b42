//! FormFlow — email-to-form automation core.
//!
//! Takes an actionable link out of an email, drives a remote browser
//! session to fill and submit the form behind it, and asks a human over a
//! notification channel for anything it cannot infer, resuming when they
//! answer.

pub mod browser;
pub mod channels;
pub mod config;
pub mod email;
pub mod error;
pub mod fields;
pub mod links;
pub mod llm;
pub mod session;
pub mod store;
