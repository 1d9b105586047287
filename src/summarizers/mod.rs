//! The summarizers explain a CVE, or a writeup, in plain English.
//!
//! A summarizer always answers with text. A provider failure becomes the
//! text of the answer, so a report is never blocked by the summarizer.

pub mod groq;

use async_trait::async_trait;

/// The text used when the summaries are disabled.
pub const DISABLED_TEXT: &str = "Summary disabled for this run.";

/// A common interface between all the summarizers.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Explains a CVE.
    async fn summarize(&self, cve_id: &str, description: &str) -> String;

    /// Explains a writeup related to a CVE.
    async fn classify_writeup(&self, title: &str, content: &str, tags: &[String]) -> String;
}

/// The summarizer used when the summaries are disabled.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _cve_id: &str, _description: &str) -> String {
        DISABLED_TEXT.to_string()
    }

    async fn classify_writeup(&self, _title: &str, _content: &str, _tags: &[String]) -> String {
        DISABLED_TEXT.to_string()
    }
}

/// The prompt asking to explain a CVE.
pub fn cve_prompt(cve_id: &str, description: &str) -> String {
    format!(
        "Explain the vulnerability {cve_id} in detail:\n\
         - Summarize the impact in plain English\n\
         - List affected software/versions if known\n\
         - What type of bug is it? (e.g., RCE, XSS, IDOR)\n\
         - Is there any public proof of concept?\n\
         - Suggest how to detect or mitigate it\n\
         Description: {description}\n"
    )
}

/// The prompt asking to explain a writeup.
pub fn writeup_prompt(title: &str, content: &str, tags: &[String]) -> String {
    format!(
        "Analyze this bug bounty writeup titled \"{}\" with tags: {}.\n\
         - Summarize what vulnerability is discussed\n\
         - Mention any tool or CVE related\n\
         - Suggest how to detect it\n\
         - Provide a one-line takeaway\n\n\
         Content:\n{}\n",
        title,
        tags.join(", "),
        content
    )
}
