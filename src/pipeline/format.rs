//! Email rendering for a finished summary.

use crate::agent::guard;
use crate::types::NewsDigest;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Subject plus plain-text and HTML bodies of one digest email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Why a summary was refused at formatting time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatRejection {
    Empty,
    Flagged {
        marker: &'static str,
        excerpt: String,
    },
}

/// Render the digest email.
///
/// The summary is screened again here; a rejected summary produces no email.
pub fn compose(
    digest: &NewsDigest,
    summary: &str,
    subject_prefix: &str,
    max_listed: usize,
    now: DateTime<Local>,
) -> Result<EmailContent, FormatRejection> {
    if summary.trim().is_empty() {
        return Err(FormatRejection::Empty);
    }
    if let Some(marker) = guard::screen_email_body(summary) {
        return Err(FormatRejection::Flagged {
            marker,
            excerpt: guard::excerpt(summary, 200),
        });
    }

    let listed: Vec<&String> = digest.titles.iter().take(max_listed).collect();
    let remainder = digest.total_count.saturating_sub(max_listed);
    let date = now.format("%Y-%m-%d %H:%M:%S");

    let mut text = format!(
        "{subject_prefix}\n\nDate: {date}\nTotal headlines: {}\n\nSUMMARY:\n{summary}\n\nHEADLINES:\n",
        digest.total_count
    );
    for (i, title) in listed.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, title);
    }
    if remainder > 0 {
        let _ = writeln!(text, "\n... and {remainder} more");
    }

    let title = escape_html(subject_prefix);
    let mut html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 800px; margin: 0 auto; padding: 20px;">
    <h1 style="border-bottom: 2px solid #333; padding-bottom: 10px;">{title}</h1>
    <p><strong>Date:</strong> {date}</p>
    <p><strong>Total headlines:</strong> {total}</p>
    <div style="background-color: #f9f9f9; padding: 15px; margin: 20px 0; border-left: 4px solid #333;">
        <h2 style="margin-top: 0;">Summary</h2>
        <p style="white-space: pre-wrap;">{summary}</p>
    </div>
    <div style="margin: 20px 0;">
        <h2>Headlines</h2>
"#,
        total = digest.total_count,
        summary = escape_html(summary),
    );
    for (i, title) in listed.iter().enumerate() {
        let _ = writeln!(
            html,
            r#"        <p style="padding: 5px 0; border-bottom: 1px solid #eee;">{}. {}</p>"#,
            i + 1,
            escape_html(title)
        );
    }
    if remainder > 0 {
        let _ = writeln!(
            html,
            r#"        <p style="font-style: italic; color: #666;">... and {remainder} more</p>"#
        );
    }
    html.push_str("    </div>\n</body>\n</html>");

    Ok(EmailContent {
        subject: format!("{subject_prefix} - {}", now.format("%Y-%m-%d %H:%M")),
        text,
        html,
    })
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn long_lists_are_truncated_with_a_remainder_line() {
        let titles = (1..=23).map(|i| format!("Title {i}")).collect();
        let digest = NewsDigest::new(titles);

        let email = compose(&digest, "Calm week.", "Digest", 20, fixed_now()).unwrap();

        assert_eq!(email.subject, "Digest - 2024-05-01 09:30");
        assert!(email.text.contains("20. Title 20\n"));
        assert!(!email.text.contains("Title 21"));
        assert!(email.text.contains("... and 3 more"));
        assert!(email.html.contains("... and 3 more"));
    }

    #[test]
    fn markup_in_titles_and_summary_is_escaped() {
        let digest = NewsDigest::new(vec!["<b>BTC</b> & friends".into()]);
        let email = compose(&digest, "a < b", "Digest", 20, fixed_now()).unwrap();

        assert!(email.html.contains("&lt;b&gt;BTC&lt;/b&gt; &amp; friends"));
        assert!(email.html.contains("a &lt; b"));
        // The plain-text body is left untouched.
        assert!(email.text.contains("<b>BTC</b>"));
    }

    #[test]
    fn short_lists_have_no_remainder_line() {
        let digest = NewsDigest::new(vec!["A".into(), "B".into()]);
        let email = compose(&digest, "Quiet.", "Digest", 20, fixed_now()).unwrap();
        assert!(!email.text.contains("more"));
    }

    #[test]
    fn error_looking_summary_is_refused() {
        let digest = NewsDigest::new(vec!["A".into()]);
        assert_eq!(
            compose(&digest, "   ", "Digest", 20, fixed_now()),
            Err(FormatRejection::Empty)
        );
        assert!(matches!(
            compose(&digest, "Request failed with 401", "Digest", 20, fixed_now()),
            Err(FormatRejection::Flagged { .. })
        ));
    }
}
