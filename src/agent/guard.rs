//! Error-content screening for model answers.
//!
//! A model can answer "successfully" with text that is really an error
//! report (an upstream 401 echoed back, "ошибка при ..." and so on). These
//! checks are substring heuristics over natural language: text that merely
//! mentions an error or a number such as 400 is flagged too, and an error
//! phrased some other way slips through. They are kept deliberately
//! conservative and should not be tuned without new requirements.

/// Any of these must appear before the summary is inspected further.
const SUMMARY_GATE: &[&str] = &[
    "ошибка",
    "error",
    "не удалось",
    "failed",
    "can't decode",
    "authorization",
    "400",
    "401",
    "403",
    "500",
];

/// Phrases that confirm a gated summary is a genuine error report.
const SUMMARY_CONFIRM: &[&str] = &["ошибка при", "error", "400", "401"];

/// Markers that reject an email body outright.
const EMAIL_MARKERS: &[&str] = &["ошибка при", "error", "не удалось создать", "failed", "400", "401"];

/// Screen a freshly produced summary. Returns the confirming marker if flagged.
pub fn screen_summary(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if !SUMMARY_GATE.iter().any(|m| lower.contains(m)) {
        return None;
    }
    SUMMARY_CONFIRM.iter().copied().find(|m| lower.contains(m))
}

/// Screen a summary again right before it is put into an email.
pub fn screen_email_body(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    EMAIL_MARKERS.iter().copied().find(|m| lower.contains(m))
}

/// First `max` characters of `text`, for error messages.
pub fn excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
