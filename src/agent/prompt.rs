//! Prompt builder for the headline summary.

use crate::types::NewsDigest;

/// Summary used when the upstream returned no headlines at all.
pub const NO_NEWS_SUMMARY: &str = "No news found.";

/// Build the user prompt asking the model to summarize `digest`.
pub fn build_summary_prompt(digest: &NewsDigest, language: &str) -> String {
    let news_text = digest
        .titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("{}. {}", i + 1, title))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze the following Bitcoin news headlines and write a short summary in {language}.

News:
{news_text}

The summary should cover:
1. An overall assessment of the Bitcoin market situation
2. Key events and trends
3. Important details from the news

Keep it informative but brief (no more than 500 words). You may call the `news` \
tool for fresher headlines."
    )
}
