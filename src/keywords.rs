//! Keyword extraction for free-text searches such as "photos of dogs on the beach".

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_comprehend::types::{PartOfSpeechTagType, SyntaxLanguageCode};
use tracing::instrument;

use crate::query::BooleanQuery;

/// Phrases introducing the subject of a free-text search, matched without regard to case.
pub const SUBJECT_PREFIXES: [&str; 2] = ["images of", "photos of"];

#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Nouns and proper nouns of `text`, in order of appearance.
    async fn nouns(&self, text: &str) -> Result<Vec<String>>;
}

pub struct ComprehendExtractor {
    client: aws_sdk_comprehend::Client,
}

impl ComprehendExtractor {
    pub fn new(client: aws_sdk_comprehend::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeywordExtractor for ComprehendExtractor {
    #[instrument(skip(self))]
    async fn nouns(&self, text: &str) -> Result<Vec<String>> {
        // Comprehend rejects empty documents.
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .client
            .detect_syntax()
            .text(text)
            .language_code(SyntaxLanguageCode::En)
            .send()
            .await
            .context("failed to detect query syntax")?;

        Ok(output
            .syntax_tokens()
            .iter()
            .filter(|token| {
                matches!(
                    token.part_of_speech().and_then(|pos| pos.tag()),
                    Some(PartOfSpeechTagType::Noun | PartOfSpeechTagType::Propn)
                )
            })
            .filter_map(|token| token.text())
            .map(str::to_string)
            .collect())
    }
}

/// Text after the first of [`SUBJECT_PREFIXES`] found in `text`, or all of it, trimmed.
///
/// Prefixes are tried in order, so "photos of images of cats" yields "cats".
pub fn strip_subject_prefix(text: &str) -> &str {
    let lower = text.to_ascii_lowercase();
    SUBJECT_PREFIXES
        .iter()
        .find_map(|prefix| lower.find(prefix).map(|pos| &text[pos + prefix.len()..]))
        .unwrap_or(text)
        .trim()
}

/// Whether `query` uses the `AND` / `OR` operators of the label grammar.
pub fn is_structured(query: &str) -> bool {
    query.contains(" AND ") || query.contains(" OR ")
}

/// Any of the nouns of a free-text query; the literal query when none are found.
pub async fn free_text_query(
    extractor: &dyn KeywordExtractor,
    query: &str,
) -> Result<BooleanQuery> {
    let nouns = extractor.nouns(strip_subject_prefix(query)).await?;
    if nouns.is_empty() {
        return Ok(BooleanQuery::parse(query));
    }

    Ok(BooleanQuery {
        must_terms: Vec::new(),
        should_terms: nouns,
    })
}
