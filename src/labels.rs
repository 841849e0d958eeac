//! Label detection and label list normalization.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::types::{Image, S3Object};
use itertools::Itertools;
use tracing::instrument;

#[async_trait]
pub trait LabelDetector: Send + Sync {
    /// Names of the labels detected in a stored image with at least `min_confidence` percent.
    async fn detect_labels(&self, bucket: &str, key: &str, min_confidence: f32)
        -> Result<Vec<String>>;
}

pub struct RekognitionDetector {
    client: aws_sdk_rekognition::Client,
}

impl RekognitionDetector {
    pub fn new(client: aws_sdk_rekognition::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LabelDetector for RekognitionDetector {
    #[instrument(skip(self))]
    async fn detect_labels(
        &self,
        bucket: &str,
        key: &str,
        min_confidence: f32,
    ) -> Result<Vec<String>> {
        let image = Image::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();

        let output = self
            .client
            .detect_labels()
            .image(image)
            .min_confidence(min_confidence)
            .send()
            .await
            .with_context(|| format!("failed to detect labels for s3://{bucket}/{key}"))?;

        Ok(output
            .labels()
            .iter()
            .filter_map(|label| label.name())
            .map(str::to_string)
            .collect())
    }
}

/// Splits a comma-separated label list, trimming entries and dropping empty ones.
pub fn split_labels(labels: &str) -> Vec<String> {
    labels
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

/// Appends the comma-separated custom labels to the detected ones.
pub fn merge_custom_labels(mut detected: Vec<String>, custom: &str) -> Vec<String> {
    detected.extend(split_labels(custom));
    detected
}

/// Index form of a label list: space-separated and lower-cased.
pub fn index_labels(labels: &[String]) -> String {
    labels.iter().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_labels_are_trimmed_and_appended() {
        let merged = merge_custom_labels(
            vec!["Dog".to_string(), "Grass".to_string()],
            " Rex, puppy ,,",
        );
        assert_eq!(merged, ["Dog", "Grass", "Rex", "puppy"]);
    }

    #[test]
    fn empty_custom_labels_add_nothing() {
        assert_eq!(merge_custom_labels(vec!["Cat".to_string()], ""), ["Cat"]);
    }

    #[test]
    fn index_form_is_lowercase_and_space_joined() {
        let labels = split_labels("Golden Retriever,Beach");
        assert_eq!(index_labels(&labels), "golden retriever beach");
        assert_eq!(index_labels(&[]), "");
    }
}
