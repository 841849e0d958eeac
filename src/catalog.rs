//! Catalog of uploaded images, one row per user and image.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    AiLabelsGenerated,
    LabelsFinalized,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiLabelsGenerated => "AI_LABELS_GENERATED",
            Self::LabelsFinalized => "LABELS_FINALIZED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AI_LABELS_GENERATED" => Some(Self::AiLabelsGenerated),
            "LABELS_FINALIZED" => Some(Self::LabelsFinalized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub user_id: String,
    pub image_id: String,
    /// `<bucket>/<object key>`
    pub s3_path: String,
    pub filename: String,
    pub caption: String,
    pub tags: Vec<String>,
    pub image_status: ImageStatus,
}

impl ImageRecord {
    /// A freshly uploaded image: no caption, no tags yet.
    pub fn new(
        user_id: impl Into<String>,
        image_id: impl Into<String>,
        s3_path: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            image_id: image_id.into(),
            s3_path: s3_path.into(),
            filename: filename.into(),
            caption: String::new(),
            tags: Vec::new(),
            image_status: ImageStatus::AiLabelsGenerated,
        }
    }
}

#[async_trait]
pub trait ImageCatalog: Send + Sync {
    async fn insert(&self, record: &ImageRecord) -> Result<()>;

    async fn get(&self, user_id: &str, image_id: &str) -> Result<Option<ImageRecord>>;

    async fn set_tags(
        &self,
        user_id: &str,
        image_id: &str,
        tags: &[String],
        status: ImageStatus,
    ) -> Result<()>;
}

pub struct DynamoCatalog {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoCatalog {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ImageCatalog for DynamoCatalog {
    #[instrument(skip(self, record), fields(image_id = %record.image_id))]
    async fn insert(&self, record: &ImageRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(record)))
            .send()
            .await
            .with_context(|| format!("failed to insert image {}", record.image_id))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, user_id: &str, image_id: &str) -> Result<Option<ImageRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .key("image_id", AttributeValue::S(image_id.to_string()))
            .send()
            .await
            .with_context(|| format!("failed to fetch image {image_id}"))?;

        output.item().map(from_item).transpose()
    }

    #[instrument(skip(self, tags))]
    async fn set_tags(
        &self,
        user_id: &str,
        image_id: &str,
        tags: &[String],
        status: ImageStatus,
    ) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .key("image_id", AttributeValue::S(image_id.to_string()))
            .update_expression("SET tags = :tags, image_status = :status")
            .expression_attribute_values(":tags", string_list(tags))
            .expression_attribute_values(":status", AttributeValue::S(status.as_str().to_string()))
            .send()
            .await
            .with_context(|| format!("failed to update tags of image {image_id}"))?;
        Ok(())
    }
}

fn string_list(values: &[String]) -> AttributeValue {
    AttributeValue::L(values.iter().cloned().map(AttributeValue::S).collect())
}

fn to_item(record: &ImageRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("user_id".to_string(), AttributeValue::S(record.user_id.clone())),
        ("image_id".to_string(), AttributeValue::S(record.image_id.clone())),
        ("s3-path".to_string(), AttributeValue::S(record.s3_path.clone())),
        ("filename".to_string(), AttributeValue::S(record.filename.clone())),
        ("caption".to_string(), AttributeValue::S(record.caption.clone())),
        ("tags".to_string(), string_list(&record.tags)),
        (
            "image_status".to_string(),
            AttributeValue::S(record.image_status.as_str().to_string()),
        ),
    ])
}

fn from_item(item: &HashMap<String, AttributeValue>) -> Result<ImageRecord> {
    let text = |name: &str| -> Result<String> {
        item.get(name)
            .and_then(|value| value.as_s().ok())
            .cloned()
            .ok_or_else(|| anyhow!("catalog item has no string attribute {name}"))
    };

    let tags = item
        .get("tags")
        .and_then(|value| value.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_s().ok().cloned())
                .collect()
        })
        .unwrap_or_default();

    let status = text("image_status")?;

    Ok(ImageRecord {
        user_id: text("user_id")?,
        image_id: text("image_id")?,
        s3_path: text("s3-path")?,
        filename: text("filename").unwrap_or_default(),
        caption: text("caption").unwrap_or_default(),
        tags,
        image_status: ImageStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown image status {status}"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_untagged() {
        let record = ImageRecord::new("u1", "i1", "bucket/u1/i1", "cat.png");
        assert!(record.tags.is_empty());
        assert_eq!(record.caption, "");
        assert_eq!(record.image_status, ImageStatus::AiLabelsGenerated);
    }

    #[test]
    fn item_attributes_match_table_layout() {
        let mut record = ImageRecord::new("u1", "i1", "bucket/u1/i1", "cat.png");
        record.tags = vec!["cat".to_string(), "sofa".to_string()];
        record.image_status = ImageStatus::LabelsFinalized;

        let item = to_item(&record);

        assert_eq!(
            item.get("s3-path"),
            Some(&AttributeValue::S("bucket/u1/i1".to_string()))
        );
        assert_eq!(
            item.get("image_status"),
            Some(&AttributeValue::S("LABELS_FINALIZED".to_string()))
        );
        assert_eq!(from_item(&item).unwrap(), record);
    }

    #[test]
    fn item_without_keys_is_rejected() {
        let item = HashMap::from([(
            "image_status".to_string(),
            AttributeValue::S("AI_LABELS_GENERATED".to_string()),
        )]);
        assert!(from_item(&item).is_err());
    }
}
