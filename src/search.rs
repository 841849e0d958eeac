//! Photo label index on an OpenSearch domain.

use anyhow::{Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::SearchConfig;

/// One indexed photo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoDocument {
    pub user_id: String,
    #[serde(rename = "objectKey")]
    pub object_key: String,
    #[serde(rename = "s3-path")]
    pub s3_path: String,
    /// Detected and custom labels.
    pub labels: String,
    /// Labels searched by queries; replaced when the user finalizes the labels.
    #[serde(rename = "final-labels")]
    pub final_labels: String,
    #[serde(rename = "createdTimestamp", skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index_document(&self, index: &str, document: &PhotoDocument) -> Result<()>;

    /// Id of the document indexed for `object_key`, if any.
    async fn find_document(
        &self,
        index: &str,
        user_id: &str,
        object_key: &str,
    ) -> Result<Option<String>>;

    async fn update_labels(
        &self,
        index: &str,
        doc_id: &str,
        final_labels: &str,
        timestamp: &str,
    ) -> Result<()>;

    /// Documents matching a query body, in hit order.
    async fn search(&self, index: &str, query: &Value, size: usize) -> Result<Vec<PhotoDocument>>;
}

/// Public URLs of the photos behind `documents`, without duplicates.
pub fn photo_urls(url_prefix: &str, documents: &[PhotoDocument]) -> Vec<String> {
    documents
        .iter()
        .filter(|document| !document.s3_path.is_empty())
        .map(|document| format!("{url_prefix}{}", document.s3_path))
        .unique()
        .collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: HitList,
}

#[derive(Debug, Default, Deserialize)]
struct HitList {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: PhotoDocument,
}

/// OpenSearch REST client authenticating with HTTP basic auth.
pub struct OpenSearchClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build search HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url(&config.endpoint),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/{path}", self.base_url));
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    async fn hits(&self, index: &str, body: &Value, size: usize) -> Result<Vec<Hit>> {
        let response = self
            .request(Method::POST, &format!("{index}/_search"))
            .query(&[("size", size)])
            .json(body)
            .send()
            .await
            .with_context(|| format!("search request to {index} failed"))?;

        // A user without uploads has no index yet.
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index, "index does not exist");
            return Ok(Vec::new());
        }

        let response: SearchResponse = response
            .error_for_status()
            .with_context(|| format!("search in {index} was rejected"))?
            .json()
            .await
            .context("invalid search response")?;

        Ok(response.hits.hits)
    }
}

fn base_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

#[async_trait]
impl SearchIndex for OpenSearchClient {
    #[instrument(skip(self, document), fields(object_key = %document.object_key))]
    async fn index_document(&self, index: &str, document: &PhotoDocument) -> Result<()> {
        self.request(Method::POST, &format!("{index}/_doc"))
            .json(document)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to index document into {index}"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_document(
        &self,
        index: &str,
        user_id: &str,
        object_key: &str,
    ) -> Result<Option<String>> {
        let body = json!({
            "query": {
                "bool": {
                    "must": [
                        { "match": { "user_id": user_id } },
                        { "match": { "objectKey": object_key } }
                    ]
                }
            }
        });

        let hits = self.hits(index, &body, 1).await?;
        Ok(hits.into_iter().next().map(|hit| hit.id))
    }

    #[instrument(skip(self))]
    async fn update_labels(
        &self,
        index: &str,
        doc_id: &str,
        final_labels: &str,
        timestamp: &str,
    ) -> Result<()> {
        let body = json!({
            "doc": {
                "final-labels": final_labels,
                "timestamp": timestamp
            }
        });

        self.request(Method::POST, &format!("{index}/_update/{doc_id}"))
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to update document {doc_id} in {index}"))?;
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn search(&self, index: &str, query: &Value, size: usize) -> Result<Vec<PhotoDocument>> {
        let hits = self.hits(index, query, size).await?;
        debug!(count = hits.len(), "search hits");
        Ok(hits.into_iter().map(|hit| hit.source).collect())
    }
}
