use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// AWS region of every service client
    pub region: String,
    /// Bucket receiving uploaded images
    pub images_bucket: String,
    /// Image catalog table
    pub images_table: String,
    /// Minimum label detection confidence, in percent
    pub min_confidence: f32,
    /// Prefix turning an `s3-path` into a public URL
    pub s3_url_prefix: String,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// `tracing` level name
    pub log_level: String,
    /// Accept the `x-user-sub` header as identity (local development only)
    pub trust_identity_header: bool,
    pub rate_limit: RateLimitConfig,
    pub search: SearchConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Request log table
    pub table: String,
    /// Requests admitted per window and user
    pub allowed_requests: usize,
    pub window_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// OpenSearch domain endpoint, with or without scheme
    pub endpoint: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Per-user indices are named `<index_prefix>-<user>`
    pub index_prefix: String,
    /// Field matched by label queries
    pub label_field: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Cognito user pool holding the accounts
    pub user_pool_id: String,
    /// App client allowed the `ADMIN_NO_SRP_AUTH` flow
    pub client_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            images_bucket: "imageinquiry-images".to_string(),
            images_table: "imageinquiry-images".to_string(),
            min_confidence: 75.0,
            s3_url_prefix: "https://s3.amazonaws.com/".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            log_level: "info".to_string(),
            trust_identity_header: false,
            rate_limit: RateLimitConfig::default(),
            search: SearchConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            table: "image-inquiry-rate-limiter".to_string(),
            allowed_requests: 2,
            window_secs: 60,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: None,
            password: None,
            index_prefix: "photo-label".to_string(),
            label_field: "final-labels".to_string(),
            max_results: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(region) = std::env::var("AWS_REGION") {
            config.region = region;
        }
        if let Ok(bucket) = std::env::var("IMAGES_BUCKET") {
            config.images_bucket = bucket;
        }
        if let Ok(table) = std::env::var("IMAGES_TABLE") {
            config.images_table = table;
        }
        if let Some(confidence) = env_parsed("LABEL_MIN_CONFIDENCE") {
            config.min_confidence = confidence;
        }
        if let Ok(prefix) = std::env::var("S3_URL_PREFIX") {
            config.s3_url_prefix = prefix;
        }
        if let Some(limit) = env_parsed("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = limit;
        }
        config.log_level = log_level_from_env();

        if let Ok(table) = std::env::var("RATE_LIMIT_TABLE") {
            config.rate_limit.table = table;
        }
        if let Some(requests) = env_parsed("RATE_LIMIT_REQUESTS") {
            config.rate_limit.allowed_requests = requests;
        }
        if let Some(window) = env_parsed("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit.window_secs = window;
        }

        if let Ok(endpoint) = std::env::var("OPENSEARCH_HOST_ENDPOINT") {
            config.search.endpoint = endpoint;
        }
        if let Ok(username) = std::env::var("ESUSERNAME") {
            config.search.username = Some(username);
        }
        if let Ok(password) = std::env::var("ESPASSWORD") {
            config.search.password = Some(password);
        }
        if let Ok(prefix) = std::env::var("SEARCH_INDEX_PREFIX") {
            config.search.index_prefix = prefix;
        }
        if let Ok(field) = std::env::var("SEARCH_LABEL_FIELD") {
            config.search.label_field = field;
        }
        if let Some(max) = env_parsed("SEARCH_MAX_RESULTS") {
            config.search.max_results = max;
        }

        if let Ok(pool) = std::env::var("COGNITO_USER_POOL_ID") {
            config.auth.user_pool_id = pool;
        }
        if let Ok(client) = std::env::var("COGNITO_CLIENT_ID") {
            config.auth.client_id = client;
        }

        config
    }

    /// Search index holding the photos of one user.
    pub fn index_name(&self, user_id: &str) -> String {
        format!("{}-{user_id}", self.search.index_prefix)
    }
}

/// `LOG_LEVEL`, read on its own so tracing can start before [`Config::from_env`] runs.
pub fn log_level_from_env() -> String {
    std::env::var("LOG_LEVEL").unwrap_or_else(|_| Config::default().log_level)
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid value {raw:?} for {key}");
            None
        }
    }
}
