pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod keywords;
pub mod labels;
pub mod multipart;
pub mod query;
pub mod rate_limit;
pub mod search;
pub mod state;
pub mod storage;

use anyhow::Result;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;
use tracing::{debug, Level};

pub use api::router;
pub use config::Config;
pub use error::{ApiError, MultipartError};
pub use multipart::{parse_multipart_data, ParsedMultipartBody};
pub use query::BooleanQuery;
pub use state::AppState;

use auth::CognitoProvider;
use catalog::DynamoCatalog;
use keywords::ComprehendExtractor;
use labels::RekognitionDetector;
use rate_limit::{DynamoRequestLog, RateLimiter};
use search::OpenSearchClient;
use storage::S3ObjectStore;

pub fn init_tracing(level: &str) {
    let level = level.parse().unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();
}

pub async fn load_aws_config(region: &str) -> SdkConfig {
    aws_config::load_defaults(BehaviorVersion::v2024_03_28())
        .await
        .into_builder()
        .region(Region::new(region.to_string()))
        .build()
}

/// Builds the service clients once per process.
pub async fn create_state(config: Config) -> Result<AppState> {
    debug!(
        "configuration: {}",
        serde_json::to_string(&config).unwrap_or_default()
    );

    let sdk_config = load_aws_config(&config.region).await;
    let dynamodb = aws_sdk_dynamodb::Client::new(&sdk_config);

    let rate_limiter = RateLimiter::new(
        Arc::new(DynamoRequestLog::new(
            dynamodb.clone(),
            config.rate_limit.table.clone(),
        )),
        config.rate_limit.allowed_requests,
        config.rate_limit.window_secs,
    );

    Ok(AppState {
        storage: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&sdk_config))),
        labels: Arc::new(RekognitionDetector::new(
            aws_sdk_rekognition::Client::new(&sdk_config),
        )),
        catalog: Arc::new(DynamoCatalog::new(dynamodb, config.images_table.clone())),
        search: Arc::new(OpenSearchClient::new(&config.search)?),
        keywords: Arc::new(ComprehendExtractor::new(
            aws_sdk_comprehend::Client::new(&sdk_config),
        )),
        identity_provider: Arc::new(CognitoProvider::new(
            aws_sdk_cognitoidentityprovider::Client::new(&sdk_config),
            &config.auth,
        )),
        rate_limiter,
        config: Arc::new(config),
    })
}
