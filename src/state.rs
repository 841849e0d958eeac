use std::sync::Arc;

use crate::{
    auth::IdentityProvider, catalog::ImageCatalog, config::Config, keywords::KeywordExtractor,
    labels::LabelDetector, rate_limit::RateLimiter, search::SearchIndex, storage::ObjectStore,
};

/// Service handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn ObjectStore>,
    pub labels: Arc<dyn LabelDetector>,
    pub catalog: Arc<dyn ImageCatalog>,
    pub search: Arc<dyn SearchIndex>,
    pub keywords: Arc<dyn KeywordExtractor>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    pub rate_limiter: RateLimiter,
}
