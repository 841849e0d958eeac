//! Per-user sliding-window rate limiting backed by a request log table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, Select};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Storage of past request timestamps (epoch seconds) per user.
#[async_trait]
pub trait RequestLog: Send + Sync {
    /// Number of requests recorded strictly after `window_start`.
    async fn count_since(&self, user_id: &str, window_start: i64) -> Result<usize>;

    async fn record(&self, user_id: &str, timestamp: i64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    #[serde(skip)]
    pub limited: bool,
    pub current_request_count: usize,
    pub remaining_requests: usize,
    pub time_window: i64,
}

#[derive(Clone)]
pub struct RateLimiter {
    log: Arc<dyn RequestLog>,
    allowed_requests: usize,
    window_secs: i64,
}

impl RateLimiter {
    pub fn new(log: Arc<dyn RequestLog>, allowed_requests: usize, window_secs: i64) -> Self {
        Self {
            log,
            allowed_requests,
            window_secs,
        }
    }

    /// Admits the request at `now` if fewer than the allowed number of requests fall inside
    /// the window ending at `now`; admitted requests are recorded.
    pub async fn check(&self, user_id: &str, now: i64) -> Result<RateLimitDecision> {
        let count = self
            .log
            .count_since(user_id, now - self.window_secs)
            .await?;
        debug!(user_id, count, "requests in current window");

        if count < self.allowed_requests {
            self.log.record(user_id, now).await?;
            return Ok(RateLimitDecision {
                limited: false,
                current_request_count: count,
                remaining_requests: self.allowed_requests - count - 1,
                time_window: self.window_secs,
            });
        }

        Ok(RateLimitDecision {
            limited: true,
            current_request_count: count,
            remaining_requests: 0,
            time_window: self.window_secs,
        })
    }
}

/// Request log stored in DynamoDB, keyed by `userId` and `requestTimestamp`.
pub struct DynamoRequestLog {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoRequestLog {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl RequestLog for DynamoRequestLog {
    async fn count_since(&self, user_id: &str, window_start: i64) -> Result<usize> {
        let mut total = 0;
        let mut start_key = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table)
                .key_condition_expression("userId = :user AND requestTimestamp > :start")
                .expression_attribute_values(":user", AttributeValue::S(user_id.to_string()))
                .expression_attribute_values(
                    ":start",
                    AttributeValue::S(window_start.to_string()),
                )
                .select(Select::Count)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .with_context(|| format!("failed to query request log {}", self.table))?;

            total += usize::try_from(output.count()).unwrap_or_default();
            match output.last_evaluated_key() {
                Some(key) => start_key = Some(key.clone()),
                None => break,
            }
        }

        Ok(total)
    }

    async fn record(&self, user_id: &str, timestamp: i64) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .item("userId", AttributeValue::S(user_id.to_string()))
            .item("requestTimestamp", AttributeValue::S(timestamp.to_string()))
            .send()
            .await
            .with_context(|| format!("failed to record request in {}", self.table))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<(String, i64)>>);

    #[async_trait]
    impl RequestLog for MemoryLog {
        async fn count_since(&self, user_id: &str, window_start: i64) -> Result<usize> {
            let entries = self.0.lock().unwrap();
            Ok(entries
                .iter()
                .filter(|(user, ts)| user == user_id && *ts > window_start)
                .count())
        }

        async fn record(&self, user_id: &str, timestamp: i64) -> Result<()> {
            self.0.lock().unwrap().push((user_id.to_string(), timestamp));
            Ok(())
        }
    }

    fn limiter(log: Arc<MemoryLog>) -> RateLimiter {
        RateLimiter::new(log, 2, 60)
    }

    #[tokio::test]
    async fn admits_up_to_the_quota() {
        let log = Arc::new(MemoryLog::default());
        let limiter = limiter(log.clone());

        let first = limiter.check("alice", 1_000).await.unwrap();
        assert!(!first.limited);
        assert_eq!(first.current_request_count, 0);
        assert_eq!(first.remaining_requests, 1);

        let second = limiter.check("alice", 1_001).await.unwrap();
        assert!(!second.limited);
        assert_eq!(second.remaining_requests, 0);

        let third = limiter.check("alice", 1_002).await.unwrap();
        assert!(third.limited);
        assert_eq!(third.current_request_count, 2);
        assert_eq!(third.remaining_requests, 0);
        assert_eq!(third.time_window, 60);

        assert_eq!(log.0.lock().unwrap().len(), 2, "denied requests are not recorded");
    }

    #[tokio::test]
    async fn window_slides_past_old_requests() {
        let limiter = limiter(Arc::new(MemoryLog::default()));

        limiter.check("alice", 1_000).await.unwrap();
        limiter.check("alice", 1_030).await.unwrap();
        assert!(limiter.check("alice", 1_059).await.unwrap().limited);

        // The request at 1_000 is no longer after the window start.
        let decision = limiter.check("alice", 1_060).await.unwrap();
        assert!(!decision.limited);
        assert_eq!(decision.current_request_count, 1);
    }

    #[tokio::test]
    async fn users_are_limited_independently() {
        let limiter = limiter(Arc::new(MemoryLog::default()));

        limiter.check("alice", 10).await.unwrap();
        limiter.check("alice", 11).await.unwrap();

        assert!(limiter.check("alice", 12).await.unwrap().limited);
        assert!(!limiter.check("bob", 12).await.unwrap().limited);
    }

    #[test]
    fn decision_serializes_with_camel_case_counts() {
        let decision = RateLimitDecision {
            limited: true,
            current_request_count: 2,
            remaining_requests: 0,
            time_window: 60,
        };

        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            serde_json::json!({
                "currentRequestCount": 2,
                "remainingRequests": 0,
                "timeWindow": 60
            })
        );
    }
}
