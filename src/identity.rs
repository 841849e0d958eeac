//! Authenticated caller identity.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use lambda_http::request::RequestContext;
use serde_json::Value;
use std::collections::HashMap;

use crate::{error::ApiError, state::AppState};

/// Header carrying the identity when the app runs outside API Gateway.
pub const USER_HEADER: &str = "x-user-sub";

/// The `sub` claim of the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(sub) = parts
            .extensions
            .get::<RequestContext>()
            .and_then(authorizer_subject)
        {
            return Ok(Self(sub));
        }

        if state.config.trust_identity_header {
            let header = parts
                .headers
                .get(USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty());
            if let Some(sub) = header {
                return Ok(Self(sub.to_string()));
            }
        }

        Err(ApiError::Unauthorized(
            "missing authenticated identity".to_string(),
        ))
    }
}

/// `sub` claim placed in the request context by a Cognito authorizer.
pub fn authorizer_subject(context: &RequestContext) -> Option<String> {
    match context {
        RequestContext::ApiGatewayV1(context) => claims_subject(&context.authorizer.fields),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn claims_subject(authorizer: &HashMap<String, Value>) -> Option<String> {
    authorizer
        .get("claims")?
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn authorizer(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn reads_cognito_claims() {
        let fields = authorizer(json!({
            "claims": {
                "sub": "7d8e2f10-0b5c-4d2b-a7b0-5c0e8e9f1a2b",
                "email": "someone@example.com"
            }
        }));

        assert_eq!(
            claims_subject(&fields).as_deref(),
            Some("7d8e2f10-0b5c-4d2b-a7b0-5c0e8e9f1a2b")
        );
    }

    #[test]
    fn missing_or_empty_claims_yield_nothing() {
        assert_eq!(claims_subject(&HashMap::new()), None);
        assert_eq!(claims_subject(&authorizer(json!({ "claims": {} }))), None);
        assert_eq!(
            claims_subject(&authorizer(json!({ "claims": { "sub": "" } }))),
            None
        );
    }
}
