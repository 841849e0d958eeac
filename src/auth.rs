//! User sign-up and sign-in against a Cognito user pool.

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::{
    error::ProvideErrorMetadata,
    types::{AttributeType, AuthFlowType},
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::config::AuthConfig;

/// Message Cognito attaches to confirmations of an already confirmed account.
const ALREADY_CONFIRMED: &str = "Current status is CONFIRMED";

#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider refused the request.
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },

    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

impl AuthError {
    pub fn rejected(code: &str, message: &str) -> Self {
        Self::Rejected {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_already_confirmed(&self) -> bool {
        matches!(
            self,
            Self::Rejected { code, message }
                if code == "NotAuthorizedException" && message.contains(ALREADY_CONFIRMED)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub user_sub: String,
    pub user_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i32,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDelivery {
    pub destination: Option<String>,
    pub delivery_medium: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, name: &str, password: &str) -> Result<SignUp, AuthError>;

    async fn login(&self, email: &str, password: &str) -> Result<Tokens, AuthError>;

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError>;

    async fn resend_confirmation_code(&self, email: &str) -> Result<CodeDelivery, AuthError>;
}

pub struct CognitoProvider {
    client: aws_sdk_cognitoidentityprovider::Client,
    user_pool_id: String,
    client_id: String,
}

impl CognitoProvider {
    pub fn new(client: aws_sdk_cognitoidentityprovider::Client, config: &AuthConfig) -> Self {
        Self {
            client,
            user_pool_id: config.user_pool_id.clone(),
            client_id: config.client_id.clone(),
        }
    }
}

/// Service errors keep their Cognito code; transport failures become `Unavailable`.
fn classify<E>(err: E, action: &'static str) -> AuthError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.code() {
        Some(code) => AuthError::rejected(code, err.message().unwrap_or_default()),
        None => AuthError::Unavailable(anyhow::Error::new(err).context(action)),
    }
}

fn attribute(name: &str, value: &str) -> Result<AttributeType, AuthError> {
    Ok(AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .context("failed to build user attribute")?)
}

#[async_trait]
impl IdentityProvider for CognitoProvider {
    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, name: &str, password: &str) -> Result<SignUp, AuthError> {
        let output = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .user_attributes(attribute("email", email)?)
            .user_attributes(attribute("name", name)?)
            .send()
            .await
            .map_err(|err| classify(err, "failed to sign up user"))?;

        Ok(SignUp {
            user_sub: output.user_sub().to_string(),
            user_confirmed: output.user_confirmed(),
        })
    }

    #[instrument(skip(self, password))]
    async fn login(&self, email: &str, password: &str) -> Result<Tokens, AuthError> {
        let output = self
            .client
            .admin_initiate_auth()
            .user_pool_id(&self.user_pool_id)
            .client_id(&self.client_id)
            .auth_flow(AuthFlowType::AdminNoSrpAuth)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .map_err(|err| classify(err, "failed to authenticate user"))?;

        let Some(result) = output.authentication_result() else {
            let challenge = output
                .challenge_name()
                .map(|name| name.as_str().to_string())
                .unwrap_or_default();
            return Err(AuthError::rejected(
                "ChallengeRequired",
                &format!("sign-in requires the {challenge} challenge"),
            ));
        };

        Ok(Tokens {
            access_token: result.access_token().unwrap_or_default().to_string(),
            id_token: result.id_token().unwrap_or_default().to_string(),
            refresh_token: result.refresh_token().map(str::to_string),
            expires_in: result.expires_in(),
            token_type: result.token_type().unwrap_or("Bearer").to_string(),
        })
    }

    #[instrument(skip(self, code))]
    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), AuthError> {
        self.client
            .confirm_sign_up()
            .client_id(&self.client_id)
            .username(email)
            .confirmation_code(code)
            .send()
            .await
            .map_err(|err| classify(err, "failed to confirm sign-up"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn resend_confirmation_code(&self, email: &str) -> Result<CodeDelivery, AuthError> {
        let output = self
            .client
            .resend_confirmation_code()
            .client_id(&self.client_id)
            .username(email)
            .send()
            .await
            .map_err(|err| classify(err, "failed to resend confirmation code"))?;

        let details = output.code_delivery_details();
        Ok(CodeDelivery {
            destination: details
                .and_then(|details| details.destination())
                .map(str::to_string),
            delivery_medium: details
                .and_then(|details| details.delivery_medium())
                .map(|medium| medium.as_str().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_confirmed_needs_code_and_message() {
        let confirmed = AuthError::rejected(
            "NotAuthorizedException",
            "User cannot be confirmed. Current status is CONFIRMED",
        );
        assert!(confirmed.is_already_confirmed());

        let wrong_password =
            AuthError::rejected("NotAuthorizedException", "Incorrect username or password.");
        assert!(!wrong_password.is_already_confirmed());

        let other_code = AuthError::rejected("CodeMismatchException", ALREADY_CONFIRMED);
        assert!(!other_code.is_already_confirmed());
    }

    #[test]
    fn unavailable_errors_have_no_code() {
        let err = AuthError::from(anyhow::anyhow!("connection reset"));
        assert_eq!(err.code(), None);
        assert!(!err.is_already_confirmed());
    }

    #[test]
    fn tokens_serialize_camel_case() {
        let tokens = Tokens {
            access_token: "a".to_string(),
            id_token: "i".to_string(),
            refresh_token: None,
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        };
        let value = serde_json::to_value(tokens).unwrap();
        assert_eq!(value["accessToken"], "a");
        assert_eq!(value["expiresIn"], 3600);
    }
}
