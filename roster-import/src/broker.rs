use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roster_proto::bob::v1::user_modifier_service_client::UserModifierServiceClient;
use roster_proto::bob::v1::ExchangeTokenRequest;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credentials::{ServiceToken, TenantCredential};
use crate::error::AuthError;
use crate::metrics_consts::TOKEN_EXCHANGES;
use crate::propagator::AuthenticatedChannel;

const SIGN_IN_PATH: &str = "/v1/accounts:signInWithPassword";

/// Short-lived token issued by the identity provider, only ever used as exchange input.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityToken(<{} bytes>)", self.0.len())
    }
}

/// Second hop of the login: identity token in, service token out.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_token(&self, identity: &IdentityToken) -> Result<ServiceToken, AuthError>;
}

/// `bob.v1.UserModifierService/ExchangeToken` over an intercepted channel.
#[derive(Clone)]
pub struct GrpcTokenExchanger {
    client: UserModifierServiceClient<AuthenticatedChannel>,
}

impl GrpcTokenExchanger {
    pub fn new(channel: AuthenticatedChannel) -> Self {
        Self {
            client: UserModifierServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl TokenExchanger for GrpcTokenExchanger {
    async fn exchange_token(&self, identity: &IdentityToken) -> Result<ServiceToken, AuthError> {
        let mut client = self.client.clone();
        let response = client
            .exchange_token(ExchangeTokenRequest {
                token: identity.as_str().to_owned(),
            })
            .await
            .map_err(AuthError::Exchange)?
            .into_inner();

        if response.token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "token exchange returned an empty token".to_owned(),
            ));
        }
        Ok(ServiceToken::new(response.token))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<&'a str>,
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: Option<String>,
}

// {"error": {"code": 400, "message": "INVALID_PASSWORD", ...}}
#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Deserialize)]
struct ProviderError {
    message: String,
}

/// Turns a tenant credential into a service token: password sign-in at the identity
/// provider, then an exchange of the resulting identity token. No retries, no caching;
/// publishing the result is the caller's job.
pub struct CredentialBroker {
    client: reqwest::Client,
    sign_in_url: String,
    api_key: String,
    exchanger: Arc<dyn TokenExchanger>,
}

impl CredentialBroker {
    pub fn new(
        identity_url: &str,
        api_key: &str,
        request_timeout: Duration,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .user_agent("roster-import")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            sign_in_url: format!("{}{SIGN_IN_PATH}", identity_url.trim_end_matches('/')),
            api_key: api_key.to_owned(),
            exchanger,
        })
    }

    pub async fn exchange(&self, credential: &TenantCredential) -> Result<ServiceToken, AuthError> {
        let result = self.two_hop(credential).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(TOKEN_EXCHANGES, "outcome" => outcome).increment(1);
        result
    }

    async fn two_hop(&self, credential: &TenantCredential) -> Result<ServiceToken, AuthError> {
        let identity = self.sign_in(credential).await?;
        debug!(tenant_id = %credential.tenant_id, "signed in at identity provider");

        let token = self.exchanger.exchange_token(&identity).await?;
        info!(tenant_id = %credential.tenant_id, "exchanged identity token for service token");
        Ok(token)
    }

    pub async fn sign_in(&self, credential: &TenantCredential) -> Result<IdentityToken, AuthError> {
        let body = SignInRequest {
            tenant_id: Some(credential.tenant_id.as_str()).filter(|id| !id.is_empty()),
            email: &credential.username,
            password: &credential.password,
            return_secure_token: true,
        };

        let response = self
            .client
            .post(&self.sign_in_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<ProviderErrorBody>(&bytes) {
                Ok(body) => body.error.message,
                Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
            };
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SignInResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedResponse(format!("sign-in response: {e}")))?;

        match parsed.id_token {
            Some(token) if !token.is_empty() => Ok(IdentityToken::new(token)),
            _ => Err(AuthError::MalformedResponse(
                "sign-in response has no idToken".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::test_utils::MockTokenExchanger;

    fn credential() -> TenantCredential {
        TenantCredential {
            tenant_id: "withus-tenant".to_string(),
            username: "sync@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    fn broker(server: &MockServer, exchanger: MockTokenExchanger) -> CredentialBroker {
        CredentialBroker::new(
            &server.base_url(),
            "api-key",
            Duration::from_secs(5),
            Arc::new(exchanger),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_two_hop_exchange() {
        let server = MockServer::start_async().await;
        let sign_in = server.mock(|when, then| {
            when.method(POST)
                .path(SIGN_IN_PATH)
                .query_param("key", "api-key")
                .json_body(json!({
                    "tenantId": "withus-tenant",
                    "email": "sync@example.com",
                    "password": "hunter2",
                    "returnSecureToken": true,
                }));
            then.status(200).json_body(json!({"idToken": "X", "refreshToken": "r"}));
        });
        let exchanger = MockTokenExchanger::new().exchange_ret("X", Ok("Y"));

        let token = broker(&server, exchanger.clone())
            .exchange(&credential())
            .await
            .unwrap();

        assert_eq!(token, ServiceToken::new("Y"));
        sign_in.assert_async().await;
        assert_eq!(exchanger.calls(), vec!["X".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_tenant_is_omitted() {
        let server = MockServer::start_async().await;
        let sign_in = server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH).json_body(json!({
                "email": "sync@example.com",
                "password": "hunter2",
                "returnSecureToken": true,
            }));
            then.status(200).json_body(json!({"idToken": "X"}));
        });
        let credential = TenantCredential {
            tenant_id: String::new(),
            ..credential()
        };

        let identity = broker(&server, MockTokenExchanger::new())
            .sign_in(&credential)
            .await
            .unwrap();

        assert_eq!(identity, IdentityToken::new("X"));
        sign_in.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_sign_in_never_reaches_exchange() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH);
            then.status(401)
                .json_body(json!({"error": {"code": 401, "message": "INVALID_PASSWORD"}}));
        });
        let exchanger = MockTokenExchanger::new().exchange_ret("X", Ok("Y"));

        let err = broker(&server, exchanger.clone())
            .exchange(&credential())
            .await
            .unwrap_err();

        match err {
            AuthError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "INVALID_PASSWORD");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(exchanger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_kept() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH);
            then.status(503).body("upstream unavailable");
        });

        let err = broker(&server, MockTokenExchanger::new())
            .sign_in(&credential())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthError::Rejected { status: 503, ref message } if message == "upstream unavailable"
        ));
    }

    #[tokio::test]
    async fn test_missing_id_token_is_malformed() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH);
            then.status(200).json_body(json!({"kind": "identitytoolkit#VerifyPasswordResponse"}));
        });

        let err = broker(&server, MockTokenExchanger::new())
            .sign_in(&credential())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH);
            then.status(200).body("<html>captive portal</html>");
        });

        let err = broker(&server, MockTokenExchanger::new())
            .sign_in(&credential())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_exchange_rejection_is_auth_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH);
            then.status(200).json_body(json!({"idToken": "X"}));
        });
        let exchanger = MockTokenExchanger::new().exchange_ret(
            "X",
            Err(tonic::Status::permission_denied("user is not a sync account")),
        );

        let err = broker(&server, exchanger)
            .exchange(&credential())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Exchange(status) if status.code() == tonic::Code::PermissionDenied));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_identity_url() {
        let server = MockServer::start_async().await;
        let sign_in = server.mock(|when, then| {
            when.method(POST).path(SIGN_IN_PATH);
            then.status(200).json_body(json!({"idToken": "X"}));
        });
        let broker = CredentialBroker::new(
            &format!("{}/", server.base_url()),
            "api-key",
            Duration::from_secs(5),
            Arc::new(MockTokenExchanger::new()),
        )
        .unwrap();

        broker.sign_in(&credential()).await.unwrap();
        sign_in.assert_async().await;
    }
}
