//! Calls to the token, nonce and credential endpoints.

use anyhow::Context;
use http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Request,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;
use url::Url;

use crate::core::{
    error::{RemoteError, Result},
    util::{execute, parse_json_body, require_success, AsyncHttpClient, APPLICATION_JSON, FORM_URLENCODED},
};

use super::{offer::PRE_AUTHORIZED_CODE_GRANT_TYPE, proof::Proofs};

#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub c_nonce: Option<String>,
    #[serde(default)]
    pub c_nonce_expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("c_nonce_expires_in", &self.c_nonce_expires_in)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NonceResponse {
    pub c_nonce: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialRequest {
    pub credential_configuration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proofs: Option<Proofs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialResponse {
    #[serde(default)]
    pub credential: Option<Json>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub c_nonce: Option<String>,
    #[serde(default)]
    pub c_nonce_expires_in: Option<u64>,
    #[serde(default)]
    pub notification_id: Option<String>,
}

impl CredentialResponse {
    /// The issued credential, or the error explaining its absence.
    pub fn into_credential(self) -> Result<String, RemoteError> {
        match (self.credential, self.transaction_id) {
            (Some(Json::String(credential)), _) => Ok(credential),
            (Some(other), _) => Ok(other.to_string()),
            (None, None) => Err(RemoteError::TransactionIdRequired),
            (None, Some(transaction_id)) => {
                Err(RemoteError::DeferredIssuanceNotSupported { transaction_id })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Redeem a pre-authorized code at the token endpoint.
pub async fn request_token<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    token_endpoint: &Url,
    pre_authorized_code: &str,
    tx_code: Option<&str>,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", PRE_AUTHORIZED_CODE_GRANT_TYPE),
        ("pre-authorized_code", pre_authorized_code),
    ];
    if let Some(tx_code) = tx_code {
        form.push(("tx_code", tx_code));
    }
    let body = serde_urlencoded::to_string(&form).context("failed to encode token request")?;
    let request = Request::builder()
        .method("POST")
        .uri(token_endpoint.as_str())
        .header(CONTENT_TYPE, FORM_URLENCODED)
        .header(ACCEPT, APPLICATION_JSON)
        .body(body.into_bytes())
        .context("failed to build token request")?;

    let url = token_endpoint.as_str();
    let response = execute(http_client, request).await?;
    if !response.status().is_success() {
        if let Ok(body) = serde_json::from_slice::<OAuthErrorBody>(response.body()) {
            return Err(RemoteError::OAuth {
                error: body.error,
                error_description: body.error_description,
            }
            .into());
        }
    }
    let response = require_success(url, response)?;
    debug!(url, "access token received");
    Ok(parse_json_body(url, &response)?)
}

/// Fetch a fresh `c_nonce`.
pub async fn request_nonce<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    nonce_endpoint: &Url,
) -> Result<NonceResponse> {
    let request = Request::builder()
        .method("POST")
        .uri(nonce_endpoint.as_str())
        .header(ACCEPT, APPLICATION_JSON)
        .body(Vec::new())
        .context("failed to build nonce request")?;

    let url = nonce_endpoint.as_str();
    let response = require_success(url, execute(http_client, request).await?)?;
    Ok(parse_json_body(url, &response)?)
}

pub async fn request_credential<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    credential_endpoint: &Url,
    access_token: &str,
    credential_request: &CredentialRequest,
) -> Result<CredentialResponse> {
    let body =
        serde_json::to_vec(credential_request).context("failed to encode credential request")?;
    let request = Request::builder()
        .method("POST")
        .uri(credential_endpoint.as_str())
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .header(ACCEPT, APPLICATION_JSON)
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .body(body)
        .context("failed to build credential request")?;

    let url = credential_endpoint.as_str();
    let response = require_success(url, execute(http_client, request).await?)?;
    Ok(parse_json_body(url, &response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::util::tests::{json_response, text_response, MockHttpClient};
    use serde_json::json;

    fn url(path: &str) -> Url {
        format!("https://issuer.example{path}").parse().unwrap()
    }

    #[tokio::test]
    async fn token_request_is_a_form() {
        let client = MockHttpClient::new([json_response(
            200,
            json!({"access_token": "at", "token_type": "bearer", "expires_in": 86400}),
        )]);

        let token = request_token(&client, &url("/token"), "code", Some("1234"))
            .await
            .unwrap();
        assert_eq!(token.access_token, "at");
        assert!(!format!("{token:?}").contains("\"at\""));

        let request = &client.requests()[0];
        assert_eq!(request.headers[CONTENT_TYPE], FORM_URLENCODED);
        assert_eq!(
            request.form(),
            [
                ("grant_type".to_owned(), PRE_AUTHORIZED_CODE_GRANT_TYPE.to_owned()),
                ("pre-authorized_code".to_owned(), "code".to_owned()),
                ("tx_code".to_owned(), "1234".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn token_errors() {
        let client = MockHttpClient::new([
            json_response(
                400,
                json!({"error": "invalid_grant", "error_description": "code used"}),
            ),
            text_response(500, "oops"),
        ]);

        let err = request_token(&client, &url("/token"), "code", None)
            .await
            .unwrap_err();
        assert_eq!(
            err.remote(),
            Some(&RemoteError::OAuth {
                error: "invalid_grant".into(),
                error_description: Some("code used".into()),
            })
        );

        let err = request_token(&client, &url("/token"), "code", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.remote(),
            Some(RemoteError::HttpStatus { body: Some(body), .. }) if body == "oops"
        ));
    }

    #[tokio::test]
    async fn credential_request_carries_bearer_token() {
        let client = MockHttpClient::new([json_response(200, json!({"credential": "a.b.c~"}))]);
        let body = CredentialRequest {
            credential_configuration_id: "IdentityCredential".into(),
            proofs: None,
        };

        let response = request_credential(&client, &url("/credential"), "at", &body)
            .await
            .unwrap();
        assert_eq!(response.into_credential().unwrap(), "a.b.c~");

        let request = &client.requests()[0];
        assert_eq!(request.headers[AUTHORIZATION], "Bearer at");
        let sent: Json = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent, json!({"credential_configuration_id": "IdentityCredential"}));
    }

    #[test]
    fn missing_credential() {
        assert_eq!(
            CredentialResponse::default().into_credential(),
            Err(RemoteError::TransactionIdRequired)
        );
        let deferred = CredentialResponse {
            transaction_id: Some("tx".into()),
            ..Default::default()
        };
        assert_eq!(
            deferred.into_credential(),
            Err(RemoteError::DeferredIssuanceNotSupported {
                transaction_id: "tx".into()
            })
        );
    }
}
