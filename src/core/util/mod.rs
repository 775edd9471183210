use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use http::{header::CONTENT_TYPE, Request, Response};
use serde_json::{Map, Value as Json};

use super::error::RemoteError;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const APPLICATION_JSON: &str = "application/json";

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient: Send + Sync {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

#[async_trait]
impl<T: AsyncHttpClient + ?Sized> AsyncHttpClient for Arc<T> {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        self.as_ref().execute(request).await
    }
}

pub(crate) fn base_request() -> http::request::Builder {
    Request::builder().header("Prefer", "OID4VP-1.0")
}

/// Execute `request`, mapping a transport failure to [RemoteError::Transport].
///
/// The status code is not inspected.
pub(crate) async fn execute<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    request: Request<Vec<u8>>,
) -> Result<Response<Vec<u8>>, RemoteError> {
    let url = request.uri().to_string();
    http_client
        .execute(request)
        .await
        .map_err(|e| RemoteError::Transport {
            url,
            reason: format!("{e:#}"),
        })
}

/// Build an url-encoded form POST.
pub(crate) fn form_post(url: &str, form: &[(String, String)]) -> Result<Request<Vec<u8>>> {
    let body = serde_urlencoded::to_string(form).context("failed to encode form body")?;
    base_request()
        .method("POST")
        .uri(url)
        .header(CONTENT_TYPE, FORM_URLENCODED)
        .body(body.into_bytes())
        .context("failed to build form request")
}

/// Reject responses outside of the 2xx range, keeping the body when it is UTF-8.
pub(crate) fn require_success(
    url: &str,
    response: Response<Vec<u8>>,
) -> Result<Response<Vec<u8>>, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(RemoteError::HttpStatus {
        url: url.to_owned(),
        status,
        body: String::from_utf8(response.into_body()).ok(),
    })
}

pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(
    url: &str,
    response: &Response<Vec<u8>>,
) -> Result<T, RemoteError> {
    serde_json::from_slice(response.body()).map_err(|e| RemoteError::InvalidResponseBody {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// Split a compact JWS into its three encoded segments.
pub(crate) fn split_jwt(jwt: &str) -> Result<(&str, &str, &str)> {
    let mut parts = jwt.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => bail!("a compact JWT must have exactly three segments"),
    }
}

fn decode_segment(segment: &str) -> Result<Map<String, Json>> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .context("jwt segment was not valid base64url")?;
    serde_json::from_slice(&bytes).context("jwt segment was not a JSON object")
}

/// Decode the payload of a compact JWT without verifying its signature.
pub(crate) fn decode_jwt_payload(jwt: &str) -> Result<Map<String, Json>> {
    let (_, payload, _) = split_jwt(jwt)?;
    decode_segment(payload)
}

/// Decode the header of a compact JWT without verifying its signature.
pub(crate) fn decode_jwt_header(jwt: &str) -> Result<Map<String, Json>> {
    let (header, _, _) = split_jwt(jwt)?;
    decode_segment(header)
}

pub(crate) fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}
