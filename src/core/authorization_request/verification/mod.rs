//! Authentication of signed request objects, by client identifier scheme.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use serde_json::{Map, Value as Json};
use url::Url;

use crate::core::{object::UntypedObject, util::split_jwt};

use self::verifier::{P256Verifier, Verifier};
use super::parameters::{ClientIdScheme, ClientMetadata};

pub mod client_metadata;
pub mod verifier;
pub mod x509_hash;
pub mod x509_san;

/// A request object JWT with its decoded header, ready for signature checks.
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    pub jwt: &'a str,
    pub header: Map<String, Json>,
    signing_input: &'a str,
    signature: Vec<u8>,
}

impl<'a> SignedRequest<'a> {
    pub fn parse(jwt: &'a str) -> Result<Self> {
        let (header_b64, _, signature_b64) = split_jwt(jwt)?;
        let header = BASE64_URL_SAFE_NO_PAD
            .decode(header_b64)
            .context("jwt headers were not valid base64url")?;
        let header = serde_json::from_slice(&header).context("jwt headers were not valid json")?;
        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .context("could not decode base64url encoded jwt signature")?;
        let signing_input = &jwt[..jwt.rfind('.').unwrap_or(jwt.len())];
        Ok(Self {
            jwt,
            header,
            signing_input,
            signature,
        })
    }

    pub fn alg(&self) -> Result<&str> {
        match self.header.get("alg") {
            Some(Json::String(alg)) => Ok(alg),
            Some(_) => bail!("'alg' header was not a string"),
            None => bail!("'alg' was missing from jwt headers"),
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.header.get("kid").and_then(Json::as_str)
    }

    /// DER bytes of the leaf certificate in the `x5c` header.
    pub fn leaf_certificate_der(&self) -> Result<Vec<u8>> {
        let Json::Array(x5chain) = self
            .header
            .get("x5c")
            .context("'x5c' was missing from jwt headers")?
        else {
            bail!("'x5c' header was not an array")
        };
        let Json::String(b64_x509) = x5chain.first().context("'x5c' was an empty array")? else {
            bail!("'x5c' header was not an array of strings");
        };
        BASE64_STANDARD_NO_PAD
            .decode(b64_x509.trim_end_matches('='))
            .context("leaf certificate in 'x5c' was not valid base64")
    }

    pub fn verify_with<V: Verifier>(&self, verifier: &V) -> Result<()> {
        verifier
            .verify(self.signing_input.as_bytes(), &self.signature)
            .context("request signature could not be verified")
    }
}

/// Everything a verification step may look at.
#[derive(Debug, Clone, Copy)]
pub struct VerificationContext<'a> {
    /// Client identifier with any scheme prefix removed.
    pub client_id: &'a str,
    pub request_object: &'a UntypedObject,
    pub client_metadata: Option<&'a ClientMetadata>,
    /// Where the response will be delivered.
    pub return_uri: Option<&'a Url>,
}

/// Verifies request objects.
///
/// Each method has a default implementation backed by [P256Verifier]; applications can
/// override individual schemes.
#[async_trait]
pub trait RequestVerification: Send + Sync {
    /// `client_id_scheme` `x509_san_dns`.
    ///
    /// See default implementation [x509_san].
    async fn x509_san_dns(
        &self,
        context: VerificationContext<'_>,
        request: &SignedRequest<'_>,
    ) -> Result<()> {
        x509_san::validate::<P256Verifier>(context, request)
    }

    /// `client_id_scheme` `x509_hash`.
    ///
    /// See default implementation [x509_hash].
    async fn x509_hash(
        &self,
        context: VerificationContext<'_>,
        request: &SignedRequest<'_>,
    ) -> Result<()> {
        x509_hash::validate::<P256Verifier>(context, request)
    }

    /// Every other scheme: the request object must verify against a key published in the
    /// client metadata.
    ///
    /// See default implementation [client_metadata].
    async fn other(
        &self,
        scheme: &ClientIdScheme,
        context: VerificationContext<'_>,
        request: &SignedRequest<'_>,
    ) -> Result<()> {
        tracing::debug!(%scheme, "verifying request object against client metadata");
        client_metadata::validate::<P256Verifier>(context, request)
    }
}

/// [RequestVerification] with the default checks for every scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRequestVerifier;

#[async_trait]
impl RequestVerification for DefaultRequestVerifier {}

pub(crate) async fn verify_request(
    verification: &dyn RequestVerification,
    scheme: &ClientIdScheme,
    context: VerificationContext<'_>,
    jwt: &str,
) -> Result<()> {
    let request = SignedRequest::parse(jwt)?;
    match scheme {
        ClientIdScheme::X509SanDns => verification.x509_san_dns(context, &request).await,
        ClientIdScheme::X509Hash => verification.x509_hash(context, &request).await,
        other => verification.other(other, context, &request).await,
    }
}
