use std::fmt;

use crate::core::object::{TypedParameter, UntypedObject};
use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

const DID: &str = "did";
const DECENTRALIZED_IDENTIFIER: &str = "decentralized_identifier";
const ENTITY_ID: &str = "entity_id";
const PREREGISTERED: &str = "pre-registered";
const REDIRECT_URI: &str = "redirect_uri";
const VERIFIER_ATTESTATION: &str = "verifier_attestation";
const X509_SAN_DNS: &str = "x509_san_dns";
const X509_SAN_URI: &str = "x509_san_uri";
const X509_HASH: &str = "x509_hash";

/// Schemes that may prefix a `client_id` (`<scheme>:<identifier>`).
const PREFIXED_SCHEMES: [&str; 5] = [
    X509_SAN_DNS,
    X509_HASH,
    REDIRECT_URI,
    DECENTRALIZED_IDENTIFIER,
    VERIFIER_ATTESTATION,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    /// Split a scheme prefix off the client identifier.
    ///
    /// `x509_hash:abc` yields `(Some(X509Hash), "abc")`. Identifiers without a known prefix,
    /// such as `https://verifier.example/cb`, are returned whole.
    pub fn split_prefix(&self) -> (Option<ClientIdScheme>, &str) {
        match self.0.split_once(':') {
            Some((prefix, rest)) if PREFIXED_SCHEMES.contains(&prefix) => {
                (Some(prefix.to_owned().into()), rest)
            }
            _ => (None, &self.0),
        }
    }
}

impl TypedParameter for ClientId {
    const KEY: &'static str = "client_id";
}

impl TryFrom<Json> for ClientId {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<ClientId> for Json {
    fn from(value: ClientId) -> Self {
        Json::String(value.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIdScheme {
    Did,
    EntityId,
    PreRegistered,
    RedirectUri,
    VerifierAttestation,
    X509SanDns,
    X509SanUri,
    X509Hash,
    Other(String),
}

impl ClientIdScheme {
    /// Schemes authenticated through the `x5c` header of the request object.
    pub fn is_x509(&self) -> bool {
        matches!(self, Self::X509SanDns | Self::X509SanUri | Self::X509Hash)
    }
}

impl TypedParameter for ClientIdScheme {
    const KEY: &'static str = "client_id_scheme";
}

impl From<String> for ClientIdScheme {
    fn from(s: String) -> Self {
        match s.as_str() {
            DID | DECENTRALIZED_IDENTIFIER => ClientIdScheme::Did,
            ENTITY_ID => ClientIdScheme::EntityId,
            PREREGISTERED => ClientIdScheme::PreRegistered,
            REDIRECT_URI => ClientIdScheme::RedirectUri,
            VERIFIER_ATTESTATION => ClientIdScheme::VerifierAttestation,
            X509_SAN_DNS => ClientIdScheme::X509SanDns,
            X509_SAN_URI => ClientIdScheme::X509SanUri,
            X509_HASH => ClientIdScheme::X509Hash,
            _ => ClientIdScheme::Other(s),
        }
    }
}

impl From<ClientIdScheme> for String {
    fn from(cis: ClientIdScheme) -> Self {
        match cis {
            ClientIdScheme::Other(u) => u,
            known => known.to_string(),
        }
    }
}

impl TryFrom<Json> for ClientIdScheme {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
            .map(String::into)
            .map_err(Error::from)
    }
}

impl From<ClientIdScheme> for Json {
    fn from(value: ClientIdScheme) -> Self {
        Json::String(value.into())
    }
}

impl fmt::Display for ClientIdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdScheme::Did => DID,
            ClientIdScheme::EntityId => ENTITY_ID,
            ClientIdScheme::PreRegistered => PREREGISTERED,
            ClientIdScheme::RedirectUri => REDIRECT_URI,
            ClientIdScheme::VerifierAttestation => VERIFIER_ATTESTATION,
            ClientIdScheme::X509SanDns => X509_SAN_DNS,
            ClientIdScheme::X509SanUri => X509_SAN_URI,
            ClientIdScheme::X509Hash => X509_HASH,
            ClientIdScheme::Other(o) => o,
        }
        .fmt(f)
    }
}

/// `client_metadata` field in the Authorization Request.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMetadata(pub UntypedObject);

impl ClientMetadata {
    pub fn jwks(&self) -> Option<anyhow::Result<Jwks>> {
        self.0.get()
    }
}

impl TypedParameter for ClientMetadata {
    const KEY: &'static str = "client_metadata";
}

impl From<ClientMetadata> for Json {
    fn from(cm: ClientMetadata) -> Self {
        cm.0.into()
    }
}

impl TryFrom<Json> for ClientMetadata {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        // Passed as a query parameter, the object arrives JSON encoded.
        let value = match value {
            Json::String(s) => {
                serde_json::from_str(&s).context("client_metadata string was not JSON")?
            }
            v => v,
        };
        Ok(serde_json::from_value(value).map(ClientMetadata)?)
    }
}

/// `client_metadata_uri` field in the Authorization Request.
#[derive(Debug, Clone)]
pub struct ClientMetadataUri(pub Url);

impl TypedParameter for ClientMetadataUri {
    const KEY: &'static str = "client_metadata_uri";
}

impl From<ClientMetadataUri> for Json {
    fn from(cmu: ClientMetadataUri) -> Self {
        cmu.0.to_string().into()
    }
}

impl TryFrom<Json> for ClientMetadataUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(ClientMetadataUri)?)
    }
}

/// `jwks` entry of the client metadata: the verifier's published keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Map<String, Json>>,
}

impl TypedParameter for Jwks {
    const KEY: &'static str = "jwks";
}

impl TryFrom<Json> for Jwks {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value).context("invalid jwks")
    }
}

impl TryFrom<Jwks> for Json {
    type Error = Error;

    fn try_from(value: Jwks) -> Result<Self, Self::Error> {
        serde_json::to_value(value).context("failed to serialize jwks")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(pub String);

impl TypedParameter for Nonce {
    const KEY: &'static str = "nonce";
}

impl TryFrom<Json> for Nonce {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Nonce> for Json {
    fn from(value: Nonce) -> Self {
        Json::String(value.0)
    }
}

impl From<&str> for Nonce {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// `redirect_uri` field in the Authorization Request.
#[derive(Debug, Clone)]
pub struct RedirectUri(pub Url);

impl TypedParameter for RedirectUri {
    const KEY: &'static str = "redirect_uri";
}

impl From<RedirectUri> for Json {
    fn from(cmu: RedirectUri) -> Self {
        cmu.0.to_string().into()
    }
}

impl TryFrom<Json> for RedirectUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(RedirectUri)?)
    }
}

/// `response_uri` field in the Authorization Request.
#[derive(Debug, Clone)]
pub struct ResponseUri(pub Url);

impl TypedParameter for ResponseUri {
    const KEY: &'static str = "response_uri";
}

impl From<ResponseUri> for Json {
    fn from(cmu: ResponseUri) -> Self {
        cmu.0.to_string().into()
    }
}

impl TryFrom<Json> for ResponseUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(ResponseUri)?)
    }
}

/// `request_uri` field: the request object is fetched from this location.
#[derive(Debug, Clone)]
pub struct RequestUri(pub Url);

impl TypedParameter for RequestUri {
    const KEY: &'static str = "request_uri";
}

impl From<RequestUri> for Json {
    fn from(value: RequestUri) -> Self {
        value.0.to_string().into()
    }
}

impl TryFrom<Json> for RequestUri {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(value).map(RequestUri)?)
    }
}

/// `request` field: the request object passed by value.
#[derive(Debug, Clone)]
pub struct RequestObjectJwt(pub String);

impl TypedParameter for RequestObjectJwt {
    const KEY: &'static str = "request";
}

impl From<RequestObjectJwt> for Json {
    fn from(value: RequestObjectJwt) -> Self {
        Json::String(value.0)
    }
}

impl TryFrom<Json> for RequestObjectJwt {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

const DIRECT_POST: &str = "direct_post";
const DIRECT_POST_JWT: &str = "direct_post.jwt";
const POST: &str = "post";
const FRAGMENT: &str = "fragment";
const QUERY: &str = "query";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "String", from = "String")]
pub enum ResponseMode {
    /// The `direct_post` response mode as defined in OID4VP.
    DirectPost,
    /// The `direct_post.jwt` response mode as defined in OID4VP.
    DirectPostJwt,
    /// Form post to the redirect endpoint.
    Post,
    /// The OAuth 2.0 default when `response_mode` is absent.
    #[default]
    Fragment,
    Query,
    /// A ResponseMode that is unsupported by this library.
    Unsupported(String),
}

impl ResponseMode {
    /// Modes that deliver the response to `response_uri` rather than `redirect_uri`.
    pub fn uses_response_uri(&self) -> bool {
        matches!(self, Self::DirectPost | Self::DirectPostJwt | Self::Post)
    }
}

impl TypedParameter for ResponseMode {
    const KEY: &'static str = "response_mode";
}

impl From<String> for ResponseMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            DIRECT_POST => ResponseMode::DirectPost,
            DIRECT_POST_JWT => ResponseMode::DirectPostJwt,
            POST => ResponseMode::Post,
            FRAGMENT => ResponseMode::Fragment,
            QUERY => ResponseMode::Query,
            _ => ResponseMode::Unsupported(s),
        }
    }
}

impl From<ResponseMode> for String {
    fn from(s: ResponseMode) -> Self {
        match s {
            ResponseMode::Unsupported(u) => u,
            known => known.to_string(),
        }
    }
}

impl TryFrom<Json> for ResponseMode {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(s.into())
    }
}

impl From<ResponseMode> for Json {
    fn from(rm: ResponseMode) -> Self {
        String::from(rm).into()
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::DirectPost => DIRECT_POST,
            ResponseMode::DirectPostJwt => DIRECT_POST_JWT,
            ResponseMode::Post => POST,
            ResponseMode::Fragment => FRAGMENT,
            ResponseMode::Query => QUERY,
            ResponseMode::Unsupported(u) => u,
        }
        .fmt(f)
    }
}

const VP_TOKEN: &str = "vp_token";
const ID_TOKEN: &str = "id_token";

/// `response_type`: a space separated set of requested tokens.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(into = "String", from = "String")]
pub enum ResponseType {
    VpToken,
    IdToken,
    VpTokenIdToken,
    Unsupported(String),
}

impl ResponseType {
    pub fn requests_vp_token(&self) -> bool {
        matches!(self, Self::VpToken | Self::VpTokenIdToken)
    }

    pub fn requests_id_token(&self) -> bool {
        matches!(self, Self::IdToken | Self::VpTokenIdToken)
    }
}

impl From<ResponseType> for String {
    fn from(rt: ResponseType) -> Self {
        match rt {
            ResponseType::VpToken => VP_TOKEN.into(),
            ResponseType::IdToken => ID_TOKEN.into(),
            ResponseType::VpTokenIdToken => format!("{VP_TOKEN} {ID_TOKEN}"),
            ResponseType::Unsupported(s) => s,
        }
    }
}

impl From<String> for ResponseType {
    fn from(s: String) -> Self {
        let mut vp_token = false;
        let mut id_token = false;
        for token in s.split_whitespace() {
            match token {
                VP_TOKEN => vp_token = true,
                ID_TOKEN => id_token = true,
                _ => return ResponseType::Unsupported(s),
            }
        }
        match (vp_token, id_token) {
            (true, true) => ResponseType::VpTokenIdToken,
            (true, false) => ResponseType::VpToken,
            (false, true) => ResponseType::IdToken,
            (false, false) => ResponseType::Unsupported(s),
        }
    }
}

impl TypedParameter for ResponseType {
    const KEY: &'static str = "response_type";
}

impl TryFrom<Json> for ResponseType {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let s: String = serde_json::from_value(value)?;
        Ok(s.into())
    }
}

impl From<ResponseType> for Json {
    fn from(rt: ResponseType) -> Self {
        Json::String(rt.into())
    }
}

#[derive(Debug, Clone)]
pub struct State(pub String);

impl TypedParameter for State {
    const KEY: &'static str = "state";
}

impl TryFrom<Json> for State {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<State> for Json {
    fn from(value: State) -> Self {
        Json::String(value.0)
    }
}
