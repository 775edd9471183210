//! Resolution of verifier authorization requests.
//!
//! An [AuthorizationRequest] holds the query parameters of a wallet invocation URL
//! (`openid4vp://?...`, `haip://?...`, `siopv2://?...` or any other scheme).
//! [AuthorizationRequest::resolve] fetches whatever is passed by reference, authenticates the
//! request object according to the client identifier scheme and returns the
//! [ProcessedRequestData] a response is built from.

use anyhow::Context;
use serde_json::{Map, Value as Json};
use tracing::{debug, info};
use url::Url;

use super::{
    error::{Error, InputError, RemoteError, Result},
    object::{TypedParameter, UntypedObject},
    presentation_definition::{PresentationDefinition, PresentationDefinitionUri},
    query::{CredentialQuery, PresentationQuery},
    dcql_query::DcqlQuery,
    util::{base_request, decode_jwt_payload, execute, parse_json_body, require_success, split_jwt, AsyncHttpClient},
};

use self::{
    parameters::{
        ClientId, ClientIdScheme, ClientMetadata, ClientMetadataUri, Nonce, RedirectUri,
        RequestObjectJwt, RequestUri, ResponseMode, ResponseType, ResponseUri, State,
    },
    verification::{verify_request, RequestVerification, VerificationContext},
};

pub mod parameters;
pub mod verification;

/// An Authorization Request as received by the wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest(UntypedObject);

impl AuthorizationRequest {
    /// Parse from a wallet invocation [Url]. The scheme and authority are not inspected.
    /// ```
    /// # use oid4wallet::core::authorization_request::AuthorizationRequest;
    /// # use url::Url;
    /// let url: Url = "openid4vp://?client_id=xyz&request_uri=https%3A%2F%2Fverifier.example%2Fr"
    ///     .parse()
    ///     .unwrap();
    ///
    /// let request = AuthorizationRequest::from_url(&url).unwrap();
    ///
    /// assert_eq!(request.parameters().as_map()["client_id"], "xyz");
    /// ```
    pub fn from_url(url: &Url) -> Result<Self> {
        let query = url
            .query()
            .ok_or_else(|| invalid("missing query params in Authorization Request uri"))?;
        Self::from_query_params(query)
    }

    /// Parse from urlencoded query parameters. Every value is kept as a string.
    pub fn from_query_params(query_params: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query_params)
            .map_err(|e| invalid(format!("unable to parse query params: {e}")))?;
        if pairs.is_empty() {
            return Err(invalid("Authorization Request has no parameters"));
        }
        let map: Map<String, Json> = pairs
            .into_iter()
            .map(|(key, value)| (key, Json::String(value)))
            .collect();
        Ok(Self(map.into()))
    }

    pub fn parameters(&self) -> &UntypedObject {
        &self.0
    }

    /// Resolve and authenticate the request.
    ///
    /// Fails before any response could be built when the request object cannot be
    /// authenticated under its client identifier scheme.
    pub async fn resolve<H: AsyncHttpClient + ?Sized>(
        self,
        http_client: &H,
        verification: &dyn RequestVerification,
    ) -> Result<ProcessedRequestData> {
        let params = self.0;

        let request_jwt = match (
            optional::<RequestObjectJwt>(&params)?,
            optional::<RequestUri>(&params)?,
        ) {
            (Some(by_value), _) => Some(by_value.0),
            (None, Some(by_reference)) => {
                let response = get(http_client, &by_reference.0).await?;
                let body = String::from_utf8(response.into_body()).map_err(|e| {
                    RemoteError::InvalidResponseBody {
                        url: by_reference.0.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Some(body.trim().to_owned())
            }
            (None, None) => None,
        };

        let (request_object, signed) = match &request_jwt {
            Some(jwt) => {
                let (_, _, signature) = split_jwt(jwt).map_err(|e| invalid(format!("{e:#}")))?;
                let mut object = UntypedObject::new(
                    decode_jwt_payload(jwt).map_err(|e| invalid(format!("{e:#}")))?,
                );
                if let (Some(outer), Some(inner)) = (
                    optional::<ClientId>(&params)?,
                    optional::<ClientId>(&object)?,
                ) {
                    if outer != inner {
                        return Err(invalid(format!(
                            "Authorization Request and Request Object have different client ids: '{outer}' vs. '{inner}'"
                        )));
                    }
                }
                object.fill_missing_from(&params);
                (object, !signature.is_empty())
            }
            None => (params, false),
        };

        let client_id: ClientId = required(&request_object)?;
        let (prefix, bare_client_id) = client_id.split_prefix();
        let client_id_scheme = match prefix {
            Some(scheme) => scheme,
            None => optional::<ClientIdScheme>(&request_object)?
                .unwrap_or(ClientIdScheme::RedirectUri),
        };

        let response_type: ResponseType = required(&request_object)?;
        if let ResponseType::Unsupported(response_type) = response_type {
            return Err(InputError::UnsupportedResponseType { response_type }.into());
        }

        let response_mode = optional::<ResponseMode>(&request_object)?.unwrap_or_default();
        if let ResponseMode::Unsupported(response_mode) = response_mode {
            return Err(InputError::UnsupportedResponseMode { response_mode }.into());
        }

        let nonce: Nonce = required(&request_object)?;
        let state = optional::<State>(&request_object)?
            .map(|state| state.0)
            .unwrap_or_default();

        let (return_uri, raw_return_uri) = if response_mode.uses_response_uri() {
            let uri: ResponseUri = required(&request_object)?;
            (uri.0, raw_string(&request_object, ResponseUri::KEY))
        } else {
            let uri: RedirectUri = required(&request_object)?;
            (uri.0, raw_string(&request_object, RedirectUri::KEY))
        };

        let client_metadata = match (
            optional::<ClientMetadata>(&request_object)?,
            optional::<ClientMetadataUri>(&request_object)?,
        ) {
            (Some(inline), _) => Some(inline),
            (None, Some(by_reference)) => {
                let response = get(http_client, &by_reference.0).await?;
                let metadata: Map<String, Json> =
                    parse_json_body(by_reference.0.as_str(), &response)?;
                Some(ClientMetadata(metadata.into()))
            }
            (None, None) => None,
        };

        let query = if response_type.requests_vp_token() {
            Some(resolve_query(http_client, &request_object).await?)
        } else {
            None
        };

        debug!(
            client_id = %client_id,
            scheme = %client_id_scheme,
            response_mode = %response_mode,
            signed,
            "resolved authorization request"
        );

        let context = VerificationContext {
            client_id: bare_client_id,
            request_object: &request_object,
            client_metadata: client_metadata.as_ref(),
            return_uri: Some(&return_uri),
        };
        let verification_error = |reason: String| InputError::RequestVerification {
            scheme: client_id_scheme.to_string(),
            reason,
        };
        match &request_jwt {
            Some(jwt) if signed => verify_request(verification, &client_id_scheme, context, jwt)
                .await
                .map_err(|e| verification_error(format!("{e:#}")))?,
            _ if client_id_scheme.is_x509() => {
                return Err(verification_error("request object must be signed".into()).into())
            }
            _ => {}
        }

        if client_id_scheme == ClientIdScheme::RedirectUri {
            if raw_return_uri.as_deref() != Some(bare_client_id) {
                return Err(InputError::ClientIdMismatch {
                    client_id: client_id.0.clone(),
                    return_uri: return_uri.to_string(),
                }
                .into());
            }
        }

        info!(client_id = %client_id, "authorization request validated");

        Ok(ProcessedRequestData {
            request_object,
            request_jwt,
            signed,
            client_id,
            client_id_scheme,
            response_type,
            response_mode,
            nonce,
            state,
            return_uri,
            client_metadata,
            query,
        })
    }
}

/// A resolved and authenticated authorization request.
#[derive(Debug, Clone)]
pub struct ProcessedRequestData {
    request_object: UntypedObject,
    request_jwt: Option<String>,
    signed: bool,
    client_id: ClientId,
    client_id_scheme: ClientIdScheme,
    response_type: ResponseType,
    response_mode: ResponseMode,
    nonce: Nonce,
    state: String,
    return_uri: Url,
    client_metadata: Option<ClientMetadata>,
    query: Option<PresentationQuery>,
}

impl ProcessedRequestData {
    /// Request parameters, request object claims first.
    pub fn request_object(&self) -> &UntypedObject {
        &self.request_object
    }

    pub fn request_jwt(&self) -> Option<&str> {
        self.request_jwt.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// The full client identifier, prefix included. Tokens are addressed to it.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn client_id_scheme(&self) -> &ClientIdScheme {
        &self.client_id_scheme
    }

    pub fn response_type(&self) -> &ResponseType {
        &self.response_type
    }

    pub fn is_id_token_requested(&self) -> bool {
        self.response_type.requests_id_token()
    }

    pub fn is_vp_token_requested(&self) -> bool {
        self.response_type.requests_vp_token()
    }

    pub fn response_mode(&self) -> &ResponseMode {
        &self.response_mode
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// `state`, empty when the verifier sent none.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Uri to submit the response at.
    ///
    /// AKA [ResponseUri] or [RedirectUri] depending on [ResponseMode].
    pub fn return_uri(&self) -> &Url {
        &self.return_uri
    }

    pub fn client_metadata(&self) -> Option<&ClientMetadata> {
        self.client_metadata.as_ref()
    }

    pub fn query(&self) -> Option<&PresentationQuery> {
        self.query.as_ref()
    }

    /// Query entries in declaration order, empty when no vp_token was requested.
    pub fn credential_queries(&self) -> Vec<CredentialQuery> {
        self.query
            .as_ref()
            .map(PresentationQuery::credential_queries)
            .unwrap_or_default()
    }
}

async fn resolve_query<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    request_object: &UntypedObject,
) -> Result<PresentationQuery> {
    if let Some(dcql) = optional::<DcqlQuery>(request_object)? {
        return Ok(PresentationQuery::Dcql(dcql));
    }
    if let Some(definition) = optional::<PresentationDefinition>(request_object)? {
        return Ok(PresentationQuery::PresentationExchange(definition));
    }
    let Some(by_reference) = optional::<PresentationDefinitionUri>(request_object)? else {
        return Err(InputError::MissingPresentationQuery.into());
    };
    let url = by_reference.0.as_str();
    let response = get(http_client, &by_reference.0).await?;
    let definition: Json = parse_json_body(url, &response)?;
    let definition = PresentationDefinition::try_from(definition).map_err(|e| {
        RemoteError::InvalidResponseBody {
            url: url.to_owned(),
            reason: format!("{e:#}"),
        }
    })?;
    Ok(PresentationQuery::PresentationExchange(definition))
}

async fn get<H: AsyncHttpClient + ?Sized>(
    http_client: &H,
    url: &Url,
) -> Result<http::Response<Vec<u8>>> {
    let request = base_request()
        .method("GET")
        .uri(url.as_str())
        .body(vec![])
        .context("failed to build request")?;
    let response = execute(http_client, request).await?;
    Ok(require_success(url.as_str(), response)?)
}

fn invalid(reason: impl Into<String>) -> Error {
    InputError::InvalidAuthorizationRequest {
        reason: reason.into(),
    }
    .into()
}

fn optional<T: TypedParameter>(object: &UntypedObject) -> Result<Option<T>> {
    object
        .get::<T>()
        .transpose()
        .map_err(|e| invalid(format!("`{}`: {e:#}", T::KEY)))
}

fn required<T: TypedParameter>(object: &UntypedObject) -> Result<T> {
    optional(object)?.ok_or_else(|| {
        InputError::MissingRequestParameter {
            parameter: T::KEY,
        }
        .into()
    })
}

fn raw_string(object: &UntypedObject, key: &str) -> Option<String> {
    object.as_map().get(key)?.as_str().map(ToOwned::to_owned)
}
