//! The presentation engine: resolves a verifier request, builds the SIOP `id_token` and the
//! OID4VP `vp_token`, and delivers them.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ProviderOptions,
    core::{
        authorization_request::{
            parameters::{ResponseMode, State},
            verification::{DefaultRequestVerifier, RequestVerification},
            AuthorizationRequest, ProcessedRequestData,
        },
        credential_format::ClaimFormatDesignation,
        error::{Error, InputError, ProtocolStateError, Result},
        jwe::ResponseEncryption,
        matching::CredentialMatcher,
        response::{
            id_token::IdTokenClaims,
            parameters::{IdToken, VpToken},
            AuthorizationResponse, PostResult, UnencodedAuthorizationResponse,
        },
        signer::KeyStore,
        submission::{
            DisclosedClaim, PreparedSubmissionData, SubmissionAssembler, SubmissionBatch,
            SubmissionCredential,
        },
        util::{execute, form_post, unix_timestamp, AsyncHttpClient},
    },
};

/// A credential from the holder's store, offered for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldCredential {
    pub id: String,
    pub format: ClaimFormatDesignation,
    pub types: Vec<String>,
    pub raw_credential: String,
}

/// The claims shared from one credential, for the holder's sharing history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedCredential {
    pub id: String,
    pub purpose: Option<String>,
    pub shared_claims: Vec<DisclosedClaim>,
}

impl From<PreparedSubmissionData> for SharedCredential {
    fn from(prepared: PreparedSubmissionData) -> Self {
        Self {
            id: prepared.credential_id,
            purpose: prepared.purpose,
            shared_claims: prepared.disclosed_claims,
        }
    }
}

/// A built but not yet delivered response.
#[derive(Debug, Clone)]
pub struct PreparedResponse {
    pub response: UnencodedAuthorizationResponse,
    pub id_token: Option<IdToken>,
    pub shared_credentials: Vec<SharedCredential>,
}

/// Outcome of a delivered response.
#[derive(Debug, Clone)]
pub struct TokenSendResult {
    pub post_result: PostResult,
    pub id_token: Option<IdToken>,
    pub shared_credentials: Vec<SharedCredential>,
}

/// Self-issued OpenID provider and OID4VP wallet.
pub struct OpenIdProvider<H> {
    http_client: H,
    key_store: Arc<dyn KeyStore>,
    verification: Arc<dyn RequestVerification>,
    matcher: CredentialMatcher,
    assembler: Option<SubmissionAssembler>,
    options: ProviderOptions,
}

impl<H: std::fmt::Debug> std::fmt::Debug for OpenIdProvider<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdProvider")
            .field("http_client", &self.http_client)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<H: AsyncHttpClient> OpenIdProvider<H> {
    pub fn new(http_client: H, key_store: Arc<dyn KeyStore>) -> Self {
        Self {
            http_client,
            key_store,
            verification: Arc::new(DefaultRequestVerifier),
            matcher: CredentialMatcher::new(),
            assembler: None,
            options: ProviderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_request_verification(mut self, verification: Arc<dyn RequestVerification>) -> Self {
        self.verification = verification;
        self
    }

    /// Replace the key binding and VP JWT capabilities, which otherwise sign with the key
    /// stored under [ProviderOptions::binding_key_alias].
    pub fn with_assembler(mut self, assembler: SubmissionAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn http_client(&self) -> &H {
        &self.http_client
    }

    /// Parse, resolve and authenticate an authorization request URL.
    pub async fn process_request(&self, url: &Url) -> Result<ProcessedRequestData> {
        let request = AuthorizationRequest::from_url(url)?;
        request
            .resolve(&self.http_client, self.verification.as_ref())
            .await
    }

    /// Match each held credential against the request query.
    ///
    /// Credentials that satisfy no query entry are left out. Selectable claims of the result may
    /// be toggled before responding.
    pub fn match_credentials(
        &self,
        request: &ProcessedRequestData,
        credentials: &[HeldCredential],
    ) -> Vec<SubmissionCredential> {
        let queries = request.credential_queries();
        credentials
            .iter()
            .filter_map(|held| {
                let matched =
                    self.matcher
                        .match_credential(&held.format, &held.raw_credential, &queries)?;
                debug!(credential = %held.id, query = matched.query.id(), "credential can be presented");
                Some(SubmissionCredential::from_match(
                    held.id.clone(),
                    held.format.clone(),
                    held.types.clone(),
                    held.raw_credential.clone(),
                    matched,
                ))
            })
            .collect()
    }

    /// Build the response parameters without sending them.
    pub async fn prepare_response(
        &self,
        request: &ProcessedRequestData,
        credentials: &[SubmissionCredential],
    ) -> Result<PreparedResponse> {
        let id_token_requested = request.is_id_token_requested();
        let vp_token_requested = request.is_vp_token_requested();
        if !id_token_requested && !vp_token_requested {
            return Err(ProtocolStateError::NothingRequested.into());
        }

        let audience = request.client_id().0.as_str();
        let nonce = request.nonce().0.as_str();
        let mut response = UnencodedAuthorizationResponse::default();

        let id_token = if id_token_requested {
            let signer = self
                .key_store
                .get_or_create(&self.options.pairwise_key_alias)
                .await
                .map_err(|_| ProtocolStateError::KeyPair {
                    alias: self.options.pairwise_key_alias.clone(),
                })?;
            let claims = IdTokenClaims::new(
                signer.jwk(),
                audience,
                nonce,
                unix_timestamp(),
                self.options.id_token_ttl,
            )?;
            let id_token = claims.sign(signer.as_ref()).await?;
            response.id_token = Some(id_token.clone());
            Some(id_token)
        } else {
            None
        };

        let mut shared_credentials = Vec::new();
        if vp_token_requested {
            let query = request.query().ok_or(ProtocolStateError::PresentationQuery)?;
            if credentials.is_empty() {
                return Err(InputError::NoCredentialsSubmitted.into());
            }
            let assembler = self.assembler().await?;

            let mut prepared = Vec::with_capacity(credentials.len());
            for credential in credentials {
                prepared.push(assembler.prepare(credential, audience, nonce).await?);
            }

            let batch = SubmissionBatch::new(
                query.language(),
                &prepared,
                query.presentation_definition().map(|pd| pd.id().as_str()),
            )?;
            response.vp_token = Some(VpToken(batch.vp_token));
            response.presentation_submission = batch.presentation_submission;
            shared_credentials = prepared.into_iter().map(SharedCredential::from).collect();
        }

        if !request.state().is_empty() {
            response.state = Some(State(request.state().to_owned()));
        }

        Ok(PreparedResponse {
            response,
            id_token,
            shared_credentials,
        })
    }

    /// Build the response and deliver it to the verifier.
    pub async fn respond(
        &self,
        request: &ProcessedRequestData,
        credentials: &[SubmissionCredential],
    ) -> Result<TokenSendResult> {
        ensure_dispatchable(request.response_mode())?;
        let prepared = self.prepare_response(request, credentials).await?;
        let post_result = self.dispatch(request, prepared.response).await?;
        Ok(TokenSendResult {
            post_result,
            id_token: prepared.id_token,
            shared_credentials: prepared.shared_credentials,
        })
    }

    /// Deliver response parameters according to the request's response mode.
    ///
    /// `direct_post.jwt` falls back to a plain `direct_post` when the verifier publishes no
    /// usable encryption key.
    pub async fn dispatch(
        &self,
        request: &ProcessedRequestData,
        response: UnencodedAuthorizationResponse,
    ) -> Result<PostResult> {
        let response_mode = request.response_mode();
        ensure_dispatchable(response_mode)?;

        let response = match response_mode {
            ResponseMode::DirectPostJwt => match request
                .client_metadata()
                .and_then(ResponseEncryption::from_client_metadata)
            {
                Some(encryption) => AuthorizationResponse::Jwt(response.encrypt(&encryption)?),
                None => {
                    warn!("verifier publishes no usable encryption key, posting the response unencrypted");
                    AuthorizationResponse::Unencoded(response)
                }
            },
            _ => AuthorizationResponse::Unencoded(response),
        };

        let return_uri = request.return_uri();
        let http_request = form_post(return_uri.as_str(), &response.form()?)?;
        let http_response = execute(&self.http_client, http_request).await?;
        let post_result = PostResult::from_response(return_uri, http_response)?;

        info!(
            status = %post_result.status,
            redirect = post_result.location.is_some(),
            "authorization response delivered"
        );
        Ok(post_result)
    }

    async fn assembler(&self) -> Result<SubmissionAssembler> {
        if let Some(assembler) = &self.assembler {
            return Ok(assembler.clone());
        }
        let signer = self
            .key_store
            .get_or_create(&self.options.binding_key_alias)
            .await
            .map_err(|_| ProtocolStateError::KeyPair {
                alias: self.options.binding_key_alias.clone(),
            })?;
        Ok(SubmissionAssembler::from_signer(signer))
    }
}

fn ensure_dispatchable(response_mode: &ResponseMode) -> Result<()> {
    match response_mode {
        ResponseMode::DirectPost | ResponseMode::DirectPostJwt => Ok(()),
        other => Err(Error::from(InputError::UnsupportedResponseMode {
            response_mode: other.to_string(),
        })),
    }
}
