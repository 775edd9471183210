//! Error tiers of the wallet engine.
//!
//! * [InputError]: the caller, the issuer or the verifier supplied something this engine
//!   cannot accept.
//! * [ProtocolStateError]: a flow tried to proceed without a field an earlier step must have
//!   resolved. Callers should restart the flow rather than retry the step.
//! * [RemoteError]: the remote party answered, but not with what the protocol expects.
//!
//! Lower level failures (JSON, base64, cryptography) surface as [Error::Other] with an
//! [anyhow] context chain.

use http::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    ProtocolState(#[from] ProtocolStateError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("credential offer URI carries no query items")]
    CredentialOfferQueryItemsNotFound,

    #[error("credential offer URI carries no `credential_offer` parameter")]
    CredentialOfferParameterNotFound,

    #[error("credential offer could not be parsed: {reason}")]
    InvalidCredentialOffer { reason: String },

    #[error("credential offer lists no credential configuration ids")]
    CredentialOfferConfigurationIsEmpty,

    #[error("credential offer has no pre-authorized code grant")]
    PreAuthorizedCodeGrantNotFound,

    #[error("credential offer requires a transaction code")]
    TransactionCodeRequired,

    #[error("credential configuration `{id}` is not offered by the issuer")]
    UnknownCredentialConfiguration { id: String },

    #[error("issuer metadata declares no {endpoint} endpoint")]
    MissingEndpoint { endpoint: &'static str },

    #[error("issuer does not accept `jwt` proofs (supported: {supported:?})")]
    UnsupportedProofType { supported: Vec<String> },

    #[error("signing algorithm `{alg}` is not accepted (supported: {supported:?})")]
    UnsupportedSigningAlgorithm { alg: String, supported: Vec<String> },

    #[error("unsupported credential format `{format}`")]
    UnsupportedCredentialFormat { format: String },

    #[error("disclosure of claim {claim:?} has no encoded form and cannot be presented")]
    IllegalDisclosure { claim: Option<String> },

    #[error("credential is malformed: {reason}")]
    IllegalCredential { reason: String },

    #[error("credential could not be converted to a stored record: {reason}")]
    CredentialConversion { reason: String },

    #[error("authorization request is invalid: {reason}")]
    InvalidAuthorizationRequest { reason: String },

    #[error("authorization request is missing `{parameter}`")]
    MissingRequestParameter { parameter: &'static str },

    #[error("request object verification failed for `{scheme}` client: {reason}")]
    RequestVerification { scheme: String, reason: String },

    #[error("client_id `{client_id}` does not match `{return_uri}`")]
    ClientIdMismatch {
        client_id: String,
        return_uri: String,
    },

    #[error("unsupported response_mode `{response_mode}`")]
    UnsupportedResponseMode { response_mode: String },

    #[error("unsupported response_type `{response_type}`")]
    UnsupportedResponseType { response_type: String },

    #[error("vp_token was requested without a presentation query")]
    MissingPresentationQuery,

    #[error("no credentials were supplied for the requested vp_token")]
    NoCredentialsSubmitted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolStateError {
    #[error("key pair `{alias}` is not available")]
    KeyPair { alias: String },

    #[error("presentation query has not been resolved")]
    PresentationQuery,

    #[error("neither id_token nor vp_token was requested")]
    NothingRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered with status {status}")]
    HttpStatus {
        url: String,
        status: StatusCode,
        body: Option<String>,
    },

    #[error("authorization server rejected the request: {error}")]
    OAuth {
        error: String,
        error_description: Option<String>,
    },

    #[error("response from {url} could not be parsed: {reason}")]
    InvalidResponseBody { url: String, reason: String },

    #[error("redirect from {url} carries no `Location` header")]
    MissingLocation { url: String },

    #[error("credential response carries neither a credential nor a transaction id")]
    TransactionIdRequired,

    #[error("deferred issuance (transaction id `{transaction_id}`) is not supported")]
    DeferredIssuanceNotSupported { transaction_id: String },
}

impl Error {
    pub fn input(&self) -> Option<&InputError> {
        match self {
            Error::Input(e) => Some(e),
            _ => None,
        }
    }

    pub fn protocol_state(&self) -> Option<&ProtocolStateError> {
        match self {
            Error::ProtocolState(e) => Some(e),
            _ => None,
        }
    }

    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_distinguishable() {
        let err: Error = InputError::UnsupportedProofType {
            supported: vec!["cwt".into()],
        }
        .into();
        assert_eq!(
            err.input(),
            Some(&InputError::UnsupportedProofType {
                supported: vec!["cwt".into()]
            })
        );
        assert!(err.remote().is_none());

        let err: Error = RemoteError::HttpStatus {
            url: "https://example.com".into(),
            status: StatusCode::BAD_REQUEST,
            body: Some("nope".into()),
        }
        .into();
        assert!(matches!(
            err.remote(),
            Some(RemoteError::HttpStatus { status, .. }) if *status == StatusCode::BAD_REQUEST
        ));
    }
}
