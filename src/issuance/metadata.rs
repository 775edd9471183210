use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use crate::core::{
    credential_format::ClaimFormatDesignation,
    error::{InputError, Result},
};

/// Credential issuer metadata, as far as issuance needs it.
///
/// Unknown entries are kept so the record stored with a credential is a faithful snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialIssuerMetadata {
    /// Kept verbatim: it is the audience of proofs.
    pub credential_issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_servers: Option<Vec<Url>>,
    #[serde(default)]
    pub credential_configurations_supported: BTreeMap<String, CredentialConfiguration>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl CredentialIssuerMetadata {
    pub fn credential_endpoint(&self) -> Result<&Url> {
        self.credential_endpoint.as_ref().ok_or_else(|| {
            InputError::MissingEndpoint {
                endpoint: "credential",
            }
            .into()
        })
    }

    pub fn nonce_endpoint(&self) -> Result<&Url> {
        self.nonce_endpoint
            .as_ref()
            .ok_or_else(|| InputError::MissingEndpoint { endpoint: "nonce" }.into())
    }

    pub fn configuration(&self, id: &str) -> Result<&CredentialConfiguration> {
        self.credential_configurations_supported
            .get(id)
            .ok_or_else(|| InputError::UnknownCredentialConfiguration { id: id.to_owned() }.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfiguration {
    pub format: ClaimFormatDesignation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_definition: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cryptographic_binding_methods_supported: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_types_supported: Option<BTreeMap<String, ProofTypeMetadata>>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofTypeMetadata {
    #[serde(default)]
    pub proof_signing_alg_values_supported: Vec<String>,
}

/// OAuth authorization server metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<Url>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl AuthorizationServerMetadata {
    pub fn token_endpoint(&self) -> Result<&Url> {
        self.token_endpoint
            .as_ref()
            .ok_or_else(|| InputError::MissingEndpoint { endpoint: "token" }.into())
    }
}

/// Metadata of both parties of an issuance.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuerMetadata {
    pub credential_issuer: CredentialIssuerMetadata,
    pub authorization_server: AuthorizationServerMetadata,
}
