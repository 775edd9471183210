//! Credential offers, received as `openid-credential-offer://?credential_offer=...` or as the bare
//! JSON object.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::error::{InputError, Result};

pub const PRE_AUTHORIZED_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

const CREDENTIAL_OFFER: &str = "credential_offer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOffer {
    pub credential_issuer: Url,
    pub credential_configuration_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grants>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<AuthorizationCodeGrant>,
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<Url>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub pre_authorized_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<TxCode>,
    /// Seconds to wait between token requests.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<Url>,
}

// The code is a bearer secret.
impl std::fmt::Debug for PreAuthorizedCodeGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreAuthorizedCodeGrant")
            .field("pre_authorized_code", &"<redacted>")
            .field("tx_code", &self.tx_code)
            .field("interval", &self.interval)
            .field("authorization_server", &self.authorization_server)
            .finish()
    }
}

fn default_interval() -> u64 {
    5
}

/// Describes the transaction code the holder has to enter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxCode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CredentialOffer {
    /// Parse an offer URI. Any scheme is accepted.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| InputError::InvalidCredentialOffer {
            reason: e.to_string(),
        })?;
        if url.query().map_or(true, str::is_empty) {
            return Err(InputError::CredentialOfferQueryItemsNotFound.into());
        }
        let (_, offer) = url
            .query_pairs()
            .find(|(name, _)| name == CREDENTIAL_OFFER)
            .ok_or(InputError::CredentialOfferParameterNotFound)?;
        Self::from_json(&offer)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let offer: Self =
            serde_json::from_str(json).map_err(|e| InputError::InvalidCredentialOffer {
                reason: e.to_string(),
            })?;
        if offer.credential_configuration_ids.is_empty() {
            return Err(InputError::CredentialOfferConfigurationIsEmpty.into());
        }
        Ok(offer)
    }

    /// Accepts either an offer URI or the offer JSON itself.
    pub fn parse(offer: &str) -> Result<Self> {
        let offer = offer.trim();
        if offer.starts_with('{') {
            Self::from_json(offer)
        } else {
            Self::from_uri(offer)
        }
    }

    pub fn pre_authorized_code_grant(&self) -> Option<&PreAuthorizedCodeGrant> {
        self.grants.as_ref()?.pre_authorized_code.as_ref()
    }

    pub fn is_tx_code_required(&self) -> bool {
        self.pre_authorized_code_grant()
            .is_some_and(|grant| grant.tx_code.is_some())
    }
}
