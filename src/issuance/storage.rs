use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

use crate::core::{
    credential_format::ClaimFormatDesignation,
    error::{InputError, Result},
    util::decode_jwt_payload,
};

use super::metadata::CredentialIssuerMetadata;

/// An issued credential as persisted by the holder.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: String,
    pub format: ClaimFormatDesignation,
    pub credential: String,
    pub iss: String,
    pub iat: Option<i64>,
    pub exp: Option<i64>,
    /// `vct` of an SD-JWT credential, `type` otherwise.
    pub type_or_vct: String,
    pub c_nonce: Option<String>,
    pub c_nonce_expires_in: Option<u64>,
    pub access_token: String,
    pub credential_issuer_metadata: Json,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("iss", &self.iss)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("type_or_vct", &self.type_or_vct)
            .finish_non_exhaustive()
    }
}

/// What a successful credential response contributes to a record.
#[derive(Clone)]
pub struct IssuedCredential<'a> {
    pub format: &'a ClaimFormatDesignation,
    pub credential: String,
    pub access_token: &'a str,
    pub c_nonce: Option<String>,
    pub c_nonce_expires_in: Option<u64>,
    pub metadata: &'a CredentialIssuerMetadata,
}

impl CredentialRecord {
    pub fn from_issued(issued: IssuedCredential<'_>) -> Result<Self> {
        let conversion = |reason: String| InputError::CredentialConversion { reason };

        // The issuer-signed JWT of an SD-JWT precedes the first disclosure.
        let jwt = if issued.format.is_sd_jwt() {
            issued
                .credential
                .split('~')
                .next()
                .unwrap_or(issued.credential.as_str())
        } else {
            issued.credential.as_str()
        };
        let claims = decode_jwt_payload(jwt).map_err(|e| conversion(format!("{e:#}")))?;

        let iss = claims
            .get("iss")
            .and_then(Json::as_str)
            .ok_or_else(|| conversion("missing `iss` claim".into()))?
            .to_owned();
        let type_claim = issued.format.type_claim_name();
        let type_or_vct = type_of(&claims, type_claim)
            .ok_or_else(|| conversion(format!("missing `{type_claim}` claim")))?;
        let credential_issuer_metadata = serde_json::to_value(issued.metadata)
            .map_err(|e| conversion(format!("issuer metadata could not be serialized: {e}")))?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            format: issued.format.clone(),
            iat: claims.get("iat").and_then(Json::as_i64),
            exp: claims.get("exp").and_then(Json::as_i64),
            credential: issued.credential,
            iss,
            type_or_vct,
            c_nonce: issued.c_nonce,
            c_nonce_expires_in: issued.c_nonce_expires_in,
            access_token: issued.access_token.to_owned(),
            credential_issuer_metadata,
        })
    }
}

/// A VC JWT may carry its types under `vc`. Of an array of types the last, most specific, is
/// kept.
fn type_of(claims: &Map<String, Json>, name: &str) -> Option<String> {
    let value = claims
        .get(name)
        .or_else(|| claims.get("vc").and_then(|vc| vc.get(name)))?;
    match value {
        Json::String(value) => Some(value.clone()),
        Json::Array(values) => values.iter().rev().find_map(Json::as_str).map(str::to_owned),
        _ => None,
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, record: CredentialRecord) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<Vec<CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CredentialRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, record: CredentialRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?
            .push(record);
        Ok(())
    }
}
