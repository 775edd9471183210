use crate::{
    core::{credential_format::ClaimFormatDesignation, object::TypedParameter},
    utils::NonEmptyVec,
};
use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A Digital Credentials Query Language query.
///
/// See: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6>
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlQuery {
    credentials: NonEmptyVec<DcqlCredentialQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential_sets: Option<NonEmptyVec<DcqlCredentialSetQuery>>,
}

impl DcqlQuery {
    pub fn new(credentials: NonEmptyVec<DcqlCredentialQuery>) -> Self {
        Self {
            credentials,
            credential_sets: None,
        }
    }

    pub fn credentials(&self) -> &[DcqlCredentialQuery] {
        &self.credentials
    }

    pub fn credential_sets(&self) -> Option<&NonEmptyVec<DcqlCredentialSetQuery>> {
        self.credential_sets.as_ref()
    }

    pub fn set_credential_sets(
        &mut self,
        credential_sets: Option<NonEmptyVec<DcqlCredentialSetQuery>>,
    ) {
        self.credential_sets = credential_sets;
    }
}

impl TypedParameter for DcqlQuery {
    const KEY: &'static str = "dcql_query";
}

impl TryFrom<Json> for DcqlQuery {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        // Some verifiers send the query as a JSON encoded string.
        let value = match value {
            Json::String(s) => serde_json::from_str(&s).context("dcql_query string was not JSON")?,
            v => v,
        };
        Ok(serde_json::from_value(value)?)
    }
}

impl TryFrom<DcqlQuery> for Json {
    type Error = Error;

    fn try_from(value: DcqlQuery) -> Result<Self, Self::Error> {
        serde_json::to_value(value).context("failed to serialize dcql_query")
    }
}

/// A Credential Query object.
///
/// See: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#section-6.1>
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlCredentialQuery {
    /// Identifies the presented credential in the `vp_token` object.
    id: String,

    format: ClaimFormatDesignation,

    /// Format specific constraints, e.g. `vct_values` for SD-JWT VC.
    #[serde(default)]
    meta: Map<String, Json>,

    /// When absent, every claim of the credential is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<NonEmptyVec<DcqlCredentialClaimsQuery>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    multiple: Option<bool>,
}

impl DcqlCredentialQuery {
    pub fn new(id: String, format: ClaimFormatDesignation) -> Self {
        Self {
            id,
            format,
            meta: Map::new(),
            claims: None,
            multiple: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> &ClaimFormatDesignation {
        &self.format
    }

    pub fn meta(&self) -> &Map<String, Json> {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: Map<String, Json>) {
        self.meta = meta;
    }

    /// `meta.vct_values`, when present.
    ///
    /// Non-string entries are ignored.
    pub fn vct_values(&self) -> Option<Vec<String>> {
        let values = self.meta.get("vct_values")?.as_array()?;
        Some(
            values
                .iter()
                .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                .collect(),
        )
    }

    pub fn claims(&self) -> Option<&NonEmptyVec<DcqlCredentialClaimsQuery>> {
        self.claims.as_ref()
    }

    pub fn set_claims(&mut self, claims: Option<NonEmptyVec<DcqlCredentialClaimsQuery>>) {
        self.claims = claims;
    }

    pub fn multiple(&self) -> bool {
        self.multiple.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlCredentialSetQuery {
    options: NonEmptyVec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<bool>,
}

impl DcqlCredentialSetQuery {
    pub fn options(&self) -> &NonEmptyVec<Vec<String>> {
        &self.options
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }
}

/// A Claims Query object.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlCredentialClaimsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    path: NonEmptyVec<DcqlCredentialClaimsQueryPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<NonEmptyVec<Json>>,
}

impl DcqlCredentialClaimsQuery {
    pub fn new(path: NonEmptyVec<DcqlCredentialClaimsQueryPath>) -> Self {
        Self {
            id: None,
            path,
            values: None,
        }
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    pub fn path(&self) -> &[DcqlCredentialClaimsQueryPath] {
        &self.path
    }

    pub fn values(&self) -> Option<&NonEmptyVec<Json>> {
        self.values.as_ref()
    }

    /// The claim name this query selects: the last string segment of its path.
    ///
    /// A path selecting array elements (`["nationalities", null]`) resolves to the name of the
    /// array.
    pub fn claim_name(&self) -> Option<&str> {
        self.path.iter().rev().find_map(|segment| match segment {
            DcqlCredentialClaimsQueryPath::String(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

/// One segment of a claims path pointer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DcqlCredentialClaimsQueryPath {
    String(String),
    Integer(u64),
    Null,
}

impl From<&str> for DcqlCredentialClaimsQueryPath {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
