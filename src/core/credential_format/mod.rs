use core::fmt;
use std::{borrow::Cow, collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

const FORMAT_VC_SD_JWT: &str = "vc+sd-jwt";
const FORMAT_DC_SD_JWT: &str = "dc+sd-jwt";
const FORMAT_JWT_VC_JSON: &str = "jwt_vc_json";
const FORMAT_JWT_VP_JSON: &str = "jwt_vp_json";

/// A Json object of claim formats, keyed by designation.
///
/// The payloads (`alg`, `sd-jwt_alg_values`, ...) are carried through untouched.
pub type ClaimFormatMap = HashMap<ClaimFormatDesignation, Json>;

/// Registered name of a credential or presentation format.
///
/// Only the SD-JWT family and `jwt_vc_json` can be matched and presented. Other names are
/// parsed into [ClaimFormatDesignation::Other] so that queries mentioning them can still be read
/// and skipped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClaimFormatDesignation {
    /// SD-JWT VC under its earlier media type name.
    VcSdJwt,
    /// SD-JWT VC as registered by OID4VCI 1.0.
    DcSdJwt,
    /// W3C VC data model credential secured as a JWT, without JSON-LD processing.
    JwtVcJson,
    /// Presentation counterpart of [ClaimFormatDesignation::JwtVcJson].
    JwtVpJson,
    Other(String),
}

impl ClaimFormatDesignation {
    pub fn from_name(name: Cow<str>) -> Self {
        match name.as_ref() {
            FORMAT_VC_SD_JWT => Self::VcSdJwt,
            FORMAT_DC_SD_JWT => Self::DcSdJwt,
            FORMAT_JWT_VC_JSON => Self::JwtVcJson,
            FORMAT_JWT_VP_JSON => Self::JwtVpJson,
            _ => Self::Other(name.into_owned()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::VcSdJwt => FORMAT_VC_SD_JWT,
            Self::DcSdJwt => FORMAT_DC_SD_JWT,
            Self::JwtVcJson => FORMAT_JWT_VC_JSON,
            Self::JwtVpJson => FORMAT_JWT_VP_JSON,
            Self::Other(other) => other,
        }
    }

    pub fn is_sd_jwt(&self) -> bool {
        matches!(self, Self::VcSdJwt | Self::DcSdJwt)
    }

    /// Whether a query asking for `self` accepts a credential in `other`.
    ///
    /// The two SD-JWT media type names designate the same credential format.
    pub fn accepts(&self, other: &Self) -> bool {
        self == other || (self.is_sd_jwt() && other.is_sd_jwt())
    }

    /// The JWT claim naming the credential type for this format.
    ///
    /// SD-JWT credentials use `vct`; everything else uses `type`.
    pub fn type_claim_name(&self) -> &'static str {
        if self.is_sd_jwt() {
            "vct"
        } else {
            "type"
        }
    }
}

impl From<&str> for ClaimFormatDesignation {
    fn from(s: &str) -> Self {
        Self::from_name(Cow::Borrowed(s))
    }
}

impl From<String> for ClaimFormatDesignation {
    fn from(value: String) -> Self {
        Self::from_name(Cow::Owned(value))
    }
}

impl FromStr for ClaimFormatDesignation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl From<ClaimFormatDesignation> for String {
    fn from(format: ClaimFormatDesignation) -> Self {
        match format {
            ClaimFormatDesignation::Other(other) => other,
            known => known.name().to_owned(),
        }
    }
}

impl fmt::Display for ClaimFormatDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

impl Serialize for ClaimFormatDesignation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.name().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClaimFormatDesignation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Into::into)
    }
}
