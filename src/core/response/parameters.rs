pub use crate::core::authorization_request::parameters::State;
pub use crate::core::presentation_submission::PresentationSubmission;
use crate::core::object::TypedParameter;

use anyhow::Error;
use serde_json::Value as Json;

/// The self-issued `id_token` of a SIOP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdToken(pub String);

impl TypedParameter for IdToken {
    const KEY: &'static str = "id_token";
}

impl TryFrom<Json> for IdToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        serde_json::from_value(value).map(Self).map_err(Into::into)
    }
}

impl From<IdToken> for Json {
    fn from(value: IdToken) -> Self {
        value.0.into()
    }
}

/// `vp_token` response parameter.
///
/// A bare string when a single Presentation Exchange credential is presented, an array of
/// strings for several, and an object keyed by credential query id for DCQL.
#[derive(Debug, Clone, PartialEq)]
pub struct VpToken(pub Json);

impl VpToken {
    /// Form encoding: a bare token is sent unquoted, anything else as JSON text.
    pub fn form_value(&self) -> String {
        match &self.0 {
            Json::String(token) => token.clone(),
            other => other.to_string(),
        }
    }
}

impl TypedParameter for VpToken {
    const KEY: &'static str = "vp_token";
}

impl TryFrom<Json> for VpToken {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        match value {
            Json::String(_) | Json::Array(_) | Json::Object(_) => Ok(Self(value)),
            _ => Err(Error::msg("Invalid vp_token")),
        }
    }
}

impl From<VpToken> for Json {
    fn from(value: VpToken) -> Self {
        value.0
    }
}
