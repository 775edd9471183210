use super::{credential_format::ClaimFormatDesignation, object::TypedParameter};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A DescriptorMapId is a unique identifier for a DescriptorMap.
pub type DescriptorMapId = String;

/// Presentation Submissions express how the inputs presented as proofs to a verifier are
/// provided in accordance with the requirements specified in a presentation definition.
///
/// Sent as the `presentation_submission` form field alongside a Presentation Exchange
/// `vp_token`.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationSubmission {
    id: uuid::Uuid,
    definition_id: String,
    descriptor_map: Vec<DescriptorMap>,
}

impl TypedParameter for PresentationSubmission {
    const KEY: &'static str = "presentation_submission";
}

impl PresentationSubmission {
    /// The submission id MUST be a UUID; the `definition_id` MUST be the id of the answered
    /// presentation definition.
    pub fn new(
        id: uuid::Uuid,
        definition_id: String,
        descriptor_map: Vec<DescriptorMap>,
    ) -> Self {
        Self {
            id,
            definition_id,
            descriptor_map,
        }
    }

    pub fn id(&self) -> &uuid::Uuid {
        &self.id
    }

    pub fn definition_id(&self) -> &String {
        &self.definition_id
    }

    pub fn descriptor_map(&self) -> &[DescriptorMap] {
        &self.descriptor_map
    }
}

impl TryFrom<Json> for PresentationSubmission {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        let value = match value {
            Json::String(s) => serde_json::from_str(&s)
                .context("presentation_submission string was not JSON")?,
            v => v,
        };
        serde_json::from_value(value).context("invalid presentation_submission")
    }
}

impl TryFrom<PresentationSubmission> for Json {
    type Error = Error;

    fn try_from(value: PresentationSubmission) -> Result<Self, Self::Error> {
        serde_json::to_value(value).context("failed to serialize presentation_submission")
    }
}

/// Descriptor Maps are objects used to describe the information a holder provides to a verifier
/// for one input descriptor.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-submission)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorMap {
    /// Id of the input descriptor this entry answers.
    pub id: DescriptorMapId,
    pub format: ClaimFormatDesignation,
    /// JSONPath of the presented token within the `vp_token`.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_nested: Option<Box<DescriptorMap>>,
}

impl DescriptorMap {
    pub fn new(
        id: impl Into<DescriptorMapId>,
        format: ClaimFormatDesignation,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            format,
            path: path.into(),
            path_nested: None,
        }
    }

    /// Set the nested path of the descriptor map.
    ///
    /// The format of the nested input MUST be specified and the path MUST point at the
    /// credential within the enclosing presentation.
    pub fn set_path_nested(mut self, path_nested: DescriptorMap) -> Self {
        self.path_nested = Some(Box::new(path_nested));
        self
    }
}
