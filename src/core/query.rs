//! Query-language independent view of one verifier query entry.
//!
//! DCQL credential queries map onto [CredentialQuery] directly. Presentation Exchange input
//! descriptors are translated into the same shape, so matching and submission only ever deal
//! with one model.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{
    credential_format::{ClaimFormatDesignation, ClaimFormatMap},
    dcql_query::{DcqlCredentialQuery, DcqlQuery},
    input_descriptor::InputDescriptor,
    presentation_definition::PresentationDefinition,
};

/// Claim names that carry the credential type rather than a disclosable claim.
const TYPE_CLAIMS: [&str; 2] = ["vct", "type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryLanguage {
    Dcql,
    PresentationExchange,
}

/// Claims a query entry asks for, by claim name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequirements {
    pub required: BTreeSet<String>,
    pub optional: BTreeSet<String>,
}

/// One entry of a verifier query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialQuery {
    id: String,
    language: QueryLanguage,
    /// Accepted formats. Empty when the entry does not restrict formats.
    formats: Vec<ClaimFormatDesignation>,
    type_values: Option<Vec<String>>,
    /// `None` when the entry carries no claim constraint at all.
    claims: Option<ClaimRequirements>,
    purpose: Option<String>,
}

impl CredentialQuery {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> QueryLanguage {
        self.language
    }

    pub fn formats(&self) -> &[ClaimFormatDesignation] {
        &self.formats
    }

    pub fn accepts_format(&self, format: &ClaimFormatDesignation) -> bool {
        self.formats.is_empty() || self.formats.iter().any(|f| f.accepts(format))
    }

    /// Accepted `vct`/`type` values, when the entry restricts the credential type.
    pub fn type_values(&self) -> Option<&[String]> {
        self.type_values.as_deref()
    }

    pub fn claims(&self) -> Option<&ClaimRequirements> {
        self.claims.as_ref()
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }
}

impl From<&DcqlCredentialQuery> for CredentialQuery {
    fn from(query: &DcqlCredentialQuery) -> Self {
        let claims = query.claims().map(|claims| ClaimRequirements {
            required: claims
                .iter()
                .filter_map(|claim| claim.claim_name().map(ToOwned::to_owned))
                .collect(),
            optional: BTreeSet::new(),
        });

        Self {
            id: query.id().to_owned(),
            language: QueryLanguage::Dcql,
            formats: vec![query.format().clone()],
            type_values: query.vct_values(),
            claims,
            purpose: None,
        }
    }
}

impl CredentialQuery {
    /// Translate an input descriptor.
    ///
    /// `definition_format` applies when the descriptor declares no format of its own. Fields
    /// pointing at `vct` or `type` become the type constraint. A field listed both as required
    /// and optional counts as required.
    pub fn from_input_descriptor(
        descriptor: &InputDescriptor,
        definition_format: Option<&ClaimFormatMap>,
        definition_purpose: Option<&str>,
    ) -> Self {
        let format_map = if descriptor.format().is_empty() {
            definition_format
        } else {
            Some(descriptor.format())
        };
        let formats = format_map
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();

        let mut type_values: Option<Vec<String>> = None;
        let mut requirements = ClaimRequirements::default();
        for field in descriptor.constraints().fields() {
            let Some(name) = field.claim_name() else {
                continue;
            };
            if TYPE_CLAIMS.contains(&name.as_str()) {
                if let Some(values) = field.accepted_values() {
                    type_values.get_or_insert_with(Vec::new).extend(values);
                }
                continue;
            }
            if field.is_optional() {
                requirements.optional.insert(name);
            } else {
                requirements.required.insert(name);
            }
        }
        let required = requirements.required.clone();
        requirements.optional.retain(|name| !required.contains(name));

        let claims = if descriptor.constraints().fields().is_empty() {
            None
        } else {
            Some(requirements)
        };

        Self {
            id: descriptor.id().to_owned(),
            language: QueryLanguage::PresentationExchange,
            formats,
            type_values,
            claims,
            purpose: descriptor
                .purpose()
                .map(String::as_str)
                .or(definition_purpose)
                .map(ToOwned::to_owned),
        }
    }
}

/// The query attached to an authorization request.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationQuery {
    Dcql(DcqlQuery),
    PresentationExchange(PresentationDefinition),
}

impl PresentationQuery {
    pub fn language(&self) -> QueryLanguage {
        match self {
            Self::Dcql(_) => QueryLanguage::Dcql,
            Self::PresentationExchange(_) => QueryLanguage::PresentationExchange,
        }
    }

    /// Entries in declaration order.
    pub fn credential_queries(&self) -> Vec<CredentialQuery> {
        match self {
            Self::Dcql(query) => query.credentials().iter().map(Into::into).collect(),
            Self::PresentationExchange(definition) => definition
                .input_descriptors()
                .iter()
                .map(|descriptor| {
                    CredentialQuery::from_input_descriptor(
                        descriptor,
                        definition.format(),
                        definition.purpose().map(String::as_str),
                    )
                })
                .collect(),
        }
    }

    pub fn presentation_definition(&self) -> Option<&PresentationDefinition> {
        match self {
            Self::PresentationExchange(definition) => Some(definition),
            Self::Dcql(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dcql_claims_are_all_required() {
        let query: DcqlCredentialQuery = serde_json::from_value(json!({
            "id": "q1",
            "format": "vc+sd-jwt",
            "meta": {"vct_values": ["Student"]},
            "claims": [{"path": ["claim1"]}, {"path": ["address", "claim2"]}]
        }))
        .unwrap();

        let canonical = CredentialQuery::from(&query);
        let claims = canonical.claims().unwrap();

        assert_eq!(canonical.language(), QueryLanguage::Dcql);
        assert_eq!(canonical.type_values(), Some(&["Student".to_owned()][..]));
        assert!(canonical.accepts_format(&ClaimFormatDesignation::DcSdJwt));
        assert!(!canonical.accepts_format(&ClaimFormatDesignation::JwtVcJson));
        assert_eq!(
            claims.required,
            ["claim1", "claim2"].map(String::from).into_iter().collect()
        );
        assert!(claims.optional.is_empty());
    }

    #[test]
    fn input_descriptor_translation() {
        let definition = PresentationDefinition::try_from(json!({
            "id": "def",
            "purpose": "why",
            "format": {"vc+sd-jwt": {}},
            "input_descriptors": [{
                "id": "d1",
                "constraints": {"fields": [
                    {"path": ["$.vct"], "filter": {"type": "string", "const": "AddressCredential"}},
                    {"path": ["$.claim1"]},
                    {"path": ["$.claim2"], "optional": true},
                    {"path": ["$.claim1"], "optional": true}
                ]}
            }, {
                "id": "d2",
                "purpose": "own purpose",
                "format": {"jwt_vc_json": {}}
            }]
        }))
        .unwrap();

        let queries = PresentationQuery::PresentationExchange(definition).credential_queries();
        let first = &queries[0];
        let claims = first.claims().unwrap();

        assert_eq!(first.id(), "d1");
        assert_eq!(first.purpose(), Some("why"));
        assert_eq!(first.type_values(), Some(&["AddressCredential".to_owned()][..]));
        assert!(first.accepts_format(&ClaimFormatDesignation::VcSdJwt));
        assert_eq!(claims.required, BTreeSet::from(["claim1".to_owned()]));
        assert_eq!(claims.optional, BTreeSet::from(["claim2".to_owned()]));

        let second = &queries[1];
        assert_eq!(second.purpose(), Some("own purpose"));
        assert!(second.claims().is_none());
        assert!(second.accepts_format(&ClaimFormatDesignation::JwtVcJson));
        assert!(!second.accepts_format(&ClaimFormatDesignation::VcSdJwt));
    }
}
