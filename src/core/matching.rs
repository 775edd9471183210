//! Decides whether a held credential satisfies an entry of a verifier query, and how each of its
//! claims may be disclosed.

use std::collections::BTreeSet;

use serde_json::{Map, Value as Json};

use super::{
    credential_format::ClaimFormatDesignation,
    query::CredentialQuery,
    sd_jwt::{Disclosure, DisclosureDecoder, DisclosureWithOptionality, SdJwtDisclosureDecoder, SdJwtParts},
    util::decode_jwt_payload,
};

/// The first query entry a credential satisfies, with its classified disclosures.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub query: CredentialQuery,
    pub disclosures: Vec<DisclosureWithOptionality>,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialMatcher<D = SdJwtDisclosureDecoder> {
    decoder: D,
}

impl CredentialMatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: DisclosureDecoder> CredentialMatcher<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self { decoder }
    }

    /// Match one credential against the query entries, in order.
    ///
    /// `None` means no entry is satisfied. Credentials that cannot be read are reported the same
    /// way.
    pub fn match_credential(
        &self,
        format: &ClaimFormatDesignation,
        raw_credential: &str,
        queries: &[CredentialQuery],
    ) -> Option<MatchResult> {
        match format {
            f if f.is_sd_jwt() => self.match_sd_jwt(format, raw_credential, queries),
            ClaimFormatDesignation::JwtVcJson => match_jwt_vc_json(raw_credential, queries),
            other => {
                tracing::debug!(format = %other, "credential format cannot be presented");
                None
            }
        }
    }

    fn match_sd_jwt(
        &self,
        format: &ClaimFormatDesignation,
        raw_credential: &str,
        queries: &[CredentialQuery],
    ) -> Option<MatchResult> {
        let parts = SdJwtParts::split(raw_credential)
            .inspect_err(|e| tracing::warn!(error = %e, "held SD-JWT could not be split"))
            .ok()?;
        let disclosures = self.decoder.decode(&parts.disclosures);
        let available: BTreeSet<&str> = disclosures
            .iter()
            .filter_map(|d| d.key.as_deref())
            .collect();

        // Decoded on demand: most queries carry no type constraint.
        let mut type_claim: Option<Option<Json>> = None;

        for query in queries {
            if !query.accepts_format(format) {
                continue;
            }

            if let Some(accepted) = query.type_values() {
                let claim = type_claim.get_or_insert_with(|| {
                    parts
                        .issuer_payload()
                        .ok()
                        .and_then(|mut payload| payload.remove(format.type_claim_name()))
                });
                if !type_matches(claim.as_ref(), accepted) {
                    tracing::debug!(query = query.id(), "credential type not accepted");
                    continue;
                }
            }

            let Some(claims) = query.claims() else {
                return Some(MatchResult {
                    query: query.clone(),
                    disclosures: disclosures
                        .iter()
                        .cloned()
                        .map(DisclosureWithOptionality::required)
                        .collect(),
                });
            };

            if !claims
                .required
                .iter()
                .all(|name| available.contains(name.as_str()))
            {
                continue;
            }

            let disclosures = disclosures
                .iter()
                .cloned()
                .map(|disclosure| classify(disclosure, &claims.required, &claims.optional))
                .collect();
            tracing::debug!(query = query.id(), "credential matched");
            return Some(MatchResult {
                query: query.clone(),
                disclosures,
            });
        }

        None
    }
}

fn classify(
    disclosure: Disclosure,
    required: &BTreeSet<String>,
    optional: &BTreeSet<String>,
) -> DisclosureWithOptionality {
    match disclosure.key.as_deref() {
        Some(key) if required.contains(key) => DisclosureWithOptionality::required(disclosure),
        Some(key) if optional.contains(key) => DisclosureWithOptionality::optional(disclosure),
        _ => DisclosureWithOptionality::undisclosed(disclosure),
    }
}

/// `type` may be a single string or an array, any element of which may be accepted.
fn type_matches(claim: Option<&Json>, accepted: &[String]) -> bool {
    match claim {
        Some(Json::String(value)) => accepted.contains(value),
        Some(Json::Array(values)) => values
            .iter()
            .filter_map(Json::as_str)
            .any(|value| accepted.iter().any(|a| a == value)),
        _ => false,
    }
}

fn match_jwt_vc_json(raw_credential: &str, queries: &[CredentialQuery]) -> Option<MatchResult> {
    let query = queries
        .iter()
        .find(|q| q.accepts_format(&ClaimFormatDesignation::JwtVcJson))?;
    let subject = credential_subject(raw_credential)
        .inspect_err(|e| tracing::warn!(error = %e, "held jwt_vc_json could not be decoded"))
        .ok()?;

    let disclosures = subject
        .into_iter()
        .map(|(key, value)| {
            DisclosureWithOptionality::required(Disclosure {
                digest: None,
                key: Some(key),
                value: Some(match value {
                    Json::String(s) => s,
                    other => other.to_string(),
                }),
            })
        })
        .collect();

    Some(MatchResult {
        query: query.clone(),
        disclosures,
    })
}

/// `vc.credentialSubject` of a JWT VC, or a top level `credentialSubject` when the VC claims
/// are not nested.
pub(crate) fn credential_subject(jwt: &str) -> anyhow::Result<Map<String, Json>> {
    let mut payload = decode_jwt_payload(jwt)?;
    let subject = match payload.remove("vc") {
        Some(Json::Object(mut vc)) => vc.remove("credentialSubject"),
        _ => payload.remove("credentialSubject"),
    };
    match subject {
        Some(Json::Object(subject)) => Ok(subject),
        _ => anyhow::bail!("credential has no credentialSubject object"),
    }
}
