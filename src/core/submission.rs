//! Turns classified disclosures into the presented token of one credential, and batches the
//! tokens of several credentials into the `vp_token` of a response.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use sha2::{Digest, Sha256};

use super::{
    credential_format::ClaimFormatDesignation,
    error::{InputError, Result},
    matching::{credential_subject, MatchResult},
    presentation_submission::{DescriptorMap, PresentationSubmission},
    query::{CredentialQuery, QueryLanguage},
    sd_jwt::{DisclosureWithOptionality, SdJwtParts},
    signer::{jwk_thumbprint_urn, sign_jwt, Signer},
    util::unix_timestamp,
};

pub const KEY_BINDING_JWT_TYPE: &str = "kb+jwt";
pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";

/// A held credential together with its match against the verifier query.
#[derive(Debug, Clone)]
pub struct SubmissionCredential {
    pub id: String,
    pub format: ClaimFormatDesignation,
    pub types: Vec<String>,
    pub raw_credential: String,
    pub credential_query: CredentialQuery,
    pub disclose_claims: Vec<DisclosureWithOptionality>,
}

impl SubmissionCredential {
    pub fn from_match(
        id: impl Into<String>,
        format: ClaimFormatDesignation,
        types: Vec<String>,
        raw_credential: impl Into<String>,
        matched: MatchResult,
    ) -> Self {
        Self {
            id: id.into(),
            format,
            types,
            raw_credential: raw_credential.into(),
            credential_query: matched.query,
            disclose_claims: matched.disclosures,
        }
    }
}

impl PartialEq for SubmissionCredential {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubmissionCredential {}

/// One claim revealed to the verifier, as recorded in sharing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedClaim {
    /// Id of the credential the claim was taken from.
    pub id: String,
    pub types: Vec<String>,
    pub name: String,
    pub value: Option<String>,
}

/// The presented token of one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSubmissionData {
    pub credential_id: String,
    pub query_id: String,
    pub format: ClaimFormatDesignation,
    pub vp_token: String,
    pub disclosed_claims: Vec<DisclosedClaim>,
    pub purpose: Option<String>,
}

impl PreparedSubmissionData {
    /// The descriptor map entry of this token.
    ///
    /// `index` is the position of the token in a `vp_token` array, `None` when it is presented
    /// on its own.
    pub fn descriptor_map(&self, index: Option<usize>) -> DescriptorMap {
        let path = match index {
            Some(i) => format!("$[{i}]"),
            None => "$".to_owned(),
        };
        match self.format {
            ClaimFormatDesignation::JwtVcJson => DescriptorMap::new(
                self.query_id.clone(),
                ClaimFormatDesignation::JwtVpJson,
                path,
            )
            .set_path_nested(DescriptorMap::new(
                self.query_id.clone(),
                ClaimFormatDesignation::JwtVcJson,
                "$.vp.verifiableCredential[0]",
            )),
            _ => DescriptorMap::new(self.query_id.clone(), self.format.clone(), path),
        }
    }
}

/// Produces the key binding JWT appended to an SD-JWT presentation.
#[async_trait]
pub trait KeyBinding: Send + Sync {
    /// `presentation` is the SD-JWT being presented, up to and including the `~` that follows
    /// the last selected disclosure.
    async fn generate_key_binding_jwt(
        &self,
        presentation: &str,
        audience: &str,
        nonce: &str,
    ) -> anyhow::Result<String>;
}

/// Wraps a `jwt_vc_json` credential into a signed VP JWT.
#[async_trait]
pub trait JwtVpJsonGenerator: Send + Sync {
    async fn generate_vp_jwt(
        &self,
        vc_jwt: &str,
        audience: &str,
        nonce: &str,
    ) -> anyhow::Result<String>;
}

/// [KeyBinding] signing with the holder binding key.
#[derive(Debug, Clone)]
pub struct SignerKeyBinding {
    signer: Arc<dyn Signer>,
}

impl SignerKeyBinding {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

/// `sd_hash` of a presentation: base64url SHA-256 over its ASCII form.
pub fn sd_hash(presentation: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(presentation.as_bytes()))
}

#[async_trait]
impl KeyBinding for SignerKeyBinding {
    async fn generate_key_binding_jwt(
        &self,
        presentation: &str,
        audience: &str,
        nonce: &str,
    ) -> anyhow::Result<String> {
        let mut header = Map::new();
        header.insert("typ".into(), KEY_BINDING_JWT_TYPE.into());
        let payload = json!({
            "aud": audience,
            "nonce": nonce,
            "iat": unix_timestamp(),
            "sd_hash": sd_hash(presentation),
        });
        sign_jwt(self.signer.as_ref(), header, &payload).await
    }
}

/// [JwtVpJsonGenerator] signing with the holder key; the holder is named by the key's JWK
/// thumbprint URN.
#[derive(Debug, Clone)]
pub struct SignerJwtVpJsonGenerator {
    signer: Arc<dyn Signer>,
}

impl SignerJwtVpJsonGenerator {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl JwtVpJsonGenerator for SignerJwtVpJsonGenerator {
    async fn generate_vp_jwt(
        &self,
        vc_jwt: &str,
        audience: &str,
        nonce: &str,
    ) -> anyhow::Result<String> {
        let holder = jwk_thumbprint_urn(self.signer.jwk())?;
        let mut header = Map::new();
        header.insert("typ".into(), "JWT".into());
        header.insert(
            "jwk".into(),
            serde_json::to_value(self.signer.jwk().to_public())
                .context("unable to serialize holder jwk")?,
        );
        let payload = json!({
            "iss": holder,
            "aud": audience,
            "nonce": nonce,
            "iat": unix_timestamp(),
            "jti": format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            "vp": {
                "@context": [CREDENTIALS_V1_CONTEXT],
                "type": [VERIFIABLE_PRESENTATION_TYPE],
                "holder": holder,
                "verifiableCredential": [vc_jwt],
            },
        });
        sign_jwt(self.signer.as_ref(), header, &payload).await
    }
}

/// Assembles presented tokens, choosing the capability by credential format.
#[derive(Clone)]
pub struct SubmissionAssembler {
    key_binding: Arc<dyn KeyBinding>,
    vp_generator: Arc<dyn JwtVpJsonGenerator>,
}

impl std::fmt::Debug for SubmissionAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionAssembler").finish_non_exhaustive()
    }
}

impl SubmissionAssembler {
    pub fn new(key_binding: Arc<dyn KeyBinding>, vp_generator: Arc<dyn JwtVpJsonGenerator>) -> Self {
        Self {
            key_binding,
            vp_generator,
        }
    }

    /// Both capabilities backed by the same holder key.
    pub fn from_signer(signer: Arc<dyn Signer>) -> Self {
        Self::new(
            Arc::new(SignerKeyBinding::new(signer.clone())),
            Arc::new(SignerJwtVpJsonGenerator::new(signer)),
        )
    }

    pub async fn prepare(
        &self,
        credential: &SubmissionCredential,
        audience: &str,
        nonce: &str,
    ) -> Result<PreparedSubmissionData> {
        let (vp_token, disclosed_claims) = match &credential.format {
            format if format.is_sd_jwt() => self.prepare_sd_jwt(credential, audience, nonce).await?,
            ClaimFormatDesignation::JwtVcJson => {
                self.prepare_jwt_vc_json(credential, audience, nonce).await?
            }
            other => {
                return Err(InputError::UnsupportedCredentialFormat {
                    format: other.to_string(),
                }
                .into())
            }
        };

        tracing::debug!(
            credential = %credential.id,
            query = credential.credential_query.id(),
            claims = disclosed_claims.len(),
            "prepared presentation"
        );

        Ok(PreparedSubmissionData {
            credential_id: credential.id.clone(),
            query_id: credential.credential_query.id().to_owned(),
            format: credential.format.clone(),
            vp_token,
            disclosed_claims,
            purpose: credential.credential_query.purpose().map(ToOwned::to_owned),
        })
    }

    async fn prepare_sd_jwt(
        &self,
        credential: &SubmissionCredential,
        audience: &str,
        nonce: &str,
    ) -> Result<(String, Vec<DisclosedClaim>)> {
        let parts = SdJwtParts::split(&credential.raw_credential).map_err(|e| {
            InputError::IllegalCredential {
                reason: e.to_string(),
            }
        })?;

        let mut presentation = format!("{}~", parts.issuer_signed_jwt);
        let mut disclosed_claims = Vec::new();
        for selected in credential.disclose_claims.iter().filter(|d| d.is_submit) {
            let disclosure = &selected.disclosure;
            let Some(digest) = &disclosure.digest else {
                return Err(InputError::IllegalDisclosure {
                    claim: disclosure.key.clone(),
                }
                .into());
            };
            presentation.push_str(digest);
            presentation.push('~');
            if let Some(name) = &disclosure.key {
                disclosed_claims.push(DisclosedClaim {
                    id: credential.id.clone(),
                    types: credential.types.clone(),
                    name: name.clone(),
                    value: disclosure.value.clone(),
                });
            }
        }

        let key_binding_jwt = self
            .key_binding
            .generate_key_binding_jwt(&presentation, audience, nonce)
            .await
            .context("key binding jwt could not be generated")?;
        presentation.push_str(&key_binding_jwt);

        Ok((presentation, disclosed_claims))
    }

    async fn prepare_jwt_vc_json(
        &self,
        credential: &SubmissionCredential,
        audience: &str,
        nonce: &str,
    ) -> Result<(String, Vec<DisclosedClaim>)> {
        let subject = credential_subject(&credential.raw_credential).map_err(|e| {
            InputError::IllegalCredential {
                reason: e.to_string(),
            }
        })?;
        let disclosed_claims = subject
            .into_iter()
            .map(|(name, value)| DisclosedClaim {
                id: credential.id.clone(),
                types: credential.types.clone(),
                name,
                value: Some(match value {
                    Json::String(s) => s,
                    other => other.to_string(),
                }),
            })
            .collect();

        let vp_token = self
            .vp_generator
            .generate_vp_jwt(&credential.raw_credential, audience, nonce)
            .await
            .context("vp jwt could not be generated")?;

        Ok((vp_token, disclosed_claims))
    }
}

/// The `vp_token` of a response, with the submission object Presentation Exchange requires.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionBatch {
    pub vp_token: Json,
    pub presentation_submission: Option<PresentationSubmission>,
}

impl SubmissionBatch {
    /// Batch prepared tokens in the shape of the query language that requested them.
    ///
    /// DCQL groups tokens by query id: `{"<query id>": ["<token>", ...]}`. Presentation
    /// Exchange sends a bare token for a single credential and an array otherwise;
    /// `definition_id` is then required.
    pub fn new(
        language: QueryLanguage,
        prepared: &[PreparedSubmissionData],
        definition_id: Option<&str>,
    ) -> Result<Self> {
        if prepared.is_empty() {
            return Err(InputError::NoCredentialsSubmitted.into());
        }
        match language {
            QueryLanguage::Dcql => {
                let mut by_query: BTreeMap<&str, Vec<String>> = BTreeMap::new();
                for data in prepared {
                    by_query
                        .entry(data.query_id.as_str())
                        .or_default()
                        .push(data.vp_token.clone());
                }
                Ok(Self {
                    vp_token: Json::Object(
                        by_query
                            .into_iter()
                            .map(|(id, tokens)| (id.to_owned(), Json::from(tokens)))
                            .collect(),
                    ),
                    presentation_submission: None,
                })
            }
            QueryLanguage::PresentationExchange => {
                let definition_id = definition_id.ok_or(InputError::MissingPresentationQuery)?;
                let (vp_token, descriptor_map) = if let [single] = prepared {
                    (Json::String(single.vp_token.clone()), vec![single.descriptor_map(None)])
                } else {
                    (
                        prepared.iter().map(|d| Json::String(d.vp_token.clone())).collect(),
                        prepared
                            .iter()
                            .enumerate()
                            .map(|(i, d)| d.descriptor_map(Some(i)))
                            .collect(),
                    )
                };
                Ok(Self {
                    vp_token,
                    presentation_submission: Some(PresentationSubmission::new(
                        uuid::Uuid::new_v4(),
                        definition_id.to_owned(),
                        descriptor_map,
                    )),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        dcql_query::DcqlQuery,
        matching::CredentialMatcher,
        query::PresentationQuery,
        sd_jwt::{tests::SD_JWT_PREFECTURE_AND_POSTAL_CODE, Disclosure},
        signer::P256Signer,
        util::decode_jwt_payload,
    };

    struct FixedKeyBinding;

    #[async_trait]
    impl KeyBinding for FixedKeyBinding {
        async fn generate_key_binding_jwt(
            &self,
            presentation: &str,
            _audience: &str,
            _nonce: &str,
        ) -> anyhow::Result<String> {
            Ok(format!("kb-for-{}", sd_hash(presentation)))
        }
    }

    struct FixedVpGenerator;

    #[async_trait]
    impl JwtVpJsonGenerator for FixedVpGenerator {
        async fn generate_vp_jwt(&self, _: &str, _: &str, _: &str) -> anyhow::Result<String> {
            Ok("vp-jwt".into())
        }
    }

    fn assembler() -> SubmissionAssembler {
        SubmissionAssembler::new(Arc::new(FixedKeyBinding), Arc::new(FixedVpGenerator))
    }

    fn matched_credential(claims: &[&str]) -> SubmissionCredential {
        let claims: Vec<Json> = claims.iter().map(|c| json!({"path": [c]})).collect();
        let query = PresentationQuery::Dcql(
            DcqlQuery::try_from(json!({"credentials": [{
                "id": "address", "format": "vc+sd-jwt", "claims": claims
            }]}))
            .unwrap(),
        );
        let matched = CredentialMatcher::new()
            .match_credential(
                &ClaimFormatDesignation::VcSdJwt,
                SD_JWT_PREFECTURE_AND_POSTAL_CODE,
                &query.credential_queries(),
            )
            .unwrap();
        SubmissionCredential::from_match(
            "cred-1",
            ClaimFormatDesignation::VcSdJwt,
            vec!["AddressCredential".into()],
            SD_JWT_PREFECTURE_AND_POSTAL_CODE,
            matched,
        )
    }

    #[tokio::test]
    async fn sd_jwt_presentation_segments() {
        let assembler = assembler();
        for (claims, submitted) in [(vec!["postal_code"], 1), (vec!["prefecture", "postal_code"], 2)] {
            let credential = matched_credential(&claims);
            let prepared = assembler
                .prepare(&credential, "https://verifier.example", "nonce")
                .await
                .unwrap();

            let segments: Vec<&str> = prepared.vp_token.split('~').collect();
            assert_eq!(segments.len(), submitted + 2);
            assert!(segments.last().unwrap().starts_with("kb-for-"));
            assert_eq!(prepared.disclosed_claims.len(), submitted);
            assert_eq!(prepared.query_id, "address");
        }
    }

    #[tokio::test]
    async fn sd_hash_covers_selected_disclosures_only() {
        let credential = matched_credential(&["postal_code"]);
        let prepared = assembler()
            .prepare(&credential, "aud", "nonce")
            .await
            .unwrap();

        let (presented, kb) = prepared.vp_token.rsplit_once('~').unwrap();
        let presented = format!("{presented}~");
        assert_eq!(kb, format!("kb-for-{}", sd_hash(&presented)));
        assert_eq!(prepared.disclosed_claims[0].name, "postal_code");
        assert_eq!(prepared.disclosed_claims[0].value.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn missing_digest_is_an_illegal_disclosure() {
        let mut credential = matched_credential(&["postal_code"]);
        credential.disclose_claims.push(DisclosureWithOptionality::required(Disclosure {
            digest: None,
            key: Some("birthdate".into()),
            value: None,
        }));

        let err = assembler()
            .prepare(&credential, "aud", "nonce")
            .await
            .unwrap_err();
        assert_eq!(
            err.input(),
            Some(&InputError::IllegalDisclosure {
                claim: Some("birthdate".into())
            })
        );
    }

    #[tokio::test]
    async fn signed_key_binding_jwt() {
        let signer: Arc<dyn Signer> = Arc::new(P256Signer::generate().unwrap());
        let assembler = SubmissionAssembler::from_signer(signer);
        let prepared = assembler
            .prepare(&matched_credential(&["postal_code"]), "https://verifier.example", "n-0S6")
            .await
            .unwrap();

        let (presented, kb) = prepared.vp_token.rsplit_once('~').unwrap();
        let payload = decode_jwt_payload(kb).unwrap();
        assert_eq!(payload["aud"], "https://verifier.example");
        assert_eq!(payload["nonce"], "n-0S6");
        assert_eq!(payload["sd_hash"], sd_hash(&format!("{presented}~")));
    }

    fn prepared(query_id: &str, format: ClaimFormatDesignation, token: &str) -> PreparedSubmissionData {
        PreparedSubmissionData {
            credential_id: format!("{query_id}-credential"),
            query_id: query_id.into(),
            format,
            vp_token: token.into(),
            disclosed_claims: vec![],
            purpose: None,
        }
    }

    #[test]
    fn dcql_batch_groups_by_query_id() {
        let batch = SubmissionBatch::new(
            QueryLanguage::Dcql,
            &[
                prepared("a", ClaimFormatDesignation::DcSdJwt, "t1"),
                prepared("b", ClaimFormatDesignation::JwtVcJson, "t2"),
                prepared("a", ClaimFormatDesignation::DcSdJwt, "t3"),
            ],
            None,
        )
        .unwrap();

        assert_eq!(batch.vp_token, json!({"a": ["t1", "t3"], "b": ["t2"]}));
        assert!(batch.presentation_submission.is_none());
    }

    #[test]
    fn presentation_exchange_batches() {
        let single = SubmissionBatch::new(
            QueryLanguage::PresentationExchange,
            &[prepared("d1", ClaimFormatDesignation::VcSdJwt, "t1")],
            Some("def"),
        )
        .unwrap();
        assert_eq!(single.vp_token, json!("t1"));
        let submission = single.presentation_submission.unwrap();
        assert_eq!(submission.definition_id(), "def");
        assert_eq!(submission.descriptor_map()[0].path, "$");

        let multiple = SubmissionBatch::new(
            QueryLanguage::PresentationExchange,
            &[
                prepared("d1", ClaimFormatDesignation::VcSdJwt, "t1"),
                prepared("d2", ClaimFormatDesignation::JwtVcJson, "t2"),
            ],
            Some("def"),
        )
        .unwrap();
        assert_eq!(multiple.vp_token, json!(["t1", "t2"]));
        let map = multiple.presentation_submission.unwrap().descriptor_map().to_vec();
        assert_eq!(map[0].path, "$[0]");
        assert_eq!(map[0].format, ClaimFormatDesignation::VcSdJwt);
        assert_eq!(map[1].path, "$[1]");
        assert_eq!(map[1].format, ClaimFormatDesignation::JwtVpJson);
        assert_eq!(
            map[1].path_nested.as_ref().unwrap().path,
            "$.vp.verifiableCredential[0]"
        );
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = SubmissionBatch::new(QueryLanguage::Dcql, &[], None).unwrap_err();
        assert_eq!(err.input(), Some(&InputError::NoCredentialsSubmitted));
    }
}
