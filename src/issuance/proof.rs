use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};

use crate::core::{
    error::{InputError, Result},
    signer::{sign_jwt, Signer},
};

use super::metadata::CredentialConfiguration;

pub const JWT_PROOF_TYPE: &str = "jwt";
pub const PROOF_JWT_TYP: &str = "openid4vci-proof+jwt";

/// The `proofs` member of a credential request. Only `jwt` is ever populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proofs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwt: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldp_vp: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRequirement<'a> {
    /// The configuration declares no proof types.
    None,
    Jwt { signing_algs: &'a [String] },
}

impl<'a> ProofRequirement<'a> {
    pub fn of(configuration: &'a CredentialConfiguration) -> Result<Self, InputError> {
        let Some(proof_types) = configuration
            .proof_types_supported
            .as_ref()
            .filter(|types| !types.is_empty())
        else {
            return Ok(Self::None);
        };
        match proof_types.get(JWT_PROOF_TYPE) {
            Some(jwt) => Ok(Self::Jwt {
                signing_algs: &jwt.proof_signing_alg_values_supported,
            }),
            None => Err(InputError::UnsupportedProofType {
                supported: proof_types.keys().cloned().collect(),
            }),
        }
    }
}

/// Sign an `openid4vci-proof+jwt` for `audience` and `nonce`.
///
/// An empty `signing_algs` accepts any algorithm.
pub async fn jwt_proof(
    signer: &dyn Signer,
    signing_algs: &[String],
    audience: &str,
    nonce: &str,
    iat: i64,
) -> Result<String> {
    let alg = signer.alg();
    if !signing_algs.is_empty() && !signing_algs.iter().any(|supported| supported == alg) {
        return Err(InputError::UnsupportedSigningAlgorithm {
            alg: alg.to_owned(),
            supported: signing_algs.to_vec(),
        }
        .into());
    }

    let mut header = Map::new();
    header.insert("typ".into(), PROOF_JWT_TYP.into());
    header.insert(
        "jwk".into(),
        serde_json::to_value(signer.jwk().to_public()).context("unable to serialize proof jwk")?,
    );
    let payload = json!({
        "aud": audience,
        "iat": iat,
        "nonce": nonce,
    });
    Ok(sign_jwt(signer, header, &payload).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        signer::P256Signer,
        util::{decode_jwt_header, decode_jwt_payload},
    };

    fn configuration(proof_types: serde_json::Value) -> CredentialConfiguration {
        let mut configuration = json!({"format": "dc+sd-jwt"});
        if !proof_types.is_null() {
            configuration["proof_types_supported"] = proof_types;
        }
        serde_json::from_value(configuration).unwrap()
    }

    #[test]
    fn proof_requirement() {
        assert_eq!(
            ProofRequirement::of(&configuration(json!(null))).unwrap(),
            ProofRequirement::None
        );
        assert_eq!(
            ProofRequirement::of(&configuration(json!({}))).unwrap(),
            ProofRequirement::None
        );

        let config = configuration(json!({
            "jwt": {"proof_signing_alg_values_supported": ["ES256"]}
        }));
        assert_eq!(
            ProofRequirement::of(&config).unwrap(),
            ProofRequirement::Jwt {
                signing_algs: &["ES256".to_owned()]
            }
        );

        let config = configuration(json!({
            "cwt": {"proof_signing_alg_values_supported": []},
            "ldp_vp": {}
        }));
        assert_eq!(
            ProofRequirement::of(&config),
            Err(InputError::UnsupportedProofType {
                supported: vec!["cwt".into(), "ldp_vp".into()]
            })
        );
    }

    #[tokio::test]
    async fn proof_jwt_claims() {
        let signer = P256Signer::generate().unwrap();
        let proof = jwt_proof(&signer, &["ES256".into()], "https://issuer.example", "n-0S6", 1700000000)
            .await
            .unwrap();

        let header = decode_jwt_header(&proof).unwrap();
        assert_eq!(header["typ"], PROOF_JWT_TYP);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["crv"], "P-256");
        assert!(header["jwk"].get("d").is_none());

        let payload = decode_jwt_payload(&proof).unwrap();
        assert_eq!(payload["aud"], "https://issuer.example");
        assert_eq!(payload["nonce"], "n-0S6");
        assert_eq!(payload["iat"], 1700000000);
    }

    #[tokio::test]
    async fn unsupported_algorithm() {
        let signer = P256Signer::generate().unwrap();
        let err = jwt_proof(&signer, &["EdDSA".into()], "aud", "nonce", 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err.input(),
            Some(InputError::UnsupportedSigningAlgorithm { alg, .. }) if alg == "ES256"
        ));
    }
}
