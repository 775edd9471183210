use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use ssi::jwk::JWK;

use super::parameters::IdToken;
use crate::core::signer::{jwk_thumbprint_urn, sign_jwt, Signer};

/// Claims of a self-issued ID token.
///
/// `sub` is the JWK thumbprint URN of the pairwise key, so the same key always yields the same
/// subject. `iss` equals `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub nonce: String,
    pub sub_jwk: JWK,
}

impl IdTokenClaims {
    pub fn new(sub_jwk: &JWK, audience: &str, nonce: &str, iat: i64, ttl: i64) -> Result<Self> {
        let sub = jwk_thumbprint_urn(sub_jwk)?;
        Ok(Self {
            iss: sub.clone(),
            sub,
            aud: audience.to_owned(),
            iat,
            exp: iat + ttl,
            nonce: nonce.to_owned(),
            sub_jwk: sub_jwk.to_public(),
        })
    }

    pub async fn sign(&self, signer: &dyn Signer) -> Result<IdToken> {
        let payload = serde_json::to_value(self).context("unable to serialize id_token claims")?;
        let mut header = Map::new();
        header.insert("typ".into(), Json::String("JWT".into()));
        sign_jwt(signer, header, &payload).await.map(IdToken)
    }
}
