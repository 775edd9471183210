use anyhow::{bail, Context, Result};
use josekit::{
    jwe::{JweHeader, ECDH_ES},
    jwk::Jwk,
    jwt::{encode_with_encrypter, JwtPayload},
};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use super::authorization_request::parameters::ClientMetadata;

/// Key agreement algorithm of `direct_post.jwt` responses.
pub const DEFAULT_ALG: &str = "ECDH-ES";

/// Content encryption algorithm used when the verifier states no preference.
pub const DEFAULT_ENC: &str = "A128GCM";

/// Content encryption algorithms responses can be encrypted with.
pub const SUPPORTED_ENC: [&str; 3] = ["A128GCM", "A192GCM", "A256GCM"];

/// A verifier key the response can be encrypted to.
#[derive(Debug, Clone)]
pub struct EncryptionJwkInfo {
    pub jwk: Jwk,
    pub kid: Option<String>,
}

/// Finds the encryption key of a JWKS.
///
/// Keys marked `use: enc` or `alg: ECDH-ES` are preferred, then keys without `use`. Only
/// P-256 EC keys qualify. `None` means the response cannot be encrypted.
pub fn find_encryption_jwk<'a, I>(keys: I) -> Option<EncryptionJwkInfo>
where
    I: IntoIterator<Item = &'a Map<String, Json>>,
{
    let keys: Vec<&Map<String, Json>> = keys.into_iter().filter(|key| is_p256(key)).collect();

    let preferred = keys.iter().copied().find(|key| {
        field(key, "use") == Some("enc")
            || (field(key, "alg") == Some(DEFAULT_ALG) && field(key, "use").is_none())
    });
    let selected = match preferred {
        Some(key) => key,
        None => {
            let key = keys.iter().copied().find(|key| !key.contains_key("use"))?;
            warn!("jwk has no 'use' parameter, assuming it can be used for encryption");
            key
        }
    };

    let jwk = match Jwk::from_map(selected.clone()) {
        Ok(jwk) => jwk,
        Err(e) => {
            debug!("published encryption key could not be parsed: {e}");
            return None;
        }
    };
    Some(EncryptionJwkInfo {
        kid: field(selected, "kid").map(ToOwned::to_owned),
        jwk,
    })
}

fn field<'a>(key: &'a Map<String, Json>, name: &str) -> Option<&'a str> {
    key.get(name).and_then(Json::as_str)
}

fn is_p256(key: &Map<String, Json>) -> bool {
    let (kty, crv) = (field(key, "kty"), field(key, "crv"));
    let supported = kty == Some("EC") && crv == Some("P-256");
    if !supported {
        debug!(?kty, ?crv, "skipping jwk that cannot encrypt");
    }
    supported
}

/// Encryption parameters a verifier publishes in its client metadata.
#[derive(Debug, Clone)]
pub struct ResponseEncryption {
    pub key: EncryptionJwkInfo,
    pub enc: String,
}

impl ResponseEncryption {
    /// `None` when the client metadata publishes no usable encryption key.
    pub fn from_client_metadata(client_metadata: &ClientMetadata) -> Option<Self> {
        let jwks = match client_metadata.jwks()? {
            Ok(jwks) => jwks,
            Err(e) => {
                debug!("client metadata jwks could not be parsed: {e:#}");
                return None;
            }
        };
        let key = find_encryption_jwk(&jwks.keys)?;

        let enc = select_enc(client_metadata)?;

        debug!(kid = ?key.kid, %enc, "selected response encryption key");
        Some(Self { key, enc })
    }

    /// Encrypt `claims` into a compact JWE.
    pub fn encrypt(&self, claims: Map<String, Json>) -> Result<String> {
        let mut payload = JwtPayload::new();
        for (key, value) in claims {
            payload
                .set_claim(&key, Some(value))
                .with_context(|| format!("unable to set claim '{key}'"))?;
        }

        let mut header = JweHeader::new();
        header.set_token_type("JWT");
        header.set_algorithm(DEFAULT_ALG);
        header.set_content_encryption(&self.enc);
        if let Some(kid) = &self.key.kid {
            header.set_key_id(kid);
        }

        if !SUPPORTED_ENC.contains(&self.enc.as_str()) {
            bail!("unsupported content encryption: {}", self.enc)
        }

        let encrypter = ECDH_ES
            .encrypter_from_jwk(&self.key.jwk)
            .context("unable to use the verifier key for ECDH-ES")?;
        encode_with_encrypter(&payload, &header, &encrypter).context("JWE encryption failed")
    }
}

/// The first advertised content encryption the engine supports, [DEFAULT_ENC] when none is
/// advertised. `None` when every advertised value is unsupported.
fn select_enc(client_metadata: &ClientMetadata) -> Option<String> {
    let metadata = client_metadata.0.as_map();
    let advertised: Vec<&str> = match metadata.get("encrypted_response_enc_values_supported") {
        Some(Json::Array(values)) => values.iter().filter_map(Json::as_str).collect(),
        _ => metadata
            .get("authorization_encrypted_response_enc")
            .and_then(Json::as_str)
            .into_iter()
            .collect(),
    };
    if advertised.is_empty() {
        return Some(DEFAULT_ENC.to_owned());
    }
    match advertised.iter().find(|enc| SUPPORTED_ENC.contains(*enc)) {
        Some(enc) => Some((*enc).to_owned()),
        None => {
            debug!(?advertised, "verifier advertises no supported content encryption");
            None
        }
    }
}
