//! Holder key capabilities: signing, and a key store that creates keys on first use.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use p256::ecdsa::{signature::Signer as _, Signature, SigningKey};
use serde_json::{Map, Value as Json};
use ssi::jwk::JWK;

/// Prefix of a `sub` derived from the holder's key.
pub const JWK_THUMBPRINT_URN_PREFIX: &str = "urn:ietf:params:oauth:jwk-thumbprint:sha-256:";

#[async_trait]
pub trait Signer: Send + Sync + std::fmt::Debug {
    /// The algorithm that will be used to sign.
    fn alg(&self) -> &str;
    /// The public JWK of the signer.
    fn jwk(&self) -> &JWK;
    /// Sign `payload`, returning a JWS signature (`r || s` for ECDSA).
    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug)]
pub struct P256Signer {
    key: SigningKey,
    jwk: JWK,
}

impl P256Signer {
    pub fn new(key: SigningKey) -> Result<Self> {
        let pk: p256::PublicKey = key.verifying_key().into();
        let jwk = serde_json::from_str(&pk.to_jwk_string())?;
        Ok(Self { key, jwk })
    }

    pub fn generate() -> Result<Self> {
        Self::new(SigningKey::random(&mut rand::rngs::OsRng))
    }
}

#[async_trait]
impl Signer for P256Signer {
    fn alg(&self) -> &str {
        "ES256"
    }

    fn jwk(&self) -> &JWK {
        &self.jwk
    }

    async fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let sig: Signature = self.key.sign(payload);
        Ok(sig.to_vec())
    }
}

/// Sign a compact JWS over `header` and `payload`.
///
/// `alg` is always taken from the signer and overrides any value in `header`.
pub async fn sign_jwt(
    signer: &dyn Signer,
    mut header: Map<String, Json>,
    payload: &Json,
) -> Result<String> {
    header.insert("alg".into(), signer.alg().into());
    let header = BASE64_URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&header).context("unable to serialize jwt header")?);
    let payload = BASE64_URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(payload).context("unable to serialize jwt payload")?);
    let signing_input = format!("{header}.{payload}");
    let signature = signer
        .sign(signing_input.as_bytes())
        .await
        .context("signer failed")?;
    Ok(format!(
        "{signing_input}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// `urn:ietf:params:oauth:jwk-thumbprint:sha-256:<thumbprint>` of `jwk`.
pub fn jwk_thumbprint_urn(jwk: &JWK) -> Result<String> {
    let thumbprint = jwk
        .to_public()
        .thumbprint()
        .context("unable to compute jwk thumbprint")?;
    Ok(format!("{JWK_THUMBPRINT_URN_PREFIX}{thumbprint}"))
}

/// Holder keys, addressed by alias.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Return the key stored under `alias`, creating it first when absent.
    ///
    /// Implementations must make the check and the creation one atomic step: two concurrent
    /// callers with the same alias receive the same key.
    async fn get_or_create(&self, alias: &str) -> Result<Arc<dyn Signer>>;

    async fn get(&self, alias: &str) -> Result<Option<Arc<dyn Signer>>>;
}

/// Keys held in process memory. Lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, Arc<dyn Signer>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `signer` under `alias`, replacing any existing key.
    pub fn insert(&self, alias: impl Into<String>, signer: Arc<dyn Signer>) -> Result<()> {
        self.keys
            .lock()
            .map_err(|_| anyhow!("key store lock poisoned"))?
            .insert(alias.into(), signer);
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_or_create(&self, alias: &str) -> Result<Arc<dyn Signer>> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| anyhow!("key store lock poisoned"))?;
        if let Some(signer) = keys.get(alias) {
            return Ok(signer.clone());
        }
        let signer: Arc<dyn Signer> = Arc::new(P256Signer::generate()?);
        keys.insert(alias.to_owned(), signer.clone());
        tracing::debug!(alias, "created holder key");
        Ok(signer)
    }

    async fn get(&self, alias: &str) -> Result<Option<Arc<dyn Signer>>> {
        Ok(self
            .keys
            .lock()
            .map_err(|_| anyhow!("key store lock poisoned"))?
            .get(alias)
            .cloned())
    }
}
