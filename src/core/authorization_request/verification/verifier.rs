use anyhow::{bail, Context, Error, Result};
use p256::ecdsa::signature::Verifier as _;
use serde_json::{Map, Value as Json};
use x509_cert::spki::SubjectPublicKeyInfoRef;

pub trait Verifier: Sized {
    /// Construct a [Verifier] from [SubjectPublicKeyInfoRef].
    ///
    /// ## Params
    /// * `spki` - the public key information necessary to construct a [Verifier].
    /// * `algorithm` - the value taken from the `alg` header of the request, to hint at what curve should be used by the [Verifier].
    fn from_spki(spki: SubjectPublicKeyInfoRef<'_>, algorithm: &str) -> Result<Self>;

    /// Construct a [Verifier] from a public JWK published in client metadata.
    fn from_jwk(jwk: &Map<String, Json>, algorithm: &str) -> Result<Self>;

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct P256Verifier(p256::ecdsa::VerifyingKey);

fn require_es256(algorithm: &str) -> Result<()> {
    if algorithm != "ES256" {
        bail!("P256Verifier cannot verify requests signed with '{algorithm}'")
    }
    Ok(())
}

impl Verifier for P256Verifier {
    fn from_spki(spki: SubjectPublicKeyInfoRef<'_>, algorithm: &str) -> Result<Self> {
        require_es256(algorithm)?;
        spki.try_into().map(Self).map_err(Error::from)
    }

    fn from_jwk(jwk: &Map<String, Json>, algorithm: &str) -> Result<Self> {
        require_es256(algorithm)?;
        let jwk = serde_json::to_string(jwk).context("unable to serialize jwk")?;
        let key = p256::PublicKey::from_jwk_str(&jwk).context("jwk is not a P-256 public key")?;
        Ok(Self(key.into()))
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<()> {
        let signature = p256::ecdsa::Signature::from_slice(signature)?;
        self.0.verify(payload, &signature).map_err(Error::from)
    }
}
