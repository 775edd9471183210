use anyhow::{bail, Context, Result};
use base64::prelude::*;
use sha2::{Digest, Sha256};
use tracing::debug;
use x509_cert::{
    der::{referenced::OwnedToRef, Decode},
    Certificate,
};

use super::{verifier::Verifier, SignedRequest, VerificationContext};

/// base64url SHA-256 of a DER encoded certificate.
pub fn certificate_hash(der: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(der))
}

/// Default implementation of request validation for `client_id_scheme` `x509_hash`.
///
/// This validates that:
/// 1. The JWT header contains an `x5c` array with at least one certificate
/// 2. The base64url-encoded SHA-256 hash of the leaf certificate matches the client_id
/// 3. The JWT signature is valid using the leaf certificate's public key
///
/// The hash is compared before the certificate is parsed.
pub fn validate<V: Verifier>(
    context: VerificationContext<'_>,
    request: &SignedRequest<'_>,
) -> Result<()> {
    let expected_hash = context.client_id;
    let alg = request.alg()?;

    let leaf_cert_der = request.leaf_certificate_der()?;
    let computed_hash = certificate_hash(&leaf_cert_der);

    debug!(
        expected = expected_hash,
        computed = computed_hash,
        "x509_hash verification"
    );

    if computed_hash != expected_hash {
        bail!("client_id hash '{expected_hash}' does not match certificate hash '{computed_hash}'");
    }

    let leaf_cert = Certificate::from_der(&leaf_cert_der)
        .context("leaf certificate in 'x5c' was not valid DER")?;

    let verifier = V::from_spki(
        leaf_cert
            .tbs_certificate
            .subject_public_key_info
            .owned_to_ref(),
        alg,
    )
    .context("unable to parse SPKI")?;

    request.verify_with(&verifier)
}
