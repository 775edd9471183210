use anyhow::{Context, Result};
use serde_json::{Map, Value as Json};

use super::{verifier::Verifier, SignedRequest, VerificationContext};

/// Default validation for schemes whose keys are published in the client metadata `jwks`.
///
/// The key is selected by the `kid` header when present, else the first signing key.
pub fn validate<V: Verifier>(
    context: VerificationContext<'_>,
    request: &SignedRequest<'_>,
) -> Result<()> {
    let alg = request.alg()?;
    let jwks = context
        .client_metadata
        .context("request object is signed but no client metadata was published")?
        .jwks()
        .context("client metadata publishes no jwks")??;

    let jwk = select_key(&jwks.keys, request.kid())
        .context("no key in client metadata jwks can verify the request object")?;
    let verifier = V::from_jwk(jwk, alg)?;
    request.verify_with(&verifier)
}

fn select_key<'a>(
    keys: &'a [Map<String, Json>],
    kid: Option<&str>,
) -> Option<&'a Map<String, Json>> {
    fn by<'s>(name: &'s str, value: &'s str) -> impl Fn(&&Map<String, Json>) -> bool + 's {
        move |key: &&Map<String, Json>| key.get(name).and_then(Json::as_str) == Some(value)
    }
    match kid {
        Some(kid) => keys.iter().find(by("kid", kid)),
        None => keys
            .iter()
            .find(|key| key.get("use").and_then(Json::as_str) != Some("enc")),
    }
}
