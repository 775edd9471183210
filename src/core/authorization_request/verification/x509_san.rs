use anyhow::{bail, Context, Result};
use tracing::debug;
use url::Url;
use x509_cert::{
    der::{referenced::OwnedToRef, Decode},
    ext::pkix::{name::GeneralName, SubjectAltName},
    Certificate,
};

use super::{verifier::Verifier, SignedRequest, VerificationContext};

/// The DNS name a `x509_san_dns` client identifier stands for.
///
/// Prefixed identifiers are bare DNS names; legacy identifiers may be a URL on that host.
pub fn client_dns_name(client_id: &str) -> &str {
    match client_id.split_once("://") {
        Some((_, rest)) => rest
            .split(['/', '?', '#', ':'])
            .next()
            .unwrap_or(rest),
        None => client_id,
    }
}

/// Default implementation of request validation for `client_id_scheme` `x509_san_dns`.
///
/// The signature must verify with the key of the leaf certificate in `x5c`, the client DNS
/// name must be one of its DNS Subject Alternative Names, and the response must be delivered
/// to that host.
pub fn validate<V: Verifier>(
    context: VerificationContext<'_>,
    request: &SignedRequest<'_>,
) -> Result<()> {
    let dns_name = client_dns_name(context.client_id);
    let alg = request.alg()?;

    let leaf_cert_der = request.leaf_certificate_der()?;
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
    request.verify_with(&verifier)?;

    if !leaf_cert
        .tbs_certificate
        .filter::<SubjectAltName>()
        .filter_map(|r| match r {
            Ok((_crit, san)) => Some(san.0.into_iter()),
            Err(e) => {
                debug!("unable to parse SubjectAlternativeName from DER: {e}");
                None
            }
        })
        .flatten()
        .filter_map(|gn| match gn {
            GeneralName::DnsName(dns) => Some(dns.to_string()),
            gn => {
                debug!("found non-DNS SAN: {gn:?}");
                None
            }
        })
        .any(|dns| {
            debug!("comparing SAN '{dns}' to client_id '{dns_name}'");
            dns == dns_name
        })
    {
        bail!("client_id does not match any DNS Subject Alternative Name")
    }

    if let Some(return_uri) = context.return_uri {
        check_return_host(dns_name, return_uri)?;
    }

    Ok(())
}

pub(crate) fn check_return_host(dns_name: &str, return_uri: &Url) -> Result<()> {
    match return_uri.host_str() {
        Some(host) if host == dns_name => Ok(()),
        host => bail!(
            "response would be delivered to {}, not to {dns_name}",
            host.unwrap_or("a uri without host")
        ),
    }
}
