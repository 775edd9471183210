//! Wallet-side engine for [OID4VCI 1.0] and [OID4VP 1.0] with [SIOPv2].
//!
//! [OID4VCI 1.0]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//! [OID4VP 1.0]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//! [SIOPv2]: <https://openid.net/specs/openid-connect-self-issued-v2-1_0.html>
//!
//! # Issuance
//!
//! An [`Issuance`] redeems the pre-authorized code of a [`CredentialOffer`], proves possession of
//! the holder's binding key when the issuer asks for it, and stores the issued credential:
//!
//! ```ignore
//! use oid4wallet::issuance::{offer::CredentialOffer, Issuance};
//!
//! let offer = CredentialOffer::parse(scanned_qr_code)?;
//! // Issuer and authorization server metadata are retrieved by the caller.
//! let metadata = fetch_metadata(&offer).await?;
//!
//! let issuance = Issuance::new(http_client, key_store, credential_store, offer, metadata);
//! let record = issuance.issue("IdentityCredential", Some(tx_code)).await?;
//! ```
//!
//! The flow is single-shot: [`Issuance::issue`] consumes it, and a failed flow is started again
//! from the offer.
//!
//! [`Issuance`]: crate::issuance::Issuance
//! [`Issuance::issue`]: crate::issuance::Issuance::issue
//! [`CredentialOffer`]: crate::issuance::offer::CredentialOffer
//!
//! # Presentation
//!
//! An [`OpenIdProvider`] resolves and authenticates the verifier's request, matches the holder's
//! credentials against its DCQL query or presentation definition, and delivers the response:
//!
//! ```ignore
//! use oid4wallet::wallet::OpenIdProvider;
//!
//! let provider = OpenIdProvider::new(ReqwestClient::new()?, key_store);
//! let request = provider.process_request(&request_url).await?;
//!
//! // Matched claims flagged `is_user_selectable` may be toggled by the holder here.
//! let mut credentials = provider.match_credentials(&request, &held_credentials);
//!
//! let result = provider.respond(&request, &credentials).await?;
//! if let Some(location) = result.post_result.location {
//!     open_in_browser(location);
//! }
//! ```
//!
//! Requests whose client id uses the `x509_san_dns` or `x509_hash` prefix must be signed with the
//! certificate in `x5c`. Other signed requests are verified against the keys of the verifier's
//! client metadata through a [`RequestVerification`].
//!
//! [`OpenIdProvider`]: crate::wallet::OpenIdProvider
//! [`RequestVerification`]: crate::core::authorization_request::verification::RequestVerification
//!
//! # Credential Formats
//!
//! - **SD-JWT VC** (`dc+sd-jwt`, and `vc+sd-jwt`): presented with the submitted disclosures and a
//!   key binding JWT.
//! - **JWT VC** (`jwt_vc_json`): presented wrapped in a VP JWT.
//!
//! Format identifiers are defined in the [`core::credential_format`] module.
//!
//! [`core::credential_format`]: crate::core::credential_format

pub mod config;
pub mod core;
pub mod issuance;
pub mod utils;
pub mod wallet;
