//! OID4VCI pre-authorized code flow.
//!
//! An [Issuance] runs `token → nonce → proof → credential → store` exactly once. Any failing step
//! ends the flow and nothing is stored; a new flow has to be started from the offer.

use std::{fmt, sync::Arc};

use tracing::info;

use crate::{
    config::IssuanceOptions,
    core::{
        error::{InputError, ProtocolStateError, Result},
        signer::KeyStore,
        util::{unix_timestamp, AsyncHttpClient},
    },
};

use self::{
    client::CredentialRequest,
    metadata::IssuerMetadata,
    offer::CredentialOffer,
    proof::{jwt_proof, ProofRequirement, Proofs},
    storage::{CredentialRecord, CredentialStore, IssuedCredential},
};

pub mod client;
pub mod metadata;
pub mod offer;
pub mod proof;
pub mod storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    OfferResolved,
    TokenIssued,
    NonceFetched,
    ProofGenerated,
    NoProofRequired,
    CredentialRequested,
    Stored,
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::OfferResolved => "offer_resolved",
            Self::TokenIssued => "token_issued",
            Self::NonceFetched => "nonce_fetched",
            Self::ProofGenerated => "proof_generated",
            Self::NoProofRequired => "no_proof_required",
            Self::CredentialRequested => "credential_requested",
            Self::Stored => "stored",
        };
        f.write_str(state)
    }
}

pub struct Issuance<H> {
    http_client: H,
    key_store: Arc<dyn KeyStore>,
    credential_store: Arc<dyn CredentialStore>,
    offer: CredentialOffer,
    metadata: IssuerMetadata,
    options: IssuanceOptions,
}

impl<H: fmt::Debug> fmt::Debug for Issuance<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuance")
            .field("http_client", &self.http_client)
            .field("offer", &self.offer)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<H: AsyncHttpClient> Issuance<H> {
    /// Start a flow for `offer`. The metadata has to be retrieved by the caller.
    pub fn new(
        http_client: H,
        key_store: Arc<dyn KeyStore>,
        credential_store: Arc<dyn CredentialStore>,
        offer: CredentialOffer,
        metadata: IssuerMetadata,
    ) -> Self {
        info!(
            state = %IssuanceState::OfferResolved,
            credential_issuer = %offer.credential_issuer,
            "issuance started"
        );
        Self {
            http_client,
            key_store,
            credential_store,
            offer,
            metadata,
            options: IssuanceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IssuanceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn offer(&self) -> &CredentialOffer {
        &self.offer
    }

    pub fn metadata(&self) -> &IssuerMetadata {
        &self.metadata
    }

    /// Obtain and store the credential of `configuration_id`.
    ///
    /// Everything that can be checked locally is checked before the pre-authorized code is
    /// redeemed.
    pub async fn issue(
        self,
        configuration_id: &str,
        tx_code: Option<&str>,
    ) -> Result<CredentialRecord> {
        let issuer = &self.metadata.credential_issuer;

        if !self
            .offer
            .credential_configuration_ids
            .iter()
            .any(|id| id == configuration_id)
        {
            return Err(InputError::UnknownCredentialConfiguration {
                id: configuration_id.to_owned(),
            }
            .into());
        }
        let grant = self
            .offer
            .pre_authorized_code_grant()
            .ok_or(InputError::PreAuthorizedCodeGrantNotFound)?;
        let configuration = issuer.configuration(configuration_id)?;
        let proof_requirement = ProofRequirement::of(configuration)?;
        let token_endpoint = self.metadata.authorization_server.token_endpoint()?;
        let nonce_endpoint = issuer.nonce_endpoint()?;
        let credential_endpoint = issuer.credential_endpoint()?;

        if self.offer.is_tx_code_required() && tx_code.is_none() {
            return Err(InputError::TransactionCodeRequired.into());
        }

        let token = client::request_token(
            &self.http_client,
            token_endpoint,
            &grant.pre_authorized_code,
            tx_code,
        )
        .await?;
        info!(state = %IssuanceState::TokenIssued, "pre-authorized code redeemed");

        let nonce = client::request_nonce(&self.http_client, nonce_endpoint).await?;
        info!(state = %IssuanceState::NonceFetched, "c_nonce received");

        let proofs = match proof_requirement {
            ProofRequirement::None => {
                info!(state = %IssuanceState::NoProofRequired, "issuer accepts no proofs");
                None
            }
            ProofRequirement::Jwt { signing_algs } => {
                let signer = self
                    .key_store
                    .get_or_create(&self.options.binding_key_alias)
                    .await
                    .map_err(|_| ProtocolStateError::KeyPair {
                        alias: self.options.binding_key_alias.clone(),
                    })?;
                let proof = jwt_proof(
                    signer.as_ref(),
                    signing_algs,
                    &issuer.credential_issuer,
                    &nonce.c_nonce,
                    unix_timestamp(),
                )
                .await?;
                info!(state = %IssuanceState::ProofGenerated, alg = signer.alg(), "jwt proof signed");
                Some(Proofs {
                    jwt: Some(vec![proof]),
                    ..Default::default()
                })
            }
        };

        let request = CredentialRequest {
            credential_configuration_id: configuration_id.to_owned(),
            proofs,
        };
        let response = client::request_credential(
            &self.http_client,
            credential_endpoint,
            &token.access_token,
            &request,
        )
        .await?;
        info!(state = %IssuanceState::CredentialRequested, configuration_id, "credential response received");

        let c_nonce = response.c_nonce.clone().or(token.c_nonce.clone());
        let c_nonce_expires_in = response.c_nonce_expires_in.or(token.c_nonce_expires_in);
        let credential = response.into_credential()?;

        let record = CredentialRecord::from_issued(IssuedCredential {
            format: &configuration.format,
            credential,
            access_token: &token.access_token,
            c_nonce,
            c_nonce_expires_in,
            metadata: issuer,
        })?;
        self.credential_store.save(record.clone()).await?;
        info!(state = %IssuanceState::Stored, id = %record.id, format = %record.format, "credential stored");

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        error::RemoteError,
        signer::{MemoryKeyStore, Signer},
        util::{
            decode_jwt_header, decode_jwt_payload,
            tests::{json_response, MockHttpClient},
        },
    };
    use base64::prelude::*;
    use http::Method;
    use serde_json::{json, Value as Json};

    use super::storage::MemoryCredentialStore;

    fn offer() -> CredentialOffer {
        CredentialOffer::from_json(
            &json!({
                "credential_issuer": "https://issuer.example",
                "credential_configuration_ids": ["IdentityCredential"],
                "grants": {
                    "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                        "pre-authorized_code": "code"
                    }
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    fn metadata(proof_types: Json) -> IssuerMetadata {
        IssuerMetadata {
            credential_issuer: serde_json::from_value(json!({
                "credential_issuer": "https://issuer.example",
                "credential_endpoint": "https://issuer.example/credential",
                "nonce_endpoint": "https://issuer.example/nonce",
                "credential_configurations_supported": {
                    "IdentityCredential": {
                        "format": "dc+sd-jwt",
                        "vct": "Identity",
                        "proof_types_supported": proof_types
                    }
                }
            }))
            .unwrap(),
            authorization_server: serde_json::from_value(json!({
                "token_endpoint": "https://issuer.example/token"
            }))
            .unwrap(),
        }
    }

    fn sd_jwt() -> String {
        let payload = json!({"iss": "https://issuer.example", "iat": 1, "vct": "Identity"});
        format!(
            "eyJhbGciOiJFUzI1NiJ9.{}.c2ln~",
            BASE64_URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    struct Fixture {
        http_client: Arc<MockHttpClient>,
        store: Arc<MemoryCredentialStore>,
        key_store: Arc<MemoryKeyStore>,
    }

    impl Fixture {
        fn new(credential_response: Json) -> Self {
            Self {
                http_client: Arc::new(MockHttpClient::new([
                    json_response(200, json!({"access_token": "at", "token_type": "bearer"})),
                    json_response(200, json!({"c_nonce": "c-nonce"})),
                    json_response(200, credential_response),
                ])),
                store: Arc::new(MemoryCredentialStore::new()),
                key_store: Arc::new(MemoryKeyStore::new()),
            }
        }

        fn issuance(&self, proof_types: Json) -> Issuance<Arc<MockHttpClient>> {
            Issuance::new(
                self.http_client.clone(),
                self.key_store.clone(),
                self.store.clone(),
                offer(),
                metadata(proof_types),
            )
        }

        fn credential_request(&self) -> Json {
            let requests = self.http_client.requests();
            assert_eq!(requests.len(), 3);
            assert_eq!(requests[1].method, Method::POST);
            assert!(requests[1].body.is_empty());
            serde_json::from_slice(&requests[2].body).unwrap()
        }
    }

    #[tokio::test]
    async fn empty_proof_types_send_no_proofs() {
        let fixture = Fixture::new(json!({"credential": sd_jwt(), "c_nonce": "next"}));

        let record = fixture
            .issuance(json!({}))
            .issue("IdentityCredential", None)
            .await
            .unwrap();

        assert_eq!(
            fixture.credential_request(),
            json!({"credential_configuration_id": "IdentityCredential"})
        );
        assert_eq!(record.type_or_vct, "Identity");
        assert_eq!(record.access_token, "at");
        assert_eq!(record.c_nonce.as_deref(), Some("next"));
        assert_eq!(fixture.store.records(), [record]);
        assert!(fixture.key_store.get("key_binding").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn jwt_proof_is_bound_to_nonce() {
        let fixture = Fixture::new(json!({"credential": sd_jwt()}));

        fixture
            .issuance(json!({"jwt": {"proof_signing_alg_values_supported": ["ES256"]}}))
            .issue("IdentityCredential", None)
            .await
            .unwrap();

        let request = fixture.credential_request();
        let proofs = request["proofs"]["jwt"].as_array().unwrap();
        assert_eq!(proofs.len(), 1);
        let proof = proofs[0].as_str().unwrap();
        assert_eq!(decode_jwt_header(proof).unwrap()["typ"], "openid4vci-proof+jwt");
        let claims = decode_jwt_payload(proof).unwrap();
        assert_eq!(claims["aud"], "https://issuer.example");
        assert_eq!(claims["nonce"], "c-nonce");

        let key = fixture.key_store.get("key_binding").await.unwrap().unwrap();
        assert_eq!(
            decode_jwt_header(proof).unwrap()["jwk"],
            serde_json::to_value(key.jwk().to_public()).unwrap()
        );
    }

    #[tokio::test]
    async fn missing_credential_and_transaction_id() {
        let fixture = Fixture::new(json!({"transaction_id": null, "credential": null}));

        let err = fixture
            .issuance(json!({}))
            .issue("IdentityCredential", None)
            .await
            .unwrap_err();

        assert_eq!(err.remote(), Some(&RemoteError::TransactionIdRequired));
        assert!(fixture.store.records().is_empty());
    }

    #[tokio::test]
    async fn deferred_issuance_is_refused() {
        let fixture = Fixture::new(json!({"transaction_id": "tx-1"}));

        let err = fixture
            .issuance(json!({}))
            .issue("IdentityCredential", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err.remote(),
            Some(RemoteError::DeferredIssuanceNotSupported { transaction_id }) if transaction_id == "tx-1"
        ));
        assert!(fixture.store.records().is_empty());
    }

    #[tokio::test]
    async fn unsupported_proof_type_fails_before_redemption() {
        let fixture = Fixture::new(json!({}));

        let err = fixture
            .issuance(json!({"cwt": {"proof_signing_alg_values_supported": ["ES256"]}}))
            .issue("IdentityCredential", None)
            .await
            .unwrap_err();

        assert_eq!(
            err.input(),
            Some(&InputError::UnsupportedProofType {
                supported: vec!["cwt".into()]
            })
        );
        assert!(fixture.http_client.requests().is_empty());
    }

    #[tokio::test]
    async fn configuration_must_be_offered() {
        let fixture = Fixture::new(json!({}));

        let err = fixture
            .issuance(json!({}))
            .issue("Other", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err.input(),
            Some(InputError::UnknownCredentialConfiguration { id }) if id == "Other"
        ));
        assert!(fixture.http_client.requests().is_empty());
    }

    #[tokio::test]
    async fn transaction_code_is_checked_before_redemption() {
        let fixture = Fixture::new(json!({}));
        let offer = CredentialOffer::from_json(
            &json!({
                "credential_issuer": "https://issuer.example",
                "credential_configuration_ids": ["IdentityCredential"],
                "grants": {
                    "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                        "pre-authorized_code": "code",
                        "tx_code": {"length": 4}
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        let err = Issuance::new(
            fixture.http_client.clone(),
            fixture.key_store.clone(),
            fixture.store.clone(),
            offer,
            metadata(json!({})),
        )
        .issue("IdentityCredential", None)
        .await
        .unwrap_err();

        assert_eq!(err.input(), Some(&InputError::TransactionCodeRequired));
        assert!(fixture.http_client.requests().is_empty());
    }

    struct UnavailableKeyStore;

    #[async_trait::async_trait]
    impl KeyStore for UnavailableKeyStore {
        async fn get_or_create(&self, _alias: &str) -> anyhow::Result<Arc<dyn Signer>> {
            anyhow::bail!("keychain locked")
        }

        async fn get(&self, _alias: &str) -> anyhow::Result<Option<Arc<dyn Signer>>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn unavailable_binding_key_is_a_key_pair_error() {
        let fixture = Fixture::new(json!({"credential": sd_jwt()}));

        let err = Issuance::new(
            fixture.http_client.clone(),
            Arc::new(UnavailableKeyStore),
            fixture.store.clone(),
            offer(),
            metadata(json!({"jwt": {"proof_signing_alg_values_supported": ["ES256"]}})),
        )
        .issue("IdentityCredential", None)
        .await
        .unwrap_err();

        assert_eq!(
            err.protocol_state(),
            Some(&ProtocolStateError::KeyPair {
                alias: "key_binding".into()
            })
        );
        assert!(fixture.store.records().is_empty());
    }
}
