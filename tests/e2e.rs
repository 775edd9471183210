use std::sync::Arc;

use base64::prelude::*;
use josekit::{jwe::ECDH_ES, jwk::Jwk};
use oid4wallet::{
    core::{
        credential_format::ClaimFormatDesignation,
        error::InputError,
        signer::{KeyStore, MemoryKeyStore},
        submission::sd_hash,
    },
    issuance::{
        metadata::IssuerMetadata, offer::CredentialOffer, storage::MemoryCredentialStore, Issuance,
    },
    wallet::{HeldCredential, OpenIdProvider},
};
use serde_json::{json, Value as Json};
use url::Url;


use fixtures::{
    degree_jwt_vc, identity_sd_jwt, init_tracing, json_response, jwt, request_url, MockHttpClient, RESPONSE_URI,
};

fn held(id: &str, format: ClaimFormatDesignation, raw: String) -> HeldCredential {
    HeldCredential {
        id: id.into(),
        format,
        types: vec![],
        raw_credential: raw,
    }
}

fn payload(jwt: &str) -> Json {
    let payload = jwt.split('.').nth(1).unwrap();
    serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

#[tokio::test]
async fn dcql_sd_jwt_direct_post() {
    init_tracing();
    let (sd_jwt, disclosures) = identity_sd_jwt();
    let provider = OpenIdProvider::new(
        MockHttpClient::new([json_response(
            200,
            json!({"redirect_uri": "https://verifier.example/done?id=1"}),
        )]),
        Arc::new(MemoryKeyStore::new()),
    );

    let request = provider
        .process_request(&request_url(json!({
            "client_id": RESPONSE_URI,
            "response_type": "vp_token",
            "response_mode": "direct_post",
            "response_uri": RESPONSE_URI,
            "nonce": "n-0S6_WzA2Mj",
            "state": "af0ifjsldkj",
            "dcql_query": {
                "credentials": [{
                    "id": "pid",
                    "format": "dc+sd-jwt",
                    "meta": {"vct_values": ["Identity"]},
                    "claims": [{"path": ["given_name"]}]
                }]
            }
        })))
        .await
        .unwrap();

    let credentials = provider.match_credentials(
        &request,
        &[
            held("degree", ClaimFormatDesignation::JwtVcJson, degree_jwt_vc()),
            held("identity", ClaimFormatDesignation::DcSdJwt, sd_jwt.clone()),
        ],
    );
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].id, "identity");

    let result = provider.respond(&request, &credentials).await.unwrap();
    assert_eq!(
        result.post_result.location.unwrap().as_str(),
        "https://verifier.example/done?id=1"
    );
    assert!(result.id_token.is_none());
    let shared: Vec<_> = result.shared_credentials[0]
        .shared_claims
        .iter()
        .map(|claim| claim.name.as_str())
        .collect();
    assert_eq!(shared, ["given_name"]);

    let sent = &provider.http_client().sent()[0];
    assert_eq!(sent.uri, RESPONSE_URI);
    assert_eq!(sent.field("state").as_deref(), Some("af0ifjsldkj"));
    assert!(sent.field("presentation_submission").is_none());

    let vp_token: Json = serde_json::from_str(&sent.field("vp_token").unwrap()).unwrap();
    let token = vp_token["pid"][0].as_str().unwrap();
    let segments: Vec<&str> = token.split('~').collect();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[1], disclosures[0]);

    let issuer_jwt = sd_jwt.split('~').next().unwrap();
    let kb = payload(segments[2]);
    assert_eq!(kb["aud"], RESPONSE_URI);
    assert_eq!(kb["nonce"], "n-0S6_WzA2Mj");
    assert_eq!(
        kb["sd_hash"],
        sd_hash(&format!("{issuer_jwt}~{}~", disclosures[0]))
    );
}

#[tokio::test]
async fn presentation_exchange_with_two_credentials() {
    init_tracing();
    let (sd_jwt, _) = identity_sd_jwt();
    let provider = OpenIdProvider::new(
        MockHttpClient::new([http::Response::builder()
            .status(302)
            .header(http::header::LOCATION, "/done")
            .body(vec![])
            .unwrap()]),
        Arc::new(MemoryKeyStore::new()),
    );

    let request = provider
        .process_request(&request_url(json!({
            "client_id": RESPONSE_URI,
            "response_type": "vp_token",
            "response_mode": "direct_post",
            "response_uri": RESPONSE_URI,
            "nonce": "n-1",
            "presentation_definition": {
                "id": "32f54163-7166-48f1-93d8-ff217bdb0653",
                "input_descriptors": [
                    {
                        "id": "identity",
                        "format": {"vc+sd-jwt": {}},
                        "purpose": "Age check",
                        "constraints": {
                            "limit_disclosure": "required",
                            "fields": [
                                {"path": ["$.vct"], "filter": {"type": "string", "const": "Identity"}},
                                {"path": ["$.given_name"]},
                                {"path": ["$.family_name"], "optional": true}
                            ]
                        }
                    },
                    {
                        "id": "degree",
                        "format": {"jwt_vc_json": {"alg": ["ES256"]}},
                        "constraints": {}
                    }
                ]
            }
        })))
        .await
        .unwrap();

    let mut credentials = provider.match_credentials(
        &request,
        &[
            held("identity", ClaimFormatDesignation::VcSdJwt, sd_jwt),
            held("degree", ClaimFormatDesignation::JwtVcJson, degree_jwt_vc()),
        ],
    );
    assert_eq!(credentials.len(), 2);

    let family_name = credentials[0]
        .disclose_claims
        .iter_mut()
        .find(|claim| claim.disclosure.key.as_deref() == Some("family_name"))
        .unwrap();
    assert!(family_name.is_user_selectable && !family_name.is_submit);
    assert!(family_name.select(true));

    let result = provider.respond(&request, &credentials).await.unwrap();
    assert_eq!(
        result.post_result.location.unwrap().as_str(),
        "https://verifier.example/done"
    );
    assert_eq!(result.shared_credentials[0].purpose.as_deref(), Some("Age check"));
    assert_eq!(result.shared_credentials[1].shared_claims.len(), 2);

    let sent = &provider.http_client().sent()[0];
    let vp_token: Json = serde_json::from_str(&sent.field("vp_token").unwrap()).unwrap();
    let tokens = vp_token.as_array().unwrap();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].as_str().unwrap().split('~').count(), 4);

    let vp = payload(tokens[1].as_str().unwrap());
    assert_eq!(vp["aud"], RESPONSE_URI);
    assert_eq!(vp["vp"]["verifiableCredential"][0], degree_jwt_vc());

    let submission: Json =
        serde_json::from_str(&sent.field("presentation_submission").unwrap()).unwrap();
    assert_eq!(
        submission["definition_id"],
        "32f54163-7166-48f1-93d8-ff217bdb0653"
    );
    let descriptor_map = submission["descriptor_map"].as_array().unwrap();
    assert_eq!(
        descriptor_map[0],
        json!({"id": "identity", "format": "vc+sd-jwt", "path": "$[0]"})
    );
    assert_eq!(descriptor_map[1]["format"], "jwt_vp_json");
    assert_eq!(descriptor_map[1]["path"], "$[1]");
    assert_eq!(
        descriptor_map[1]["path_nested"]["path"],
        "$.vp.verifiableCredential[0]"
    );
}

#[tokio::test]
async fn direct_post_jwt_encrypts_to_verifier_key() {
    init_tracing();
    let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
    let mut public: Json = serde_json::from_str(&secret.public_key().to_jwk_string()).unwrap();
    public["use"] = "enc".into();
    public["alg"] = "ECDH-ES".into();
    public["kid"] = "enc-1".into();
    let private = Jwk::from_bytes(secret.to_jwk_string().as_bytes()).unwrap();

    let (sd_jwt, _) = identity_sd_jwt();
    let provider = OpenIdProvider::new(
        MockHttpClient::new([json_response(200, json!({}))]),
        Arc::new(MemoryKeyStore::new()),
    );
    let request = provider
        .process_request(&request_url(json!({
            "client_id": RESPONSE_URI,
            "response_type": "vp_token",
            "response_mode": "direct_post.jwt",
            "response_uri": RESPONSE_URI,
            "nonce": "n-2",
            "state": "s-2",
            "client_metadata": {
                "jwks": {"keys": [public]},
                "encrypted_response_enc_values_supported": ["A128CBC-HS256", "A128GCM"]
            },
            "dcql_query": {"credentials": [{"id": "pid", "format": "dc+sd-jwt"}]}
        })))
        .await
        .unwrap();

    let credentials = provider.match_credentials(
        &request,
        &[held("identity", ClaimFormatDesignation::DcSdJwt, sd_jwt)],
    );
    provider.respond(&request, &credentials).await.unwrap();

    let sent = &provider.http_client().sent()[0];
    assert!(sent.field("vp_token").is_none());
    assert_eq!(sent.field("state").as_deref(), Some("s-2"));

    let decrypter = ECDH_ES.decrypter_from_jwk(&private).unwrap();
    let (claims, header) =
        josekit::jwt::decode_with_decrypter(sent.field("response").unwrap(), &decrypter).unwrap();
    assert_eq!(header.key_id(), Some("enc-1"));
    assert_eq!(header.content_encryption(), Some("A128GCM"));
    assert!(claims.claim("state").is_none());

    // Without a `claims` constraint every disclosure is presented.
    let token = claims.claim("vp_token").unwrap()["pid"][0].as_str().unwrap();
    assert_eq!(token.split('~').count(), 5);
}

#[tokio::test]
async fn direct_post_jwt_without_encryption_key_posts_plain_form() {
    init_tracing();
    let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
    let mut signing_key: Json = serde_json::from_str(&secret.public_key().to_jwk_string()).unwrap();
    signing_key["use"] = "sig".into();

    let (sd_jwt, _) = identity_sd_jwt();
    let provider = OpenIdProvider::new(
        MockHttpClient::new([json_response(200, json!({}))]),
        Arc::new(MemoryKeyStore::new()),
    );
    let request = provider
        .process_request(&request_url(json!({
            "client_id": RESPONSE_URI,
            "response_type": "vp_token",
            "response_mode": "direct_post.jwt",
            "response_uri": RESPONSE_URI,
            "nonce": "n-4",
            "state": "s-4",
            "client_metadata": {"jwks": {"keys": [signing_key]}},
            "dcql_query": {"credentials": [{"id": "pid", "format": "dc+sd-jwt"}]}
        })))
        .await
        .unwrap();

    let credentials = provider.match_credentials(
        &request,
        &[held("identity", ClaimFormatDesignation::DcSdJwt, sd_jwt)],
    );
    provider.respond(&request, &credentials).await.unwrap();

    let sent = &provider.http_client().sent()[0];
    assert!(sent.field("response").is_none());
    assert_eq!(sent.field("state").as_deref(), Some("s-4"));
    let vp_token: Json = serde_json::from_str(&sent.field("vp_token").unwrap()).unwrap();
    assert!(vp_token["pid"][0].is_string());
}

#[tokio::test]
async fn unsupported_content_encryption_posts_plain_form() {
    init_tracing();
    let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
    let mut public: Json = serde_json::from_str(&secret.public_key().to_jwk_string()).unwrap();
    public["use"] = "enc".into();

    let (sd_jwt, _) = identity_sd_jwt();
    let provider = OpenIdProvider::new(
        MockHttpClient::new([json_response(200, json!({}))]),
        Arc::new(MemoryKeyStore::new()),
    );
    let request = provider
        .process_request(&request_url(json!({
            "client_id": RESPONSE_URI,
            "response_type": "vp_token",
            "response_mode": "direct_post.jwt",
            "response_uri": RESPONSE_URI,
            "nonce": "n-5",
            "client_metadata": {
                "jwks": {"keys": [public]},
                "encrypted_response_enc_values_supported": ["A128CBC-HS256"]
            },
            "dcql_query": {"credentials": [{"id": "pid", "format": "dc+sd-jwt"}]}
        })))
        .await
        .unwrap();

    let credentials = provider.match_credentials(
        &request,
        &[held("identity", ClaimFormatDesignation::DcSdJwt, sd_jwt)],
    );
    provider.respond(&request, &credentials).await.unwrap();

    let sent = &provider.http_client().sent()[0];
    assert!(sent.field("response").is_none());
    assert!(sent.field("vp_token").is_some());
}

#[tokio::test]
async fn unsigned_x509_request_is_rejected() {
    init_tracing();
    let provider = OpenIdProvider::new(MockHttpClient::default(), Arc::new(MemoryKeyStore::new()));

    let err = provider
        .process_request(&request_url(json!({
            "client_id": "x509_san_dns:verifier.example",
            "response_type": "vp_token",
            "response_mode": "direct_post",
            "response_uri": RESPONSE_URI,
            "nonce": "n-3",
            "dcql_query": {"credentials": [{"id": "pid", "format": "dc+sd-jwt"}]}
        })))
        .await
        .unwrap_err();

    assert!(matches!(err.input(), Some(InputError::RequestVerification { .. })));
    assert!(provider.http_client().sent().is_empty());
}

#[tokio::test]
async fn pre_authorized_code_issuance() {
    init_tracing();
    let credential = format!(
        "{}~{}~",
        jwt(json!({"iss": "https://issuer.example", "iat": 1, "exp": 2, "vct": "Identity"})),
        fixtures::disclosure("salt", "given_name", "Erika")
    );
    let http_client = Arc::new(MockHttpClient::new([
        json_response(200, json!({"access_token": "at", "token_type": "bearer"})),
        json_response(200, json!({"c_nonce": "c-1"})),
        json_response(200, json!({"credential": credential})),
    ]));
    let key_store = Arc::new(MemoryKeyStore::new());
    let store = Arc::new(MemoryCredentialStore::new());

    let mut offer_uri: Url = "openid-credential-offer://".parse().unwrap();
    offer_uri.query_pairs_mut().append_pair(
        "credential_offer",
        &json!({
            "credential_issuer": "https://issuer.example",
            "credential_configuration_ids": ["Identity"],
            "grants": {
                "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                    "pre-authorized_code": "SplxlOBeZQQYbYS6WxSbIA",
                    "tx_code": {"input_mode": "numeric", "length": 6}
                }
            }
        })
        .to_string(),
    );
    let offer = CredentialOffer::parse(offer_uri.as_str()).unwrap();
    assert!(offer.is_tx_code_required());

    let metadata = IssuerMetadata {
        credential_issuer: serde_json::from_value(json!({
            "credential_issuer": "https://issuer.example",
            "credential_endpoint": "https://issuer.example/credential",
            "nonce_endpoint": "https://issuer.example/nonce",
            "credential_configurations_supported": {
                "Identity": {
                    "format": "dc+sd-jwt",
                    "vct": "Identity",
                    "proof_types_supported": {
                        "jwt": {"proof_signing_alg_values_supported": ["ES256"]}
                    }
                }
            }
        }))
        .unwrap(),
        authorization_server: serde_json::from_value(json!({
            "token_endpoint": "https://auth.example/token"
        }))
        .unwrap(),
    };

    let record = Issuance::new(
        http_client.clone(),
        key_store.clone(),
        store.clone(),
        offer,
        metadata,
    )
    .issue("Identity", Some("493536"))
    .await
    .unwrap();

    assert_eq!(record.type_or_vct, "Identity");
    assert_eq!(record.credential, credential);
    assert_eq!(store.records(), [record]);

    let sent = http_client.sent();
    let uris: Vec<&str> = sent.iter().map(|s| s.uri.as_str()).collect();
    assert_eq!(
        uris,
        [
            "https://auth.example/token",
            "https://issuer.example/nonce",
            "https://issuer.example/credential"
        ]
    );
    assert_eq!(sent[0].field("tx_code").as_deref(), Some("493536"));

    let request: Json = serde_json::from_slice(&sent[2].body).unwrap();
    let proof = request["proofs"]["jwt"][0].as_str().unwrap();
    assert_eq!(payload(proof)["nonce"], "c-1");
    assert!(key_store.get("key_binding").await.unwrap().is_some());
}
