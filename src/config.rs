use serde::Deserialize;

fn default_id_token_ttl() -> i64 {
    600
}

fn default_binding_key_alias() -> String {
    "key_binding".into()
}

fn default_pairwise_key_alias() -> String {
    "pairwise".into()
}

/// Settings of the presentation engine.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProviderOptions {
    /// Lifetime of a self-issued `id_token`, in seconds.
    #[serde(default = "default_id_token_ttl")]
    pub id_token_ttl: i64,
    /// Key that signs key binding JWTs and VP JWTs.
    #[serde(default = "default_binding_key_alias")]
    pub binding_key_alias: String,
    /// Key whose thumbprint is the `sub` of self-issued `id_token`s.
    #[serde(default = "default_pairwise_key_alias")]
    pub pairwise_key_alias: String,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            id_token_ttl: default_id_token_ttl(),
            binding_key_alias: default_binding_key_alias(),
            pairwise_key_alias: default_pairwise_key_alias(),
        }
    }
}

/// Settings of the issuance flow.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IssuanceOptions {
    /// Key the issued credential is bound to. JWT proofs are signed with it.
    #[serde(default = "default_binding_key_alias")]
    pub binding_key_alias: String,
}

impl Default for IssuanceOptions {
    fn default() -> Self {
        Self {
            binding_key_alias: default_binding_key_alias(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let options: ProviderOptions = serde_json::from_value(json!({"id_token_ttl": 60})).unwrap();
        assert_eq!(options.id_token_ttl, 60);
        assert_eq!(options.binding_key_alias, "key_binding");
        assert_eq!(options.pairwise_key_alias, "pairwise");

        let options: IssuanceOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, IssuanceOptions::default());
    }
}
