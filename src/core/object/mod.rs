use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// An untyped (JSON) Object from which [TypedParameters](TypedParameter) can be parsed.
///
/// Holds authorization request parameters, request object claims or client metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A strongly typed parameter that can represent metadata entries or request parameters.
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + TryInto<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    pub fn new(map: Map<String, Json>) -> Self {
        Self(map)
    }

    /// Get a [TypedParameter] from the Object or return the default value.
    ///
    /// Note that this method clones the underlying data.
    pub fn get_or_default<T: TypedParameter + Default>(&self) -> Result<T> {
        Ok(self
            .0
            .get(T::KEY)
            .cloned()
            .map(TryInto::try_into)
            .transpose()?
            .unwrap_or_default())
    }

    /// Get a [TypedParameter] from the Object.
    ///
    /// Note that this method clones the underlying data.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        Some(self.0.get(T::KEY)?.clone().try_into().map_err(Into::into))
    }

    /// Whether an entry for the [TypedParameter] is present, parseable or not.
    pub fn contains<T: TypedParameter>(&self) -> bool {
        self.0.contains_key(T::KEY)
    }

    /// Remove a [TypedParameter] from the Object.
    pub fn remove<T: TypedParameter>(&mut self) -> Option<Result<T>> {
        Some(self.0.remove(T::KEY)?.try_into().map_err(Into::into))
    }

    /// Insert a [TypedParameter].
    ///
    /// Returns the existing [TypedParameter] if one already exists.
    ///
    /// # Errors
    /// Returns an error if there was already an entry in the Object, but it could not be parsed from JSON.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Option<Result<T>> {
        match t.try_into() {
            Err(_) => Some(Err(Error::msg("failed to parse typed parameter"))),
            Ok(value) => Some(
                self.0
                    .insert(T::KEY.to_owned(), value)?
                    .try_into()
                    .map_err(Into::into),
            ),
        }
    }

    /// Copy every entry of `other` whose key is absent from this Object.
    ///
    /// Entries already present are kept as they are.
    pub fn fill_missing_from(&mut self, other: &UntypedObject) {
        for (key, value) in &other.0 {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        value.0.into()
    }
}

impl From<Map<String, Json>> for UntypedObject {
    fn from(value: Map<String, Json>) -> Self {
        Self(value)
    }
}

pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' is missing", T::KEY))?
            .context(format!("'{}' could not be parsed", T::KEY))
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.context(format!("'{}' could not be parsed", T::KEY))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::authorization_request::parameters::{ClientId, Nonce};

    fn object(value: Json) -> UntypedObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn missing_and_malformed_parameters_are_reported_by_key() {
        let obj = object(json!({"client_id": 7}));

        let err = obj.get::<Nonce>().parsing_error().unwrap_err();
        assert_eq!(err.to_string(), "'nonce' is missing");

        let err = obj.get::<ClientId>().parsing_error().unwrap_err();
        assert_eq!(err.to_string(), "'client_id' could not be parsed");
    }

    #[test]
    fn fill_missing_keeps_existing_entries() {
        let mut request_object = object(json!({"client_id": "a", "nonce": "n1"}));
        let query = object(json!({"client_id": "b", "state": "s"}));

        request_object.fill_missing_from(&query);

        assert_eq!(request_object.get::<ClientId>().unwrap().unwrap().0, "a");
        assert_eq!(request_object.as_map()["state"], json!("s"));
        assert_eq!(request_object.as_map()["nonce"], json!("n1"));
    }
}
