//! Authorization parameters and the view handlers use to read and update them.
//!
//! Every value is tagged as either user-supplied or system-managed. Handlers write through
//! [`AuthView::set`], which only ever replaces system values: whatever the user configured wins.

use std::borrow::Cow;

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct AuthParam {
    pub value: Value,
    pub system: bool,
}

/// Ordered key/value store of authorization parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthParameters {
    entries: Vec<(String, AuthParam)>,
}

impl AuthParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user-supplied value.
    pub fn insert_user(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.put(key.into(), value.into(), false);
    }

    pub fn get(&self, key: &str) -> Option<&AuthParam> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, param)| param)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AuthParam)> {
        self.entries.iter().map(|(name, param)| (name.as_str(), param))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a system value. Returns `false` if a user value is already present under `key`.
    pub fn set_system(&mut self, key: &str, value: Value) -> bool {
        match self.entries.iter_mut().find(|(name, _)| name == key) {
            Some((_, param)) if param.system => {
                param.value = value;
                true
            }
            Some(_) => false,
            None => {
                self.put(key.to_owned(), value, true);
                true
            }
        }
    }

    /// Copy every system value of `other` into `self`, following the same rules as `set_system`.
    pub fn sync_system_from(&mut self, other: &AuthParameters) {
        for (key, param) in other.iter().filter(|(_, param)| param.system) {
            self.set_system(key, param.value.clone());
        }
    }

    fn put(&mut self, key: String, value: Value, system: bool) {
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, param)) => *param = AuthParam { value, system },
            None => self.entries.push((key, AuthParam { value, system })),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for AuthParameters
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = AuthParameters::new();
        for (key, value) in iter {
            params.insert_user(key, value);
        }
        params
    }
}

/// Per-logical-request view over the authorization parameters.
///
/// Besides the parameters, the view carries typed handshake state in its extensions. The view is
/// created once per logical request and lives across replays, so both survive retries, and no two
/// logical requests ever share one.
#[derive(Debug, Clone, Default)]
pub struct AuthView {
    params: AuthParameters,
    extensions: http::Extensions,
}

impl AuthView {
    pub fn new(params: AuthParameters) -> Self {
        Self {
            params,
            extensions: http::Extensions::new(),
        }
    }

    pub fn params(&self) -> &AuthParameters {
        &self.params
    }

    /// Raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key).map(|param| &param.value)
    }

    /// The subset of `keys` that have a value.
    pub fn get_many(&self, keys: &[&str]) -> Map<String, Value> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| ((*key).to_owned(), value.clone())))
            .collect()
    }

    /// Value under `key` rendered as a string. Null and absent values are `None`.
    pub fn get_str(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(value) => Some(Cow::Borrowed(value)),
            Value::Bool(value) => Some(Cow::Owned(value.to_string())),
            Value::Number(value) => Some(Cow::Owned(value.to_string())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    /// String value under `key`, or an empty string.
    pub fn string(&self, key: &str) -> String {
        self.get_str(key).map(Cow::into_owned).unwrap_or_default()
    }

    /// Non-empty string value under `key`.
    pub fn non_empty(&self, key: &str) -> Option<String> {
        self.get_str(key)
            .filter(|value| !value.is_empty())
            .map(Cow::into_owned)
    }

    /// Non-empty string value under `key`, or an error naming the missing parameter.
    pub fn require(&self, key: &'static str) -> Result<String, crate::AuthError> {
        self.non_empty(key)
            .ok_or(crate::AuthError::MissingParameter(key))
    }

    /// Interpret the value under `key` as a boolean flag.
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(Value::String(value)) => value.eq_ignore_ascii_case("true"),
            Some(Value::Number(value)) => value.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }

    /// Store a system value. An existing user value under `key` is left untouched.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.params.set_system(key, value.into());
        self
    }

    /// Store every entry of a JSON object as in [`AuthView::set`]. Anything else is ignored.
    pub fn merge(&mut self, values: Value) -> &mut Self {
        if let Value::Object(map) = values {
            for (key, value) in map {
                self.params.set_system(&key, value);
            }
        }
        self
    }

    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }

    /// Take over the system values and handshake state of a view cloned from this one.
    pub(crate) fn absorb(&mut self, signed: AuthView) {
        self.params.sync_system_from(&signed.params);
        self.extensions = signed.extensions;
    }
}

/// Authorization block declared by a request: the scheme name and its parameters.
#[derive(Debug, Clone)]
pub struct RequestAuth {
    pub auth_type: String,
    pub view: AuthView,
}

impl RequestAuth {
    pub fn new(auth_type: impl Into<String>) -> Self {
        Self {
            auth_type: auth_type.into(),
            view: AuthView::default(),
        }
    }

    pub fn with_params(auth_type: impl Into<String>, params: AuthParameters) -> Self {
        Self {
            auth_type: auth_type.into(),
            view: AuthView::new(params),
        }
    }

    /// Add a user-supplied parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.view.params.insert_user(key, value);
        self
    }
}
