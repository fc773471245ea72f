//! # Core

use serde::{Deserialize, Serialize};

/// `Kind` allows serde to serialize/deserialize a string or an object.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Kind<T> {
    /// Simple string value
    String(String),

    /// Complex object value
    Object(T),
}

impl<T: Default> Default for Kind<T> {
    fn default() -> Self {
        Self::String(String::new())
    }
}

impl<T> Kind<T> {
    /// Returns `true` if the `Kind` is an object.
    pub const fn is_object(&self) -> bool {
        match self {
            Self::String(_) => false,
            Self::Object(_) => true,
        }
    }

    /// Returns the string value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Object(_) => None,
        }
    }
}

impl<T> From<String> for Kind<T> {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T> From<&str> for Kind<T> {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// `OneMany` allows serde to serialize/deserialize a single object or a set of
/// objects.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneMany<T> {
    /// Single object
    One(T),

    /// Set of objects
    Many(Vec<T>),
}

impl<T: Default> Default for OneMany<T> {
    fn default() -> Self {
        Self::One(T::default())
    }
}

impl<T> OneMany<T> {
    /// Returns `true` if the `OneMany` is a single object.
    pub const fn is_one(&self) -> bool {
        match self {
            Self::One(_) => true,
            Self::Many(_) => false,
        }
    }
}

impl<T> From<T> for OneMany<T> {
    fn from(value: T) -> Self {
        Self::One(value)
    }
}

#[cfg(test)]
mod test {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn endpoint_shapes() {
        let one: OneMany<Kind<Value>> = serde_json::from_value(json!("https://e.com")).unwrap();
        assert!(one.is_one());
        let OneMany::One(kind) = &one else { panic!("should be one") };
        assert_eq!(kind.as_str(), Some("https://e.com"));

        let many: OneMany<Kind<Value>> =
            serde_json::from_value(json!(["https://a.com", "https://b.com"])).unwrap();
        assert!(!matches!(many, OneMany::One(Kind::String(_))));

        let obj: OneMany<Kind<Value>> = serde_json::from_value(json!({"uri": "x"})).unwrap();
        let OneMany::One(kind) = &obj else { panic!("should be one") };
        assert!(kind.is_object());
    }
}
