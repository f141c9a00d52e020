//! Secret string handling with redacted display and serialization.
//!
//! Provides `RedactedString` for the remote key secret, so it never leaks
//! through logs, debug output or a serialized application config. The
//! credential store opts into the real value with [`serialize_exposed`].

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

/// Placeholder text shown instead of the secret in logs/debug output
pub static REDACTED_SECRET: &str = "###REDACTED_SECRET###";

/// A string that gets redacted in debug output and serialization
///
/// The wrapped memory is zeroed on drop.
#[derive(Validate, Clone, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[validate(length(min = 1))]
    #[builder(into)]
    inner: String,
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        RedactedString::builder().inner(value).build()
    }
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_SECRET)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_SECRET)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::from(v))
    }
}

/// Writes the actual secret, for the credential store only.
pub fn serialize_exposed<S: Serializer>(
    value: &Option<RedactedString>,
    serializer: S,
) -> result::Result<S::Ok, S::Error> {
    match value {
        Some(secret) => serializer.serialize_some(secret.inner()),
        None => serializer.serialize_none(),
    }
}
