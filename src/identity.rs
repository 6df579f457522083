//! Canonical ServiceImport identities and query name parsing.
//!
//! An identity is `<name>.<namespace>`. Components are not validated: a name
//! or namespace containing the separator produces an ambiguous identity.

use std::fmt;

use crate::error::MalformedName;

/// Separator between the service name and its namespace.
pub const SEPARATOR: char = '.';

/// Build the canonical identity for a service name and namespace.
pub fn build_identity(name: &str, namespace: &str) -> String {
    let mut identity = String::with_capacity(name.len() + namespace.len() + 1);
    identity.push_str(name);
    identity.push(SEPARATOR);
    identity.push_str(namespace);
    identity
}

/// Split a zone-stripped query remainder into `(name, namespace)`.
///
/// `"myservice.test."` yields `("myservice", "test")`. The first label is the
/// service name and everything after it, minus one trailing dot, is the
/// namespace.
pub fn split_query_name(remainder: &str) -> Result<(&str, &str), MalformedName> {
    let trimmed = remainder.strip_suffix(SEPARATOR).unwrap_or(remainder);

    let (name, namespace) = trimmed
        .split_once(SEPARATOR)
        .ok_or_else(|| MalformedName(remainder.to_string()))?;

    if name.is_empty() || namespace.is_empty() {
        return Err(MalformedName(remainder.to_string()));
    }

    Ok((name, namespace))
}

/// Name and namespace of a ServiceImport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
}

impl ServiceKey {
    /// Create a key from a name and namespace.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Parse a canonical identity back into a key.
    ///
    /// Splits at the first separator, mirroring [`split_query_name`].
    pub fn from_identity(identity: &str) -> Option<Self> {
        let (name, namespace) = identity.split_once(SEPARATOR)?;
        Some(Self::new(name, namespace))
    }

    /// Canonical identity for this key.
    pub fn identity(&self) -> String {
        build_identity(&self.name, &self.namespace)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, SEPARATOR, self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_identity() {
        assert_eq!(build_identity("myservice", "test"), "myservice.test");
    }

    #[test]
    fn test_split_query_name_with_trailing_dot() {
        assert_eq!(
            split_query_name("myservice.test.").unwrap(),
            ("myservice", "test")
        );
    }

    #[test]
    fn test_split_query_name_without_trailing_dot() {
        assert_eq!(
            split_query_name("myservice.test").unwrap(),
            ("myservice", "test")
        );
    }

    #[test]
    fn test_split_query_name_keeps_extra_labels_in_namespace() {
        assert_eq!(split_query_name("a.b.c.").unwrap(), ("a", "b.c"));
    }

    #[test]
    fn test_split_query_name_malformed() {
        for remainder in ["", ".", "myservice.", "myservice", ".test.", "myservice.."] {
            assert_eq!(
                split_query_name(remainder),
                Err(MalformedName(remainder.to_string())),
                "remainder {remainder:?}"
            );
        }
    }

    #[test]
    fn test_identity_round_trip() {
        let pairs = [
            ("myservice", "test"),
            ("svc", "svc-ns"),
            ("a", "b"),
            ("web-frontend-0", "kube-system"),
        ];

        for (name, namespace) in pairs {
            let remainder = format!("{}.", build_identity(name, namespace));
            assert_eq!(split_query_name(&remainder).unwrap(), (name, namespace));
        }
    }

    #[test]
    fn test_service_key_identity_and_display() {
        let key = ServiceKey::new("myservice", "test");
        assert_eq!(key.identity(), "myservice.test");
        assert_eq!(key.to_string(), "myservice.test");
        assert_eq!(ServiceKey::from_identity("myservice.test"), Some(key));
        assert_eq!(ServiceKey::from_identity("nodot"), None);
    }
}
