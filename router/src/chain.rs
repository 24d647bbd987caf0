//! # Chain Identifiers
//!
//! CAIP-2 chain identifiers: `namespace ":" reference`, e.g. `eip155:1` or
//! `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`. The namespace is 3 to 8
//! lowercase alphanumerics; the reference is 1 to 64 characters drawn from
//! `[A-Za-z0-9_-]`.
//!
//! Parsing is the only way to obtain a [`ChainId`], so holding one is proof
//! the identifier passed the grammar. Three namespaces get refinement checks
//! beyond the grammar:
//!
//! | Namespace | Reference rule                                        |
//! |-----------|-------------------------------------------------------|
//! | `eip155`  | Positive decimal integer, no leading zero             |
//! | `solana`  | Well-known network name, or 32-char base58 hash       |
//! | `aztec`   | Well-known network name, or decimal integer           |
//!
//! Unknown namespaces pass the generic grammar check only — the router
//! stays open to chains it has never heard of.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Grammar Bounds
// ---------------------------------------------------------------------------

const NAMESPACE_MIN: usize = 3;
const NAMESPACE_MAX: usize = 8;
const REFERENCE_MAX: usize = 64;

/// Solana CAIP-2 references truncate the base58 genesis hash to 32 chars.
const SOLANA_HASH_LEN: usize = 32;

const SOLANA_NETWORKS: [&str; 3] = ["mainnet", "devnet", "testnet"];
const AZTEC_NETWORKS: [&str; 3] = ["mainnet", "testnet", "sandbox"];

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors produced while parsing a chain identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIdError {
    /// The identifier is not of the form `namespace:reference`.
    #[error("malformed chain id: {0:?}")]
    Malformed(String),

    /// The namespace violates the CAIP-2 grammar.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// The reference violates the CAIP-2 grammar.
    #[error("invalid reference: {0:?}")]
    InvalidReference(String),

    /// The reference fails the namespace-specific refinement.
    #[error("invalid {namespace} reference: {reference:?}")]
    InvalidNamespaceReference {
        /// The namespace whose rule was violated.
        namespace: String,
        /// The offending reference.
        reference: String,
    },
}

// ---------------------------------------------------------------------------
// ChainId
// ---------------------------------------------------------------------------

/// A validated CAIP-2 chain identifier.
///
/// Serializes as its canonical string form (`"eip155:1"`), which also makes
/// it usable as a JSON map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Parse and validate a CAIP-2 identifier.
    pub fn parse(s: &str) -> Result<Self, ChainIdError> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| ChainIdError::Malformed(s.to_string()))?;

        if namespace.len() < NAMESPACE_MIN
            || namespace.len() > NAMESPACE_MAX
            || !namespace
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ChainIdError::InvalidNamespace(namespace.to_string()));
        }

        if reference.is_empty()
            || reference.len() > REFERENCE_MAX
            || !reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ChainIdError::InvalidReference(reference.to_string()));
        }

        let id = Self {
            namespace: namespace.to_string(),
            reference: reference.to_string(),
        };
        id.check_namespace_rules()?;
        Ok(id)
    }

    /// The namespace part, e.g. `eip155`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The reference part, e.g. `1`.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Namespace-specific refinements. Unknown namespaces pass.
    fn check_namespace_rules(&self) -> Result<(), ChainIdError> {
        let ok = match self.namespace.as_str() {
            "eip155" => is_positive_decimal(&self.reference),
            "solana" => {
                SOLANA_NETWORKS.contains(&self.reference.as_str())
                    || is_solana_hash(&self.reference)
            }
            "aztec" => {
                AZTEC_NETWORKS.contains(&self.reference.as_str())
                    || is_positive_decimal(&self.reference)
            }
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(ChainIdError::InvalidNamespaceReference {
                namespace: self.namespace.clone(),
                reference: self.reference.clone(),
            })
        }
    }
}

/// Positive decimal integer with no leading zero.
fn is_positive_decimal(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_digit())
        && s != "0"
        && !(s.len() > 1 && s.starts_with('0'))
}

/// A 32-character slice of a base58-encoded genesis hash.
fn is_solana_hash(s: &str) -> bool {
    s.len() == SOLANA_HASH_LEN && bs58::decode(s).into_vec().is_ok()
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl FromStr for ChainId {
    type Err = ChainIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainId::parse(&s).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_forms() {
        let id = ChainId::parse("eip155:1").unwrap();
        assert_eq!(id.namespace(), "eip155");
        assert_eq!(id.reference(), "1");
        assert_eq!(id.to_string(), "eip155:1");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            ChainId::parse("eip155"),
            Err(ChainIdError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_bad_namespaces() {
        // Too short, too long, uppercase.
        assert!(ChainId::parse("ab:1").is_err());
        assert!(ChainId::parse("abcdefghi:1").is_err());
        assert!(ChainId::parse("EIP155:1").is_err());
    }

    #[test]
    fn rejects_bad_references() {
        assert!(ChainId::parse("eip155:").is_err());
        assert!(ChainId::parse(&format!("cosmos:{}", "x".repeat(65))).is_err());
        assert!(ChainId::parse("cosmos:has space").is_err());
    }

    #[test]
    fn eip155_requires_positive_decimal() {
        assert!(ChainId::parse("eip155:1").is_ok());
        assert!(ChainId::parse("eip155:11155111").is_ok());
        assert!(ChainId::parse("eip155:0").is_err());
        assert!(ChainId::parse("eip155:01").is_err());
        assert!(ChainId::parse("eip155:mainnet").is_err());
    }

    #[test]
    fn solana_accepts_networks_and_hashes() {
        assert!(ChainId::parse("solana:mainnet").is_ok());
        assert!(ChainId::parse("solana:devnet").is_ok());
        // First 32 chars of the mainnet genesis hash.
        assert!(ChainId::parse("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp").is_ok());
        // 'l' and '0' are not in the base58 alphabet.
        assert!(ChainId::parse("solana:l0l0l0l0l0l0l0l0l0l0l0l0l0l0l0l0").is_err());
        // Wrong length for a hash, not a known network.
        assert!(ChainId::parse("solana:abc").is_err());
    }

    #[test]
    fn aztec_accepts_networks_and_integers() {
        assert!(ChainId::parse("aztec:mainnet").is_ok());
        assert!(ChainId::parse("aztec:sandbox").is_ok());
        assert!(ChainId::parse("aztec:31337").is_ok());
        assert!(ChainId::parse("aztec:unknown-net").is_err());
    }

    #[test]
    fn unknown_namespaces_pass_generic_grammar() {
        assert!(ChainId::parse("cosmos:cosmoshub-4").is_ok());
        assert!(ChainId::parse("polkadot:91b171bb158e2d3848fa23a9f1c25182").is_ok());
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let id = ChainId::parse("eip155:10").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"eip155:10\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn works_as_json_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ChainId::parse("eip155:1").unwrap(), vec!["eth_accounts"]);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"eip155:1\""));
    }
}
