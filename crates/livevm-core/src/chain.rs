//! Configured chains and the registry that indexes them by id.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// A single configured chain.
///
/// Field names on the wire follow the `chains.json` format:
/// `{"id":"8453","name":"Base","wss":"wss://…","nativeCurrency":"ETH"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    /// Chain id as configured, e.g. `"1"` or `"8453"`.
    pub id: String,
    /// Display name, e.g. `"Base"`.
    pub name: String,
    /// WebSocket RPC endpoint.
    #[serde(rename = "wss", alias = "endpoint")]
    pub endpoint: String,
    /// Native currency symbol, e.g. `"ETH"`.
    #[serde(rename = "nativeCurrency")]
    pub currency_symbol: String,
}

impl Chain {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        currency_symbol: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            currency_symbol: currency_symbol.into(),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Immutable, ordered list of chains with lookup by id.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
    by_id: HashMap<String, usize>,
}

impl ChainRegistry {
    /// Build a registry, preserving configuration order.
    pub fn new(chains: Vec<Chain>) -> Result<Self, RegistryError> {
        if chains.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut by_id = HashMap::with_capacity(chains.len());
        for (idx, chain) in chains.iter().enumerate() {
            if by_id.insert(chain.id.clone(), idx).is_some() {
                return Err(RegistryError::DuplicateChain(chain.id.clone()));
            }
        }
        Ok(Self { chains, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Chain> {
        self.by_id.get(id).map(|&idx| &self.chains[idx])
    }

    /// Chains in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Chain> {
        self.chains.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.chains.iter().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
