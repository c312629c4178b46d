use crate::collaborators::{AddressInspector, KeyDeriver, SigningKey};
use crate::compose_utils::derivation_mapper::{DerivationIndexTable, DerivationPath};
use anyhow::Context;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    pub address: String,
    pub signing_key: SigningKey,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub derivation_hits: u64,
    pub key_hits: u64,
    pub derivation_len: usize,
    pub key_len: usize,
}

impl CacheStats {
    /// Hit counts accumulated since `earlier`; table sizes are current.
    pub fn since(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            derivation_hits: self.derivation_hits - earlier.derivation_hits,
            key_hits: self.key_hits - earlier.key_hits,
            derivation_len: self.derivation_len,
            key_len: self.key_len,
        }
    }
}

/// Address to signing key memo for the lifetime of a run. Never evicts.
#[derive(Default)]
pub struct WitnessCache {
    keys: HashMap<String, SigningKey>,
    key_hits: u64,
    derivations: DerivationIndexTable,
}

impl WitnessCache {
    pub fn new(derivations: DerivationIndexTable) -> Self {
        Self {
            keys: HashMap::new(),
            key_hits: 0,
            derivations,
        }
    }

    /// Pre-seeds a key that is already known, e.g. the bootstrap key.
    pub fn seed(&mut self, address: impl Into<String>, signing_key: SigningKey) {
        self.keys.insert(address.into(), signing_key);
    }

    pub fn derivations_mut(&mut self) -> &mut DerivationIndexTable {
        &mut self.derivations
    }

    pub async fn resolve(
        &mut self,
        address: &str,
        inspector: &dyn AddressInspector,
        deriver: &dyn KeyDeriver,
    ) -> anyhow::Result<SigningKey> {
        if let Some(key) = self.keys.get(address) {
            self.key_hits += 1;
            return Ok(key.clone());
        }

        let path = self.derivation_path(address, inspector).await?;
        let key = deriver
            .derive_signing_key(path)
            .await
            .with_context(|| format!("can't derive signing key at {}", path))?;
        self.keys.insert(address.to_string(), key.clone());
        Ok(key)
    }

    /// One witness per address, in the given order.
    pub async fn witnesses_for(
        &mut self,
        addresses: &[String],
        inspector: &dyn AddressInspector,
        deriver: &dyn KeyDeriver,
    ) -> anyhow::Result<Vec<Witness>> {
        let mut witnesses = Vec::with_capacity(addresses.len());
        for address in addresses {
            let signing_key = self.resolve(address, inspector, deriver).await?;
            witnesses.push(Witness {
                address: address.clone(),
                signing_key,
            });
        }
        Ok(witnesses)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            derivation_hits: self.derivations.hits(),
            key_hits: self.key_hits,
            derivation_len: self.derivations.len(),
            key_len: self.keys.len(),
        }
    }

    async fn derivation_path(
        &mut self,
        address: &str,
        inspector: &dyn AddressInspector,
    ) -> anyhow::Result<DerivationPath> {
        if let Some(path) = self.derivations.lookup(address) {
            return Ok(path);
        }
        let path = inspector
            .inspect(address)
            .await
            .with_context(|| format!("can't inspect address {}", address))?;
        self.derivations.insert(address.to_string(), path);
        Ok(path)
    }
}
