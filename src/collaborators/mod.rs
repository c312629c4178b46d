pub mod cardano_address;
pub mod cardano_cli;
pub mod tool_command;
pub mod wallet_api;
pub mod wallet_db;

use crate::compose_utils::derivation_mapper::DerivationPath;
use crate::compose_utils::fee_stabilizer::{TxDraft, TxShape};
use crate::compose_utils::witness_cache::Witness;
use crate::utxo::{ChainTip, ProtocolParameters, Utxo};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// cardano-cli text envelope, the on-disk format of keys and transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "cborHex")]
    pub cbor_hex: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(pub TextEnvelope);

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.0.kind).finish()
    }
}

/// cardano-address bech32 key text (root or child, private or public).
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey(String);

impl ExtendedKey {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtendedKey(..)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxBody(pub TextEnvelope);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx(pub TextEnvelope);

/// Wallet-store view of the wallet at its latest slot.
#[derive(Clone, Debug, Default)]
pub struct WalletSnapshot {
    /// Lovelace-only utxos, ascending by value, base58 addresses.
    pub utxos: Vec<Utxo>,
    pub asset_utxo_count: u64,
    pub addresses: Vec<WalletAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletAddress {
    /// base58
    pub address: String,
    pub path: DerivationPath,
    pub status: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalletStats {
    pub utxo_count: usize,
    pub address_count: usize,
    pub lovelace: u64,
}

impl WalletSnapshot {
    pub fn stats(&self) -> WalletStats {
        WalletStats {
            utxo_count: self.utxos.len(),
            address_count: self.utxos.iter().map(|utxo| &utxo.address).unique().count(),
            lovelace: crate::utxo::total_value(&self.utxos),
        }
    }

    pub fn derivation_entries(&self) -> impl Iterator<Item = (String, DerivationPath)> + '_ {
        self.addresses
            .iter()
            .map(|entry| (entry.address.clone(), entry.path))
    }
}

/// Node queries.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn query_utxos(&self, address: &str) -> anyhow::Result<Vec<Utxo>>;
    async fn protocol_parameters(&self) -> anyhow::Result<ProtocolParameters>;
    async fn tip(&self) -> anyhow::Result<ChainTip>;
}

/// Draft, fee oracle, signing and submission.
#[async_trait]
pub trait TransactionToolchain: Send + Sync {
    async fn build_draft(&self, draft: &TxDraft) -> anyhow::Result<TxBody>;
    async fn min_fee(
        &self,
        body: &TxBody,
        shape: TxShape,
        params: &ProtocolParameters,
    ) -> anyhow::Result<u64>;
    async fn sign(&self, body: &TxBody, witnesses: &[Witness]) -> anyhow::Result<SignedTx>;
    async fn tx_id(&self, signed: &SignedTx) -> anyhow::Result<String>;
    async fn submit(&self, signed: &SignedTx) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AddressInspector: Send + Sync {
    async fn inspect(&self, address: &str) -> anyhow::Result<DerivationPath>;
}

#[async_trait]
pub trait KeyDeriver: Send + Sync {
    async fn derive_signing_key(&self, path: DerivationPath) -> anyhow::Result<SigningKey>;
}

#[async_trait]
pub trait WalletSource: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<WalletSnapshot>;
}

/// Creates fresh receiving addresses in the wallet.
#[async_trait]
pub trait AddressFactory: Send + Sync {
    async fn create_address(&self) -> anyhow::Result<String>;
}
