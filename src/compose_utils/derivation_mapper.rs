use anyhow::anyhow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const HARDENED_OFFSET: u64 = 1 << 31;

/// Byron random-wallet derivation path, both levels hardened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    pub account_index: u32,
    pub address_index: u32,
}

/// Path of the operator's bootstrap address.
pub const BOOTSTRAP_PATH: DerivationPath = DerivationPath {
    account_index: 0,
    address_index: 444_138_633,
};

impl DerivationPath {
    pub fn new(account_index: u32, address_index: u32) -> Self {
        Self {
            account_index,
            address_index,
        }
    }

    /// Wallet-store indices are stored with the hardened bit set; strip it.
    pub fn from_wallet_indices(account_ix: u64, address_ix: u64) -> anyhow::Result<Self> {
        Ok(Self {
            account_index: Self::normalise(account_ix)?,
            address_index: Self::normalise(address_ix)?,
        })
    }

    /// Parses one level of a path, e.g. `"14H"` or `"14"`.
    pub fn parse_index(part: &str) -> anyhow::Result<u32> {
        let digits = part.trim().trim_end_matches('H');
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("can't parse derivation index: {:?}", part));
        }
        Self::normalise(u64::from_str(digits)?)
    }

    fn normalise(index: u64) -> anyhow::Result<u32> {
        let index = if index >= HARDENED_OFFSET {
            index - HARDENED_OFFSET
        } else {
            index
        };
        u32::try_from(index).map_err(|_| anyhow!("derivation index out of range: {}", index))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}H/{}H", self.account_index, self.address_index)
    }
}

impl FromStr for DerivationPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(account), Some(address), None) => Ok(Self {
                account_index: Self::parse_index(account)?,
                address_index: Self::parse_index(address)?,
            }),
            _ => Err(anyhow!("can't parse derivation path: {:?}", s)),
        }
    }
}

/// Address to derivation path lookup, seeded from the wallet store and grown
/// with every path learned from address inspection.
#[derive(Default)]
pub struct DerivationIndexTable {
    paths: HashMap<String, DerivationPath>,
    hits: u64,
}

impl DerivationIndexTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, DerivationPath)>) -> Self {
        Self {
            paths: entries.into_iter().collect(),
            hits: 0,
        }
    }

    pub fn lookup(&mut self, address: &str) -> Option<DerivationPath> {
        let found = self.paths.get(address).copied();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    pub fn insert(&mut self, address: String, path: DerivationPath) {
        self.paths.insert(address, path);
    }

    /// Adds entries from a fresh wallet-store read. Known addresses keep their path.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = (String, DerivationPath)>) {
        for (address, path) in entries {
            self.paths.entry(address).or_insert(path);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
