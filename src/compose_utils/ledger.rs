use crate::compose_utils::input_filter::InputFilter;
use crate::error::{ComposeError, ComposeResult};
use crate::utxo::{total_value, Utxo};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerState {
    Seeded,
    Filtered,
    Active,
    Exhausted,
}

/// Utxos still spendable during the current run.
///
/// The seeding order is kept through every mutation, so a source sorted for
/// the active selection strategy stays sorted.
pub struct RuntimeLedger {
    utxos: Vec<Utxo>,
    state: LedgerState,
}

impl RuntimeLedger {
    pub fn seed(utxos: Vec<Utxo>) -> Self {
        Self {
            utxos,
            state: LedgerState::Seeded,
        }
    }

    pub fn state(&self) -> LedgerState {
        self.state
    }

    pub fn available(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn total_value(&self) -> u64 {
        total_value(&self.utxos)
    }

    /// One-time removal of every utxo the filter matches. Returns the number removed.
    pub fn apply_filter(&mut self, filter: &InputFilter) -> ComposeResult<usize> {
        if self.state != LedgerState::Seeded {
            return Err(ComposeError::InternalInconsistency(format!(
                "input filter applied to a ledger in state {:?}",
                self.state
            )));
        }
        let before = self.utxos.len();
        self.utxos.retain(|utxo| !filter.matches(utxo));
        self.state = LedgerState::Filtered;
        Ok(before - self.utxos.len())
    }

    /// Checks the remaining utxo count against the operation minimum before an iteration.
    /// Returns `false` once the ledger is exhausted.
    pub fn activate(&mut self, minimum: usize) -> bool {
        if self.state == LedgerState::Exhausted {
            return false;
        }
        if self.utxos.len() < minimum {
            self.state = LedgerState::Exhausted;
            return false;
        }
        self.state = LedgerState::Active;
        true
    }

    /// Removes the inputs of a completed transaction.
    pub fn consume(&mut self, selected: &[Utxo]) -> ComposeResult<()> {
        let present: HashSet<&str> = self.utxos.iter().map(|utxo| utxo.id.as_str()).collect();
        if let Some(missing) = selected
            .iter()
            .find(|utxo| !present.contains(utxo.id.as_str()))
        {
            return Err(ComposeError::UtxoNotInLedger {
                id: missing.id.clone(),
            });
        }

        let consumed: HashSet<&str> = selected.iter().map(|utxo| utxo.id.as_str()).collect();
        self.utxos.retain(|utxo| !consumed.contains(utxo.id.as_str()));
        Ok(())
    }

    /// Drops utxos that no longer appear in the authoritative source. Never adds.
    pub fn purge_missing(&mut self, authoritative: &[Utxo]) -> Vec<Utxo> {
        let current: HashSet<&Utxo> = authoritative.iter().collect();
        let (kept, purged): (Vec<Utxo>, Vec<Utxo>) = std::mem::take(&mut self.utxos)
            .into_iter()
            .partition(|utxo| current.contains(utxo));
        self.utxos = kept;
        purged
    }
}
