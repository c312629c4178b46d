use crate::error::{ComposeError, ComposeResult};
use crate::utxo::{InputSet, Utxo};
use itertools::Itertools;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Fewest inputs. Expects utxos sorted by value, descending.
    Min,
    /// Most small inputs. Expects utxos sorted by value, ascending.
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionAlgorithm {
    Simple,
    SlidingUtxo,
    SlidingWindow,
}

impl fmt::Display for SelectionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionAlgorithm::Simple => "simple",
            SelectionAlgorithm::SlidingUtxo => "sliding utxo",
            SelectionAlgorithm::SlidingWindow => "sliding window",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct Selection {
    pub inputs: InputSet,
    /// Distinct input addresses in first-seen order; one witness is needed per entry.
    pub witness_addresses: Vec<String>,
    pub algorithm: SelectionAlgorithm,
}

impl Selection {
    pub fn selected_utxos(&self) -> &[Utxo] {
        self.inputs.utxos()
    }
}

/// Picks inputs whose sum strictly exceeds `required_minimum`.
///
/// `required_minimum` already carries the fee padding. The order of `utxos`
/// is trusted as-is; selection never sorts.
pub fn select_inputs(
    utxos: &[Utxo],
    required_minimum: u64,
    max_inputs: usize,
    strategy: SelectionStrategy,
) -> ComposeResult<Selection> {
    let (inputs, algorithm) = match strategy {
        SelectionStrategy::Min => (
            select_min(utxos, required_minimum, max_inputs)?,
            SelectionAlgorithm::Simple,
        ),
        SelectionStrategy::Max => select_max(utxos, required_minimum, max_inputs)?,
    };

    let witness_addresses = inputs
        .utxos()
        .iter()
        .map(|utxo| utxo.address.clone())
        .unique()
        .collect();

    Ok(Selection {
        inputs,
        witness_addresses,
        algorithm,
    })
}

fn select_min(utxos: &[Utxo], required_minimum: u64, max_inputs: usize) -> ComposeResult<InputSet> {
    let mut inputs = InputSet::default();
    for utxo in utxos.iter() {
        if inputs.sum() > required_minimum {
            break;
        }
        inputs.push(utxo.clone());
        if inputs.count() > max_inputs {
            return Err(ComposeError::InputLimitExceeded {
                max_inputs,
                required: required_minimum,
            });
        }
    }

    if inputs.sum() <= required_minimum {
        return Err(ComposeError::InsufficientFunds {
            required: required_minimum,
            available: inputs.sum(),
            inputs: inputs.count(),
        });
    }

    Ok(inputs)
}

fn select_max(
    utxos: &[Utxo],
    required_minimum: u64,
    max_inputs: usize,
) -> ComposeResult<(InputSet, SelectionAlgorithm)> {
    let width = max_inputs.min(utxos.len());
    let amounts: Vec<u64> = utxos.iter().map(|utxo| utxo.value).collect();

    let (elements, algorithm) = match choose_elements(&amounts, width, required_minimum) {
        Some(found) => found,
        None => {
            let best: u64 = amounts[amounts.len() - width..].iter().sum();
            return Err(ComposeError::InsufficientFunds {
                required: required_minimum,
                available: best,
                inputs: width,
            });
        }
    };

    if elements.len() != width {
        return Err(ComposeError::InternalInconsistency(format!(
            "utxo element list has {} entries, expected {}",
            elements.len(),
            width
        )));
    }

    let mut inputs = InputSet::default();
    for element in elements.into_iter().take(max_inputs) {
        inputs.push(utxos[element].clone());
    }

    if inputs.sum() <= required_minimum {
        return Err(ComposeError::InternalInconsistency(format!(
            "selected inputs sum to {} lovelace at {} inputs, required more than {}",
            inputs.sum(),
            inputs.count(),
            required_minimum
        )));
    }

    Ok((inputs, algorithm))
}

/// Returns element indices into the ascending `amounts`.
fn choose_elements(
    amounts: &[u64],
    width: usize,
    required_minimum: u64,
) -> Option<(Vec<usize>, SelectionAlgorithm)> {
    if width == 0 {
        return None;
    }

    let smallest: u64 = amounts[..width].iter().sum();
    if smallest > required_minimum {
        return Some(((0..width).collect(), SelectionAlgorithm::Simple));
    }

    // keep width - 1 smallest, swap the last slot for one larger utxo
    let base: u64 = amounts[..width - 1].iter().sum();
    if let Some(position) = (width..amounts.len()).find(|p| base + amounts[*p] > required_minimum)
    {
        let mut elements: Vec<usize> = (0..width - 1).collect();
        elements.push(position);
        return Some((elements, SelectionAlgorithm::SlidingUtxo));
    }

    amounts
        .windows(width)
        .position(|window| window.iter().sum::<u64>() > required_minimum)
        .map(|offset| {
            (
                (offset..offset + width).collect(),
                SelectionAlgorithm::SlidingWindow,
            )
        })
}
