use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("not enough input UTxOs to meet the required minimum: required {required} lovelace, available {available} lovelace at {inputs} inputs")]
    InsufficientFunds {
        required: u64,
        available: u64,
        inputs: usize,
    },

    #[error("more than {max_inputs} input UTxOs would be required to meet {required} lovelace")]
    InputLimitExceeded { max_inputs: usize, required: u64 },

    #[error("selected utxo {id} is not present in the runtime ledger")]
    UtxoNotInLedger { id: String },

    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("unable to obtain a stable fee calculation after {attempts} attempts")]
    FeeNotConverged { attempts: usize },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl ComposeError {
    /// Errors an operator can act on by re-running with different parameters.
    pub fn is_operator_recoverable(&self) -> bool {
        matches!(
            self,
            ComposeError::InsufficientFunds { .. }
                | ComposeError::InputLimitExceeded { .. }
                | ComposeError::FeeNotConverged { .. }
        )
    }
}

pub type ComposeResult<T> = Result<T, ComposeError>;
