use crate::collaborators::{TransactionToolchain, TxBody};
use crate::error::{ComposeError, ComposeResult};
use crate::utxo::{InputSet, OutputSet, ProtocolParameters, TxOut};

pub const MAX_FEE_ATTEMPTS: usize = 10;

/// Transaction body handed to the toolchain for drafting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxDraft {
    /// `tx_hash#tx_ix`
    pub inputs: Vec<String>,
    pub outputs: Vec<TxOut>,
    pub change: TxOut,
    pub ttl: u64,
    pub fee: u64,
}

/// Size-relevant counts the fee oracle prices a draft by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxShape {
    pub input_count: usize,
    /// Includes the change output.
    pub output_count: usize,
    pub witness_count: usize,
}

impl TxShape {
    pub fn of(inputs: &InputSet, outputs: &OutputSet) -> Self {
        Self {
            input_count: inputs.count(),
            output_count: outputs.count() + 1,
            witness_count: inputs.count(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StableFee {
    pub fee: u64,
    pub change: u64,
    pub body: TxBody,
    pub attempts: usize,
}

/// Iterates draft and fee query until the fee written into the draft equals
/// the fee the oracle asks for that draft.
pub async fn stabilize_fee(
    toolchain: &dyn TransactionToolchain,
    inputs: &InputSet,
    outputs: &OutputSet,
    change_address: &str,
    ttl: u64,
    params: &ProtocolParameters,
) -> ComposeResult<StableFee> {
    let shape = TxShape::of(inputs, outputs);
    let input_ids: Vec<String> = inputs.ids().map(str::to_string).collect();

    let mut last_fee = 0u64;
    for attempt in 1..=MAX_FEE_ATTEMPTS {
        let fee = last_fee;
        let change = change_for(inputs, outputs, fee)?;
        let draft = TxDraft {
            inputs: input_ids.clone(),
            outputs: outputs.outputs().to_vec(),
            change: TxOut::new(change_address, change),
            ttl,
            fee,
        };
        let body = toolchain.build_draft(&draft).await?;
        last_fee = toolchain.min_fee(&body, shape, params).await?;
        tracing::debug!(attempt, fee, last_fee, "fee estimation");

        if fee == last_fee {
            return Ok(StableFee {
                fee,
                change,
                body,
                attempts: attempt,
            });
        }
    }

    Err(ComposeError::FeeNotConverged {
        attempts: MAX_FEE_ATTEMPTS,
    })
}

fn change_for(inputs: &InputSet, outputs: &OutputSet, fee: u64) -> ComposeResult<u64> {
    let required = outputs.sum().saturating_add(fee);
    inputs
        .sum()
        .checked_sub(required)
        .ok_or(ComposeError::InsufficientFunds {
            required,
            available: inputs.sum(),
            inputs: inputs.count(),
        })
}

#[cfg(test)]
mod tests {
    use crate::collaborators::{SignedTx, TextEnvelope, TransactionToolchain, TxBody};
    use crate::compose_utils::fee_stabilizer::{
        stabilize_fee, TxDraft, TxShape, MAX_FEE_ATTEMPTS,
    };
    use crate::compose_utils::witness_cache::Witness;
    use crate::error::ComposeError;
    use crate::utxo::{InputSet, OutputSet, ProtocolParameters, TxOut, Utxo};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fee oracle driven by a closure over the drafted fee.
    struct FeeOracle<F: Fn(u64, TxShape) -> u64 + Send + Sync> {
        price: F,
        drafts: Mutex<Vec<TxDraft>>,
    }

    impl<F: Fn(u64, TxShape) -> u64 + Send + Sync> FeeOracle<F> {
        fn new(price: F) -> Self {
            Self {
                price,
                drafts: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl<F: Fn(u64, TxShape) -> u64 + Send + Sync> TransactionToolchain for FeeOracle<F> {
        async fn build_draft(&self, draft: &TxDraft) -> anyhow::Result<TxBody> {
            self.drafts.lock().unwrap().push(draft.clone());
            Ok(TxBody(TextEnvelope {
                kind: "TxBodyMary".to_string(),
                description: String::new(),
                cbor_hex: draft.fee.to_string(),
            }))
        }

        async fn min_fee(
            &self,
            body: &TxBody,
            shape: TxShape,
            _params: &ProtocolParameters,
        ) -> anyhow::Result<u64> {
            Ok((self.price)(body.0.cbor_hex.parse()?, shape))
        }

        async fn sign(&self, _body: &TxBody, _witnesses: &[Witness]) -> anyhow::Result<SignedTx> {
            unreachable!()
        }

        async fn tx_id(&self, _signed: &SignedTx) -> anyhow::Result<String> {
            unreachable!()
        }

        async fn submit(&self, _signed: &SignedTx) -> anyhow::Result<()> {
            unreachable!()
        }
    }

    fn inputs(values: &[u64]) -> InputSet {
        let mut set = InputSet::default();
        for (index, value) in values.iter().enumerate() {
            set.push(Utxo::new(format!("tx{index}#0"), *value, "addr"));
        }
        set
    }

    fn params() -> ProtocolParameters {
        ProtocolParameters::from_json(serde_json::json!({"minUTxOValue": 1000000})).unwrap()
    }

    #[tokio::test]
    async fn constant_fee_converges_in_two_attempts() {
        let oracle = FeeOracle::new(|_, _| 170_000);
        let outputs = OutputSet::from_outputs(vec![TxOut::new("out", 5_000_000)]);
        let stable = stabilize_fee(&oracle, &inputs(&[10_000_000]), &outputs, "change", 500, &params())
            .await
            .unwrap();
        assert_eq!(stable.attempts, 2);
        assert_eq!(stable.fee, 170_000);
        assert_eq!(stable.change, 10_000_000 - 5_000_000 - 170_000);

        let drafts = oracle.drafts.lock().unwrap();
        assert_eq!(drafts[0].fee, 0);
        assert_eq!(drafts[0].change.amount, 5_000_000);
        assert_eq!(drafts[1].fee, 170_000);
        assert_eq!(drafts[1].change, TxOut::new("change", 4_830_000));
        assert_eq!(drafts[1].ttl, 500);
        assert_eq!(drafts[1].inputs, vec!["tx0#0".to_string()]);
    }

    #[tokio::test]
    async fn size_dependent_fee_reaches_fixed_point() {
        // larger written fee encodes longer
        let oracle = FeeOracle::new(|fee, _| if fee >= 100_000 { 168_000 } else { 165_000 });
        let stable = stabilize_fee(&oracle, &inputs(&[9_000_000]), &OutputSet::empty(), "change", 1, &params())
            .await
            .unwrap();
        assert_eq!(stable.fee, 168_000);
        assert_eq!(stable.attempts, 3);
        assert_eq!(stable.change, 9_000_000 - 168_000);
    }

    #[tokio::test]
    async fn oscillating_fee_is_fatal() {
        let oracle = FeeOracle::new(|fee, _| if fee == 200_000 { 100_000 } else { 200_000 });
        let err = stabilize_fee(&oracle, &inputs(&[9_000_000]), &OutputSet::empty(), "change", 1, &params())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::FeeNotConverged { attempts } if attempts == MAX_FEE_ATTEMPTS
        ));
        assert_eq!(oracle.drafts.lock().unwrap().len(), MAX_FEE_ATTEMPTS);
    }

    #[tokio::test]
    async fn fee_above_change_is_insufficient_funds() {
        let oracle = FeeOracle::new(|_, _| 2_000_000);
        let outputs = OutputSet::from_outputs(vec![TxOut::new("out", 4_000_000)]);
        let err = stabilize_fee(&oracle, &inputs(&[5_000_000]), &outputs, "change", 1, &params())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::InsufficientFunds {
                required: 6_000_000,
                available: 5_000_000,
                inputs: 1
            }
        ));
    }

    #[tokio::test]
    async fn shape_counts_change_and_witnesses() {
        let oracle = FeeOracle::new(|_, shape| {
            (shape.input_count * 1000 + shape.output_count * 10 + shape.witness_count) as u64
        });
        let outputs = OutputSet::from_outputs(vec![TxOut::new("a", 1), TxOut::new("b", 1)]);
        let stable = stabilize_fee(&oracle, &inputs(&[5_000, 5_000]), &outputs, "change", 1, &params())
            .await
            .unwrap();
        assert_eq!(stable.fee, 2 * 1000 + 3 * 10 + 2);
    }
}
