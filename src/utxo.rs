use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Utxo {
    /// `tx_hash#tx_ix`
    pub id: String,
    #[serde(rename = "lovelace")]
    pub value: u64,
    pub address: String,
}

impl Utxo {
    pub fn new(id: impl Into<String>, value: u64, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value,
            address: address.into(),
        }
    }
}

/// Largest value first, ties broken by id (descending). Fragmentation order.
pub fn sort_descending(utxos: &mut [Utxo]) {
    utxos.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| b.id.cmp(&a.id)));
}

/// Smallest value first. Defragmentation order.
pub fn sort_ascending(utxos: &mut [Utxo]) {
    utxos.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.id.cmp(&b.id)));
}

pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos.iter().map(|utxo| utxo.value).sum()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputSet {
    utxos: Vec<Utxo>,
    sum: u64,
}

impl InputSet {
    pub fn push(&mut self, utxo: Utxo) {
        self.sum += utxo.value;
        self.utxos.push(utxo);
    }

    pub fn count(&self) -> usize {
        self.utxos.len()
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.utxos.iter().map(|utxo| utxo.id.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputSet {
    outputs: Vec<TxOut>,
}

impl OutputSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_outputs(outputs: Vec<TxOut>) -> Self {
        Self { outputs }
    }

    pub fn count(&self) -> usize {
        self.outputs.len()
    }

    pub fn sum(&self) -> u64 {
        self.outputs.iter().map(|output| output.amount).sum()
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    #[serde(rename = "minUTxOValue")]
    pub min_utxo_value: u64,
    /// The full parameter document, handed back verbatim to the fee oracle.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl ProtocolParameters {
    pub fn from_json(raw: serde_json::Value) -> anyhow::Result<Self> {
        let mut params: ProtocolParameters = serde_json::from_value(raw.clone())?;
        params.raw = raw;
        Ok(params)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    #[serde(alias = "slotNo")]
    pub slot: u64,
    #[serde(alias = "blockNo")]
    pub block: u64,
}

#[cfg(test)]
mod tests {
    use crate::utxo::{
        sort_ascending, sort_descending, total_value, ChainTip, InputSet, OutputSet,
        ProtocolParameters, TxOut, Utxo,
    };

    fn utxos() -> Vec<Utxo> {
        vec![
            Utxo::new("aa#0", 30, "addr1"),
            Utxo::new("bb#1", 10, "addr2"),
            Utxo::new("cc#0", 30, "addr1"),
            Utxo::new("dd#4", 50, "addr3"),
        ]
    }

    #[test]
    fn descending_sort_breaks_ties_by_id() {
        let mut utxos = utxos();
        sort_descending(&mut utxos);
        let ids: Vec<_> = utxos.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["dd#4", "cc#0", "aa#0", "bb#1"]);
    }

    #[test]
    fn ascending_sort() {
        let mut utxos = utxos();
        sort_ascending(&mut utxos);
        let values: Vec<_> = utxos.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![10, 30, 30, 50]);
        assert_eq!(total_value(&utxos), 120);
    }

    #[test]
    fn input_set_tracks_sum() {
        let mut set = InputSet::default();
        for utxo in utxos() {
            set.push(utxo);
        }
        assert_eq!(set.count(), 4);
        assert_eq!(set.sum(), 120);
        assert_eq!(set.ids().next(), Some("aa#0"));
    }

    #[test]
    fn output_set_sum() {
        let outputs = OutputSet::from_outputs(vec![TxOut::new("a", 5), TxOut::new("b", 7)]);
        assert_eq!(outputs.count(), 2);
        assert_eq!(outputs.sum(), 12);
        assert_eq!(OutputSet::empty().sum(), 0);
    }

    #[test]
    fn tip_accepts_both_node_formats() {
        let new: ChainTip =
            serde_json::from_str(r#"{"slot": 100, "block": 7, "epoch": 2, "hash": "ab"}"#).unwrap();
        let old: ChainTip =
            serde_json::from_str(r#"{"slotNo": 100, "blockNo": 7, "headHash": "ab"}"#).unwrap();
        assert_eq!(new, old);
    }

    #[test]
    fn protocol_parameters_keep_raw_document() {
        let raw = serde_json::json!({"minUTxOValue": 1000000, "txFeePerByte": 44});
        let params = ProtocolParameters::from_json(raw.clone()).unwrap();
        assert_eq!(params.min_utxo_value, 1_000_000);
        assert_eq!(params.raw, raw);
    }
}
