use crate::collaborators::tool_command::{Scratch, ToolCommand};
use crate::collaborators::{
    ChainSource, ExtendedKey, SignedTx, SigningKey, TextEnvelope, TransactionToolchain, TxBody,
};
use crate::compose_utils::fee_stabilizer::{TxDraft, TxShape};
use crate::compose_utils::witness_cache::Witness;
use crate::config::NetworkSettings;
use crate::utxo::{ChainTip, ProtocolParameters, Utxo};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::path::PathBuf;
use std::str::FromStr;

/// `cardano-cli` as chain source, fee oracle and signer.
#[derive(Clone, Debug)]
pub struct CardanoCli {
    binary: String,
    network: NetworkSettings,
    socket_path: Option<PathBuf>,
}

impl CardanoCli {
    pub fn new(binary: impl Into<String>, network: NetworkSettings, socket_path: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            network,
            socket_path,
        }
    }

    fn command(&self) -> ToolCommand {
        let command = ToolCommand::new(&self.binary);
        match &self.socket_path {
            Some(path) => command.env("CARDANO_NODE_SOCKET_PATH", path),
            None => command,
        }
    }

    /// Byron extended child key to a cardano-cli signing key.
    pub async fn convert_byron_key(&self, child_private: &ExtendedKey) -> anyhow::Result<SigningKey> {
        let scratch = Scratch::new()?;
        let input = scratch.write("child.xsk", child_private.as_str())?;
        let output = scratch.path("child.skey");
        self.command()
            .args(["key", "convert-cardano-address-key", "--byron-payment-key"])
            .arg("--signing-key-file")
            .arg(&input)
            .arg("--out-file")
            .arg(&output)
            .sensitive()
            .run()
            .await?;
        let envelope = parse_envelope(&scratch.read("child.skey")?)?;
        Ok(SigningKey(envelope))
    }

    pub async fn verification_key(&self, signing_key: &SigningKey) -> anyhow::Result<TextEnvelope> {
        let scratch = Scratch::new()?;
        let input = scratch.write("key.skey", &serde_json::to_string(&signing_key.0)?)?;
        let output = scratch.path("key.vkey");
        self.command()
            .args(["key", "verification-key", "--signing-key-file"])
            .arg(&input)
            .arg("--verification-key-file")
            .arg(&output)
            .sensitive()
            .run()
            .await?;
        parse_envelope(&scratch.read("key.vkey")?)
    }
}

#[async_trait]
impl ChainSource for CardanoCli {
    async fn query_utxos(&self, address: &str) -> anyhow::Result<Vec<Utxo>> {
        let scratch = Scratch::new()?;
        let output = scratch.path("utxo.json");
        self.command()
            .args(["query", "utxo"])
            .args(self.network.node_args())
            .args(["--address", address])
            .arg("--out-file")
            .arg(&output)
            .run()
            .await?;
        parse_utxo_query(&scratch.read("utxo.json")?)
    }

    async fn protocol_parameters(&self) -> anyhow::Result<ProtocolParameters> {
        let scratch = Scratch::new()?;
        let output = scratch.path("protocol.json");
        self.command()
            .args(["query", "protocol-parameters"])
            .args(self.network.node_args())
            .arg("--out-file")
            .arg(&output)
            .run()
            .await?;
        let raw: serde_json::Value = serde_json::from_str(&scratch.read("protocol.json")?)
            .context("invalid json returned when parsing cardano-cli protocol parameters")?;
        ProtocolParameters::from_json(raw)
    }

    async fn tip(&self) -> anyhow::Result<ChainTip> {
        let out = self
            .command()
            .args(["query", "tip"])
            .args(self.network.node_args())
            .run()
            .await?;
        parse_tip(&out)
    }
}

#[async_trait]
impl TransactionToolchain for CardanoCli {
    async fn build_draft(&self, draft: &TxDraft) -> anyhow::Result<TxBody> {
        let scratch = Scratch::new()?;
        let output = scratch.path("tx.draft");
        self.command()
            .args(["transaction", "build-raw"])
            .args(build_raw_args(draft))
            .arg("--out-file")
            .arg(&output)
            .run()
            .await?;
        Ok(TxBody(parse_envelope(&scratch.read("tx.draft")?)?))
    }

    async fn min_fee(
        &self,
        body: &TxBody,
        shape: TxShape,
        params: &ProtocolParameters,
    ) -> anyhow::Result<u64> {
        let scratch = Scratch::new()?;
        let body_file = scratch.write("tx.draft", &serde_json::to_string(&body.0)?)?;
        let params_file = scratch.write("protocol.json", &serde_json::to_string(&params.raw)?)?;
        let out = self
            .command()
            .args(["transaction", "calculate-min-fee", "--tx-body-file"])
            .arg(&body_file)
            .args(self.network.node_args())
            .arg("--protocol-params-file")
            .arg(&params_file)
            .args(["--tx-in-count", shape.input_count.to_string().as_str()])
            .args(["--tx-out-count", shape.output_count.to_string().as_str()])
            .args(["--witness-count", shape.witness_count.to_string().as_str()])
            .args(["--byron-witness-count", "0"])
            .run()
            .await?;
        parse_min_fee(&out)
    }

    async fn sign(&self, body: &TxBody, witnesses: &[Witness]) -> anyhow::Result<SignedTx> {
        let scratch = Scratch::new()?;
        let body_file = scratch.write("tx.draft", &serde_json::to_string(&body.0)?)?;
        let mut command = self
            .command()
            .args(["transaction", "sign", "--tx-body-file"])
            .arg(&body_file);
        for (index, witness) in witnesses.iter().enumerate() {
            let key_file = scratch.write(
                &format!("witness{index}.skey"),
                &serde_json::to_string(&witness.signing_key.0)?,
            )?;
            command = command
                .arg("--signing-key-file")
                .arg(&key_file)
                .args(["--address", witness.address.as_str()]);
        }
        let output = scratch.path("tx.signed");
        command
            .args(self.network.sign_args())
            .arg("--out-file")
            .arg(&output)
            .sensitive()
            .run()
            .await?;
        Ok(SignedTx(parse_envelope(&scratch.read("tx.signed")?)?))
    }

    async fn tx_id(&self, signed: &SignedTx) -> anyhow::Result<String> {
        let scratch = Scratch::new()?;
        let tx_file = scratch.write("tx.signed", &serde_json::to_string(&signed.0)?)?;
        let out = self
            .command()
            .args(["transaction", "txid", "--tx-file"])
            .arg(&tx_file)
            .run()
            .await?;
        Ok(out.trim().to_string())
    }

    async fn submit(&self, signed: &SignedTx) -> anyhow::Result<()> {
        let scratch = Scratch::new()?;
        let tx_file = scratch.write("tx.signed", &serde_json::to_string(&signed.0)?)?;
        self.command()
            .args(["transaction", "submit", "--tx-file"])
            .arg(&tx_file)
            .args(self.network.node_args())
            .run()
            .await?;
        Ok(())
    }
}

pub fn build_raw_args(draft: &TxDraft) -> Vec<String> {
    let mut args = vec![];
    for input in draft.inputs.iter() {
        args.push("--tx-in".to_string());
        args.push(input.clone());
    }
    for output in draft.outputs.iter().chain(std::iter::once(&draft.change)) {
        args.push("--tx-out".to_string());
        args.push(format!("{}+{}", output.address, output.amount));
    }
    args.extend([
        "--ttl".to_string(),
        draft.ttl.to_string(),
        "--fee".to_string(),
        draft.fee.to_string(),
    ]);
    args
}

pub fn parse_envelope(text: &str) -> anyhow::Result<TextEnvelope> {
    serde_json::from_str(text).context("invalid text envelope returned by cardano-cli")
}

/// Lovelace-only entries of a `query utxo` result, in either node output format.
pub fn parse_utxo_query(text: &str) -> anyhow::Result<Vec<Utxo>> {
    let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)
        .context("invalid json returned when querying address utxo")?;

    let mut utxos = vec![];
    for (id, entry) in entries.iter() {
        let address = entry
            .get("address")
            .and_then(|address| address.as_str())
            .ok_or_else(|| anyhow!("utxo {} has no address", id))?;
        let lovelace = if let Some(value) = entry.get("value") {
            let value = value
                .as_object()
                .ok_or_else(|| anyhow!("utxo {} value is not an object", id))?;
            match (value.len(), value.get("lovelace")) {
                (1, Some(lovelace)) => lovelace.as_u64(),
                _ => None,
            }
        } else if let Some(amount) = entry.get("amount") {
            match amount.as_array().map(|amount| amount.as_slice()) {
                Some([lovelace, assets])
                    if assets.as_array().map(|a| a.is_empty()).unwrap_or(false) =>
                {
                    lovelace.as_u64()
                }
                Some([_, _]) => None,
                _ => return Err(anyhow!("unable to parse utxo {} amount", id)),
            }
        } else {
            return Err(anyhow!("unable to parse the cardano cli utxo entry {}", id));
        };

        if let Some(lovelace) = lovelace {
            utxos.push(Utxo::new(id.clone(), lovelace, address));
        }
    }
    Ok(utxos)
}

pub fn parse_tip(text: &str) -> anyhow::Result<ChainTip> {
    serde_json::from_str(text).context("unable to obtain the current node slot and block from the tip")
}

/// `"<n> Lovelace"` output of `calculate-min-fee`.
pub fn parse_min_fee(text: &str) -> anyhow::Result<u64> {
    if !text.contains("Lovelace") {
        return Err(anyhow!(
            "the fee calculation did not return a response containing \"Lovelace\": {}",
            text.trim()
        ));
    }
    let fee = text.split_whitespace().next().unwrap_or_default();
    let fee = u64::from_str(fee)
        .with_context(|| format!("the fee calculation returned a value that is not an integer: {}", fee))?;
    if fee < 1 {
        return Err(anyhow!(
            "the fee calculation returned a fee of less than 1 lovelace: {}",
            fee
        ));
    }
    Ok(fee)
}

#[cfg(test)]
mod tests {
    use crate::collaborators::cardano_cli::{
        build_raw_args, parse_min_fee, parse_tip, parse_utxo_query,
    };
    use crate::compose_utils::fee_stabilizer::TxDraft;
    use crate::utxo::{ChainTip, TxOut, Utxo};

    #[test]
    fn utxo_query_value_format() {
        let text = r#"{
            "a1#0": {"address": "DdzFF1", "value": {"lovelace": 5000000}},
            "b2#1": {"address": "DdzFF2", "value": {"lovelace": 2000000, "abcd": {"token": 1}}},
            "c3#2": {"address": "DdzFF1", "value": {"lovelace": 1500000}}
        }"#;
        let mut utxos = parse_utxo_query(text).unwrap();
        utxos.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(
            utxos,
            vec![
                Utxo::new("a1#0", 5_000_000, "DdzFF1"),
                Utxo::new("c3#2", 1_500_000, "DdzFF1"),
            ]
        );
    }

    #[test]
    fn utxo_query_amount_format() {
        let text = r#"{
            "a1#0": {"address": "DdzFF1", "amount": [5000000, []]},
            "b2#1": {"address": "DdzFF2", "amount": [2000000, [["abcd", [["token", 1]]]]]}
        }"#;
        let utxos = parse_utxo_query(text).unwrap();
        assert_eq!(utxos, vec![Utxo::new("a1#0", 5_000_000, "DdzFF1")]);
    }

    #[test]
    fn utxo_query_edge_cases() {
        assert!(parse_utxo_query("{}").unwrap().is_empty());
        assert!(parse_utxo_query("[]").is_err());
        assert!(parse_utxo_query(r#"{"a#0": {"address": "x", "coins": 5}}"#).is_err());
        assert!(parse_utxo_query(r#"{"a#0": {"value": {"lovelace": 5}}}"#).is_err());
    }

    #[test]
    fn tip_formats() {
        let tip = parse_tip(r#"{"epoch": 259, "hash": "ab", "slot": 26633911, "block": 5580350, "era": "Mary"}"#)
            .unwrap();
        assert_eq!(tip, ChainTip { slot: 26_633_911, block: 5_580_350 });
        let tip = parse_tip(r#"{"blockNo": 5580350, "headHash": "ab", "slotNo": 26633911}"#).unwrap();
        assert_eq!(tip.slot, 26_633_911);
        assert!(parse_tip(r#"{"hash": "ab"}"#).is_err());
    }

    #[test]
    fn min_fee_text() {
        assert_eq!(parse_min_fee("174169 Lovelace\n").unwrap(), 174_169);
        assert!(parse_min_fee("174169\n").is_err());
        assert!(parse_min_fee("0 Lovelace").is_err());
        assert!(parse_min_fee("many Lovelace").is_err());
    }

    #[test]
    fn build_raw_arguments() {
        let draft = TxDraft {
            inputs: vec!["aa#0".to_string(), "bb#3".to_string()],
            outputs: vec![TxOut::new("out1", 1_000_000)],
            change: TxOut::new("change", 42),
            ttl: 1_300,
            fee: 170_000,
        };
        assert_eq!(
            build_raw_args(&draft),
            vec![
                "--tx-in", "aa#0", "--tx-in", "bb#3", "--tx-out", "out1+1000000", "--tx-out",
                "change+42", "--ttl", "1300", "--fee", "170000",
            ]
        );
    }
}
