use crate::collaborators::cardano_cli::CardanoCli;
use crate::collaborators::tool_command::ToolCommand;
use crate::collaborators::{AddressInspector, ExtendedKey, KeyDeriver, SigningKey, TextEnvelope};
use crate::compose_utils::derivation_mapper::{DerivationPath, BOOTSTRAP_PATH};
use crate::config::NetworkSettings;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

/// `cardano-address` key and address operations.
#[derive(Clone, Debug)]
pub struct CardanoAddress {
    binary: String,
}

impl CardanoAddress {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub async fn root_from_mnemonics(&self, mnemonics: &str) -> anyhow::Result<ExtendedKey> {
        let out = ToolCommand::new(&self.binary)
            .args(["key", "from-recovery-phrase", "Byron"])
            .stdin(mnemonics)
            .sensitive()
            .run()
            .await?;
        Ok(ExtendedKey::new(out))
    }

    pub async fn public_key(&self, private: &ExtendedKey) -> anyhow::Result<ExtendedKey> {
        let out = ToolCommand::new(&self.binary)
            .args(["key", "public", "--with-chain-code"])
            .stdin(private.as_str())
            .sensitive()
            .run()
            .await?;
        Ok(ExtendedKey::new(out))
    }

    pub async fn child_key(
        &self,
        private: &ExtendedKey,
        path: DerivationPath,
    ) -> anyhow::Result<ExtendedKey> {
        let out = ToolCommand::new(&self.binary)
            .args(["key", "child", path.to_string().as_str()])
            .stdin(private.as_str())
            .sensitive()
            .run()
            .await?;
        Ok(ExtendedKey::new(out))
    }

    pub async fn bootstrap_address(
        &self,
        root_public: &ExtendedKey,
        network_tag: &str,
        path: DerivationPath,
        child_public: &ExtendedKey,
    ) -> anyhow::Result<String> {
        let out = ToolCommand::new(&self.binary)
            .args(["address", "bootstrap", "--root", root_public.as_str()])
            .args(["--network-tag", network_tag, path.to_string().as_str()])
            .stdin(child_public.as_str())
            .run()
            .await?;
        Ok(out.trim().to_string())
    }

    pub async fn inspect_address(
        &self,
        root_public: &ExtendedKey,
        address: &str,
    ) -> anyhow::Result<DerivationPath> {
        let out = ToolCommand::new(&self.binary)
            .args(["address", "inspect", "--root", root_public.as_str()])
            .stdin(address)
            .run()
            .await?;
        parse_inspection(&out)
    }
}

#[derive(Deserialize)]
struct Inspection {
    derivation_path: InspectedPath,
}

#[derive(Deserialize)]
struct InspectedPath {
    account_index: String,
    address_index: String,
}

pub fn parse_inspection(text: &str) -> anyhow::Result<DerivationPath> {
    let inspection: Inspection = serde_json::from_str(text)
        .context("invalid json returned when inspecting a cardano address")?;
    Ok(DerivationPath::new(
        DerivationPath::parse_index(&inspection.derivation_path.account_index)?,
        DerivationPath::parse_index(&inspection.derivation_path.address_index)?,
    ))
}

/// Keys of the operator's bootstrap address, derived from the recovery phrase.
pub struct BootstrapKeys {
    pub root_private: ExtendedKey,
    pub root_public: ExtendedKey,
    pub address: String,
    pub signing_key: SigningKey,
    pub verification_key: TextEnvelope,
}

pub async fn prepare_bootstrap(
    address_tool: &CardanoAddress,
    cli: &CardanoCli,
    mnemonics: &str,
    network: &NetworkSettings,
) -> anyhow::Result<BootstrapKeys> {
    let root_private = address_tool
        .root_from_mnemonics(mnemonics)
        .await
        .context("can't derive the root key from the recovery phrase")?;
    let root_public = address_tool.public_key(&root_private).await?;
    let child_private = address_tool.child_key(&root_private, BOOTSTRAP_PATH).await?;
    let child_public = address_tool.public_key(&child_private).await?;
    let address = address_tool
        .bootstrap_address(
            &root_public,
            &network.address_network_tag(),
            BOOTSTRAP_PATH,
            &child_public,
        )
        .await?;
    let signing_key = cli.convert_byron_key(&child_private).await?;
    let verification_key = cli.verification_key(&signing_key).await?;

    Ok(BootstrapKeys {
        root_private,
        root_public,
        address,
        signing_key,
        verification_key,
    })
}

/// Derives signing keys for wallet addresses from the root keys.
pub struct WalletKeys {
    address_tool: CardanoAddress,
    cli: CardanoCli,
    root_private: ExtendedKey,
    root_public: ExtendedKey,
}

impl WalletKeys {
    pub fn new(address_tool: CardanoAddress, cli: CardanoCli, bootstrap: &BootstrapKeys) -> Self {
        Self {
            address_tool,
            cli,
            root_private: bootstrap.root_private.clone(),
            root_public: bootstrap.root_public.clone(),
        }
    }
}

#[async_trait]
impl AddressInspector for WalletKeys {
    async fn inspect(&self, address: &str) -> anyhow::Result<DerivationPath> {
        self.address_tool
            .inspect_address(&self.root_public, address)
            .await
    }
}

#[async_trait]
impl KeyDeriver for WalletKeys {
    async fn derive_signing_key(&self, path: DerivationPath) -> anyhow::Result<SigningKey> {
        let child = self.address_tool.child_key(&self.root_private, path).await?;
        self.cli.convert_byron_key(&child).await
    }
}
