use crate::collaborators::AddressFactory;
use crate::config::WalletConfig;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct NetworkInformation {
    pub sync_progress: SyncProgress,
    pub node_tip: NodeTip,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SyncProgress {
    pub status: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeTip {
    pub height: Quantity,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Quantity {
    pub quantity: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WalletInfo {
    pub state: WalletState,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WalletState {
    pub status: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewAddress {
    pub id: String,
    pub state: String,
}

/// cardano-wallet HTTP API, Byron wallet endpoints.
pub struct WalletApi {
    client: reqwest::Client,
    base: String,
    wallet_id: String,
    passphrase: String,
}

impl WalletApi {
    pub fn new(config: &WalletConfig, passphrase: String) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("can't build the wallet api client")?;
        Ok(Self {
            client,
            base: config.api_base(),
            wallet_id: config.id.clone(),
            passphrase,
        })
    }

    pub async fn network_information(&self) -> anyhow::Result<NetworkInformation> {
        self.get(&format!("{}/network/information", self.base)).await
    }

    pub async fn wallet_info(&self) -> anyhow::Result<WalletInfo> {
        self.get(&format!("{}/byron-wallets/{}", self.base, self.wallet_id))
            .await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> anyhow::Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Could not connect to endpoint: {}", url))?
            .error_for_status()
            .with_context(|| format!("The endpoint returned an unhealthy status: {}", url))?;
        response
            .json()
            .await
            .with_context(|| format!("Unexpected json returned from: {}", url))
    }
}

#[async_trait]
impl AddressFactory for WalletApi {
    async fn create_address(&self) -> anyhow::Result<String> {
        let url = format!("{}/byron-wallets/{}/addresses", self.base, self.wallet_id);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "passphrase": self.passphrase }))
            .send()
            .await
            .with_context(|| format!("Could not connect to endpoint: {}", url))?
            .error_for_status()
            .with_context(|| format!("The endpoint returned an unhealthy status: {}", url))?;
        let address: NewAddress = response
            .json()
            .await
            .with_context(|| format!("Unexpected new byron address json returned from: {}", url))?;
        check_new_address(address)
    }
}

fn check_new_address(address: NewAddress) -> anyhow::Result<String> {
    if address.state != "unused" {
        return Err(anyhow!(
            "the new byron address returned is not in state unused: {}",
            address.state
        ));
    }
    Ok(address.id)
}
