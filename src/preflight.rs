use crate::collaborators::wallet_api::{NetworkInformation, WalletApi, WalletInfo};
use crate::collaborators::ChainSource;
use crate::config::WALLET_TO_NODE_HEIGHT_TOLERANCE;
use crate::utxo::ChainTip;
use anyhow::{anyhow, Context};

/// Health of the wallet server and its agreement with our node.
pub fn ensure_in_sync(
    network: &NetworkInformation,
    wallet: &WalletInfo,
    tip: &ChainTip,
) -> anyhow::Result<()> {
    if network.sync_progress.status != "ready" {
        return Err(anyhow!(
            "the wallet server is not in sync, status: {}",
            network.sync_progress.status
        ));
    }
    if wallet.state.status != "ready" {
        return Err(anyhow!(
            "the wallet is not ready, status: {}",
            wallet.state.status
        ));
    }

    let wallet_height = network.node_tip.height.quantity;
    let drift = wallet_height.abs_diff(tip.block);
    if drift > WALLET_TO_NODE_HEIGHT_TOLERANCE {
        return Err(anyhow!(
            "wallet node tip height {} and node tip block {} differ by {} blocks, more than the tolerance of {}",
            wallet_height,
            tip.block,
            drift,
            WALLET_TO_NODE_HEIGHT_TOLERANCE
        ));
    }
    tracing::debug!(
        wallet_height,
        node_block = tip.block,
        "wallet and node are in sync"
    );
    Ok(())
}

pub async fn check_wallet_and_node(api: &WalletApi, chain: &dyn ChainSource) -> anyhow::Result<()> {
    let network = api
        .network_information()
        .await
        .context("can't query the wallet server network information")?;
    let wallet = api
        .wallet_info()
        .await
        .context("can't query the wallet state")?;
    let tip = chain.tip().await.context("can't query the node tip")?;
    ensure_in_sync(&network, &wallet, &tip)
}

#[cfg(test)]
mod tests {
    use crate::collaborators::wallet_api::{NetworkInformation, WalletInfo};
    use crate::preflight::ensure_in_sync;
    use crate::utxo::ChainTip;

    fn network(status: &str, height: u64) -> NetworkInformation {
        serde_json::from_value(serde_json::json!({
            "sync_progress": {"status": status},
            "node_tip": {"height": {"quantity": height, "unit": "block"}}
        }))
        .unwrap()
    }

    fn wallet(status: &str) -> WalletInfo {
        serde_json::from_value(serde_json::json!({"state": {"status": status}})).unwrap()
    }

    fn tip(block: u64) -> ChainTip {
        ChainTip { slot: 1_000, block }
    }

    #[test]
    fn ready_and_close() {
        assert!(ensure_in_sync(&network("ready", 100), &wallet("ready"), &tip(100)).is_ok());
        assert!(ensure_in_sync(&network("ready", 95), &wallet("ready"), &tip(100)).is_ok());
        assert!(ensure_in_sync(&network("ready", 105), &wallet("ready"), &tip(100)).is_ok());
    }

    #[test]
    fn height_drift_beyond_tolerance() {
        let err = ensure_in_sync(&network("ready", 94), &wallet("ready"), &tip(100)).unwrap_err();
        assert!(err.to_string().contains("differ by 6 blocks"));
        assert!(ensure_in_sync(&network("ready", 106), &wallet("ready"), &tip(100)).is_err());
    }

    #[test]
    fn not_ready() {
        assert!(ensure_in_sync(&network("syncing", 100), &wallet("ready"), &tip(100)).is_err());
        assert!(ensure_in_sync(&network("ready", 100), &wallet("restoring"), &tip(100)).is_err());
    }
}
