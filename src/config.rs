use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Lovelace added on top of the selection target to cover fees.
pub const TX_FEE_LOVELACE_TOLERANCE: u64 = 3_000_000;
/// Slots added to the chain tip for a transaction's TTL.
pub const TX_TTL_TOLERANCE: u64 = 300;
/// Largest tolerated block height difference between wallet server and node.
pub const WALLET_TO_NODE_HEIGHT_TOLERANCE: u64 = 5;
pub const DEFAULT_MAX_INPUTS: usize = 70;
pub const OUTPUT_COUNT_WARNING: usize = 150;

pub const MAINNET_MAGIC: u64 = 764824073;
pub const TESTNET_MAGIC: u64 = 1097911063;
pub const STAGING_MAGIC: u64 = 633343913;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
    Staging,
}

impl Network {
    pub fn default_magic(&self) -> u64 {
        match self {
            Network::Mainnet => MAINNET_MAGIC,
            Network::Testnet => TESTNET_MAGIC,
            Network::Staging => STAGING_MAGIC,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Staging => "staging",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkSettings {
    pub network: Network,
    pub magic: u64,
}

impl NetworkSettings {
    pub fn new(network: Network, magic: Option<u64>) -> Self {
        Self {
            network,
            magic: magic.unwrap_or_else(|| network.default_magic()),
        }
    }

    /// Network flags for node queries and submission.
    pub fn node_args(&self) -> Vec<String> {
        match self.network {
            Network::Testnet | Network::Staging => {
                vec!["--testnet-magic".to_string(), self.magic.to_string()]
            }
            Network::Mainnet => vec!["--mainnet".to_string()],
        }
    }

    /// Staging signs like mainnet.
    pub fn sign_args(&self) -> Vec<String> {
        match self.network {
            Network::Testnet => vec!["--testnet-magic".to_string(), self.magic.to_string()],
            Network::Mainnet | Network::Staging => vec!["--mainnet".to_string()],
        }
    }

    /// Staging needs the mainnet address scheme.
    pub fn address_network_tag(&self) -> String {
        match self.network {
            Network::Mainnet | Network::Staging => "mainnet".to_string(),
            Network::Testnet => self.magic.to_string(),
        }
    }

    pub fn is_real_mainnet(&self) -> bool {
        self.network == Network::Mainnet && self.magic == MAINNET_MAGIC
    }
}

impl fmt::Display for NetworkSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.network.to_string().to_uppercase(), self.magic)
    }
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cardano_cli() -> String {
    "cardano-cli".to_string()
}

fn default_cardano_address() -> String {
    "cardano-address".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    pub id: String,
    pub passphrase_path: PathBuf,
    pub db_path: PathBuf,
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl WalletConfig {
    pub fn api_base(&self) -> String {
        let proto = if self.tls { "https" } else { "http" };
        let host = if self.ip.contains(':') {
            format!("[{}]", self.ip)
        } else {
            self.ip.clone()
        };
        format!("{}://{}:{}/v2", proto, host, self.port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.len() != 40 || !self.id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!(
                "wallet id must be 40 hexadecimal characters: {:?}",
                self.id
            ));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("wallet timeout_secs must be 1 or greater"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_cardano_cli")]
    pub cardano_cli: String,
    #[serde(default = "default_cardano_address")]
    pub cardano_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            cardano_cli: default_cardano_cli(),
            cardano_address: default_cardano_address(),
        }
    }
}

impl NodeConfig {
    /// Configured path, else `$CARDANO_NODE_SOCKET_PATH`.
    pub fn resolve_socket_path(&self) -> anyhow::Result<PathBuf> {
        match &self.socket_path {
            Some(path) => Ok(path.clone()),
            None => std::env::var_os("CARDANO_NODE_SOCKET_PATH")
                .map(PathBuf::from)
                .ok_or_else(|| {
                    anyhow!("node socket_path is not configured and CARDANO_NODE_SOCKET_PATH is not set")
                }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub network: Network,
    #[serde(default)]
    pub magic: Option<u64>,
    pub mnemonics_path: PathBuf,
    #[serde(default)]
    pub wallet: Option<WalletConfig>,
    #[serde(default)]
    pub node: NodeConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot read config file {path}", path = path.display()))?;
        let config: Config = serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse config file {path}", path = path.display()))?;
        Ok(config)
    }

    pub fn network_settings(&self) -> NetworkSettings {
        NetworkSettings::new(self.network, self.magic)
    }

    /// Wallet section, required by the frag and defrag operations.
    pub fn wallet(&self) -> anyhow::Result<&WalletConfig> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| anyhow!("the config file has no wallet section"))?;
        wallet.validate()?;
        Ok(wallet)
    }
}

/// Reads a single-value secret file, trimmed. Empty files are rejected.
pub fn read_secret_file(path: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read secret file {path}", path = path.display()))?;
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(anyhow!("secret file is empty: {}", path.display()));
    }
    Ok(content)
}

/// Reads the recovery phrase as space-joined words.
pub fn read_mnemonics(path: &Path) -> anyhow::Result<String> {
    let content = read_secret_file(path)?;
    Ok(content.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Fragment,
    Defragment,
}

impl OperationKind {
    /// Fewest utxos that still allow a transaction.
    pub fn minimum_utxos(&self) -> usize {
        match self {
            OperationKind::Fragment => 1,
            OperationKind::Defragment => 2,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Fragment => "Fragment",
            OperationKind::Defragment => "Defragment",
        };
        f.write_str(name)
    }
}

/// Bounds checks on the command line run options.
pub fn validate_run_options(
    kind: OperationKind,
    max_inputs: usize,
    repeat: usize,
    outputs: Option<(usize, u64)>,
) -> anyhow::Result<()> {
    if max_inputs < kind.minimum_utxos() {
        return Err(anyhow!(
            "--max must be {} or greater for {} operations: {}",
            kind.minimum_utxos(),
            kind.to_string().to_lowercase(),
            max_inputs
        ));
    }
    if max_inputs > DEFAULT_MAX_INPUTS {
        tracing::warn!(
            "--max {} is above {}, transactions may be rejected as too large",
            max_inputs,
            DEFAULT_MAX_INPUTS
        );
    }
    if repeat < 1 {
        return Err(anyhow!("--repeat must be 1 or greater"));
    }
    if let Some((count, total)) = outputs {
        if count < 1 {
            return Err(anyhow!("--outputs must be 1 or greater"));
        }
        if count >= OUTPUT_COUNT_WARNING {
            tracing::warn!(
                "--outputs {} is {} or more, transactions may be rejected as too large",
                count,
                OUTPUT_COUNT_WARNING
            );
        }
        if total < 1 {
            return Err(anyhow!("--total must be 1 or greater"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::{
        read_mnemonics, validate_run_options, Config, Network, NetworkSettings, OperationKind,
        MAINNET_MAGIC,
    };
    use std::io::Write;

    const FULL: &str = r#"
network: testnet
magic: 42
mnemonics_path: /secrets/mnemonics
wallet:
  id: 2a3f9d3c7f8e6a1b2c3d4e5f60718293a4b5c6d7
  passphrase_path: /secrets/passphrase
  db_path: /wallet/rnd.sqlite
  port: 8091
  tls: true
node:
  socket_path: /ipc/node.socket
"#;

    #[test]
    fn parses_full_config() {
        let config: Config = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(config.network, Network::Testnet);
        let wallet = config.wallet().unwrap();
        assert_eq!(wallet.ip, "127.0.0.1");
        assert_eq!(wallet.timeout_secs, 30);
        assert_eq!(wallet.api_base(), "https://127.0.0.1:8091/v2");
        assert_eq!(config.node.cardano_cli, "cardano-cli");
        assert_eq!(config.network_settings().magic, 42);
    }

    #[test]
    fn minimal_config_has_defaults() {
        let config: Config =
            serde_yaml::from_str("network: mainnet\nmnemonics_path: /m\n").unwrap();
        assert_eq!(config.network_settings().magic, MAINNET_MAGIC);
        assert!(config.wallet.is_none());
        assert!(config.wallet().is_err());
        assert_eq!(config.node.cardano_address, "cardano-address");
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(serde_yaml::from_str::<Config>(
            "network: mainnet\nmnemonics_path: /m\nlive: true\n"
        )
        .is_err());
        assert!(serde_yaml::from_str::<Config>("network: preview\nmnemonics_path: /m\n").is_err());
    }

    #[test]
    fn rejects_bad_wallet_id() {
        let yaml = FULL.replace("2a3f9d3c7f8e6a1b2c3d4e5f60718293a4b5c6d7", "not-a-wallet");
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.wallet().is_err());
    }

    #[test]
    fn network_flags() {
        let testnet = NetworkSettings::new(Network::Testnet, None);
        assert_eq!(testnet.node_args(), vec!["--testnet-magic", "1097911063"]);
        assert_eq!(testnet.sign_args(), vec!["--testnet-magic", "1097911063"]);
        assert_eq!(testnet.address_network_tag(), "1097911063");

        let staging = NetworkSettings::new(Network::Staging, None);
        assert_eq!(staging.node_args(), vec!["--testnet-magic", "633343913"]);
        assert_eq!(staging.sign_args(), vec!["--mainnet"]);
        assert_eq!(staging.address_network_tag(), "mainnet");

        let mainnet = NetworkSettings::new(Network::Mainnet, None);
        assert_eq!(mainnet.node_args(), vec!["--mainnet"]);
        assert!(mainnet.is_real_mainnet());
        assert!(!NetworkSettings::new(Network::Mainnet, Some(1)).is_real_mainnet());
        assert_eq!(mainnet.to_string(), "MAINNET (764824073)");
    }

    #[test]
    fn run_option_bounds() {
        assert!(validate_run_options(OperationKind::Fragment, 1, 1, Some((1, 1))).is_ok());
        assert!(validate_run_options(OperationKind::Defragment, 1, 1, None).is_err());
        assert!(validate_run_options(OperationKind::Defragment, 2, 0, None).is_err());
        assert!(validate_run_options(OperationKind::Fragment, 70, 1, Some((0, 1))).is_err());
        assert!(validate_run_options(OperationKind::Fragment, 70, 1, Some((10, 0))).is_err());
        assert!(validate_run_options(OperationKind::Fragment, 200, 1, Some((200, 1))).is_ok());
    }

    #[test]
    fn mnemonics_are_normalised() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  abandon  ability\nable about \n").unwrap();
        assert_eq!(read_mnemonics(file.path()).unwrap(), "abandon ability able about");

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(read_mnemonics(empty.path()).is_err());
    }
}
