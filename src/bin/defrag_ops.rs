use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use defrag_ops::collaborators::cardano_address::{prepare_bootstrap, CardanoAddress, WalletKeys};
use defrag_ops::collaborators::cardano_cli::CardanoCli;
use defrag_ops::collaborators::wallet_api::WalletApi;
use defrag_ops::collaborators::wallet_db::WalletDb;
use defrag_ops::collaborators::ChainSource;
use defrag_ops::compose::{
    prepare_run, run, BootstrapIdentity, Collaborators, FragmentParams, Operation, RunSettings,
};
use defrag_ops::compose_utils::distribution::DistributionMode;
use defrag_ops::compose_utils::input_filter::InputFilter;
use defrag_ops::compose_utils::output_addresses::OutputAddressMode;
use defrag_ops::config::{
    read_mnemonics, read_secret_file, validate_run_options, Config, Network, NetworkSettings,
    OperationKind, DEFAULT_MAX_INPUTS, MAINNET_MAGIC,
};
use defrag_ops::preflight::check_wallet_and_node;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser)]
    config_path: PathBuf,

    /// debug logging
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the shelley era compatible (bootstrap) address of the recovery phrase
    PrintBootstrapAddress {
        /// print only the address
        #[clap(long)]
        raw: bool,
    },
    /// Spreads bootstrap address funds over many outputs
    Frag {
        /// outputs per transaction, not counting change
        #[clap(long, value_parser)]
        outputs: usize,
        /// lovelace spread over the outputs of each transaction
        #[clap(long, value_parser)]
        total: u64,
        #[clap(long, value_parser, default_value = "bootstrap")]
        address_mode: OutputAddressMode,
        /// equal output amounts instead of random ones
        #[clap(long)]
        even: bool,
        #[clap(flatten)]
        run: RunArgs,
    },
    /// Consolidates wallet utxos into the bootstrap address
    Defrag {
        #[clap(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// minimum output lovelace, instead of the protocol parameter
    #[clap(long, value_parser)]
    min: Option<u64>,
    /// maximum inputs per transaction
    #[clap(long, value_parser, default_value_t = DEFAULT_MAX_INPUTS)]
    max: usize,
    #[clap(long, value_parser, default_value_t = 1)]
    repeat: usize,
    /// log per step timings
    #[clap(long)]
    timers: bool,
    /// drop matching utxos before the first transaction: utxo|address re REGEX, or lovelace eq|ne|gt|gte|lt|lte N
    #[clap(long, number_of_values = 3, value_names = &["TARGET", "METHOD", "EXPR"])]
    filter: Option<Vec<String>>,
    /// submit transactions, otherwise only a dry run is done
    #[clap(long)]
    live: bool,
    #[clap(long)]
    no_confirm: bool,
    /// re-read utxo state before every transaction
    #[clap(long)]
    dynamic: bool,
    /// seed for random output amounts and addresses
    #[clap(long, value_parser)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = _main().await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn _main() -> anyhow::Result<()> {
    let Cli {
        config_path,
        debug,
        command,
    } = Cli::parse();

    // Start logging setup block
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(level)
        .init();

    tracing::debug!("Config file {:?}", config_path);
    let config = Config::load(&config_path)?;
    let network = config.network_settings();
    let mnemonics = read_mnemonics(&config.mnemonics_path)?;

    let socket_path = match command {
        Command::PrintBootstrapAddress { .. } => config.node.socket_path.clone(),
        _ => Some(config.node.resolve_socket_path()?),
    };
    let cli = CardanoCli::new(&config.node.cardano_cli, network, socket_path);
    let address_tool = CardanoAddress::new(&config.node.cardano_address);
    let bootstrap = prepare_bootstrap(&address_tool, &cli, &mnemonics, &network).await?;

    if let Command::PrintBootstrapAddress { raw: true } = command {
        println!("{}", bootstrap.address);
        return Ok(());
    }
    tracing::info!(
        "Shelley era compatible *** {} *** bootstrap address:",
        network
    );
    tracing::info!("  This address will be used to fund operations for the `frag` sub-command");
    tracing::info!("  This address will be used to return change to for the `defrag` sub-command");
    tracing::info!("");
    tracing::info!("  {}", bootstrap.address);
    tracing::info!("");

    let (operation, args) = match command {
        Command::PrintBootstrapAddress { .. } => return Ok(()),
        Command::Frag {
            outputs,
            total,
            address_mode,
            even,
            run,
        } => (
            Operation::Fragment(FragmentParams {
                output_count: outputs,
                output_total: total,
                address_mode,
                distribution: if even {
                    DistributionMode::Even
                } else {
                    DistributionMode::Random
                },
            }),
            run,
        ),
        Command::Defrag { run } => (Operation::Defragment, run),
    };
    let kind = operation.kind();
    let fragment_outputs = match operation {
        Operation::Fragment(params) => Some((params.output_count, params.output_total)),
        Operation::Defragment => None,
    };
    validate_run_options(kind, args.max, args.repeat, fragment_outputs)?;
    let filter = match &args.filter {
        Some(parts) => match parts.as_slice() {
            [target, method, expression] => Some(InputFilter::parse(target, method, expression)?),
            _ => anyhow::bail!("--filter takes exactly TARGET METHOD EXPR"),
        },
        None => None,
    };

    let wallet = config.wallet()?;
    tracing::debug!("wallet id = {}", wallet.id);
    tracing::debug!("wallet db path = {}", wallet.db_path.display());
    tracing::debug!("wallet server api = {}", wallet.api_base());
    let passphrase = read_secret_file(&wallet.passphrase_path)?;
    let api = Arc::new(WalletApi::new(wallet, passphrase)?);
    let cli = Arc::new(cli);
    let keys = Arc::new(WalletKeys::new(address_tool, (*cli).clone(), &bootstrap));

    check_wallet_and_node(&api, cli.as_ref()).await?;

    if let Some(min) = args.min {
        let protocol_min = cli.protocol_parameters().await?.min_utxo_value;
        if min != protocol_min {
            tracing::warn!(
                "WARNING: --min {} differs from the protocol minimum utxo value of {} lovelace",
                min,
                protocol_min
            );
            if !args.no_confirm && !confirm("WARNING: Do you wish to proceed? (y/n): ")? {
                tracing::info!("Aborting.");
                return Ok(());
            }
        }
    }

    let collaborators = Collaborators {
        chain: cli.clone(),
        toolchain: cli.clone(),
        inspector: keys.clone(),
        deriver: keys,
        wallet: Arc::new(WalletDb::new(&wallet.db_path)),
        address_factory: api,
    };
    let identity = BootstrapIdentity {
        address: bootstrap.address.clone(),
        signing_key: bootstrap.signing_key.clone(),
    };
    let mut context =
        prepare_run(&operation, &collaborators, identity, filter.as_ref(), args.seed).await?;
    tracing::debug!("runtime utxos after filtering: {}", context.ledger.len());

    if !summary_header(kind, &network, args.live, args.no_confirm)? {
        tracing::info!("Aborting.");
        return Ok(());
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("SIGINT or CTRL-C interruption detected");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let settings = RunSettings {
        network,
        max_inputs: args.max,
        repeat: args.repeat,
        live: args.live,
        dynamic: args.dynamic,
        timers: args.timers,
        min_override: args.min,
    };
    let outcome = run(
        &operation,
        &settings,
        &collaborators,
        &mut context,
        interrupt.as_ref(),
    )
    .await;

    let title = format!(
        "Summary of {} {} on Cardano network {}:",
        match kind {
            OperationKind::Fragment => "fragmentation",
            OperationKind::Defragment => "defragmentation",
        },
        if args.live { "*** LIVE-RUN ***" } else { "dry-run" },
        network
    );
    context
        .totals
        .log_summary(&title, args.live, context.elapsed());

    let outcome = outcome?;
    tracing::debug!("run finished: {:?}", outcome);
    Ok(())
}

/// Live-run warnings. Returns `false` when the operator declines.
fn summary_header(
    kind: OperationKind,
    network: &NetworkSettings,
    live: bool,
    no_confirm: bool,
) -> anyhow::Result<bool> {
    if live {
        tracing::warn!(
            "WARNING: This tool is about to submit transactions to the Cardano *** {} *** network.",
            network
        );
        if network.is_real_mainnet() {
            tracing::warn!("WARNING: This means that *REAL* funds will be transacted and *REAL* fees will be spent on the public mainnet.");
        } else if network.network == Network::Mainnet {
            tracing::warn!("WARNING: This means that funds will be transacted and fees will be spent on a mainnet like network, but not the real mainnet.");
            tracing::warn!(
                "WARNING: The real mainnet network magic is {}, whereas the config sets {}.",
                MAINNET_MAGIC,
                network.magic
            );
        }
        tracing::warn!("WARNING: To *estimate* transaction fees, run the same command again without the `--live` option for a dry run.");
        tracing::warn!("WARNING: If a wallet sends or receives transactions between a dry run and a live run, fees incurred may also change.");
        if no_confirm {
            tracing::warn!("WARNING: Skipping confirmation as the `--no-confirm` option was given.");
        } else if !confirm("WARNING: Do you wish to proceed? (y/n): ")? {
            return Ok(false);
        }
    }

    tracing::info!(
        "Starting {} ops ({}):",
        match kind {
            OperationKind::Fragment => "fragmentation",
            OperationKind::Defragment => "defragmentation",
        },
        if live { "*** LIVE-RUN ***" } else { "dry-run" }
    );
    Ok(true)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    loop {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => continue,
        }
    }
}
