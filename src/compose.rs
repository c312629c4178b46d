use crate::collaborators::{
    AddressFactory, AddressInspector, ChainSource, KeyDeriver, SigningKey, TransactionToolchain,
    WalletSnapshot, WalletSource,
};
use crate::compose_utils::derivation_mapper::DerivationIndexTable;
use crate::compose_utils::distribution::{DistributionMode, OutputDistribution};
use crate::compose_utils::fee_stabilizer::stabilize_fee;
use crate::compose_utils::input_filter::InputFilter;
use crate::compose_utils::ledger::RuntimeLedger;
use crate::compose_utils::output_addresses::{build_outputs, output_addresses, OutputAddressMode};
use crate::compose_utils::run_totals::{RunTotals, TxReport};
use crate::compose_utils::selection::{select_inputs, Selection, SelectionStrategy};
use crate::compose_utils::witness_cache::WitnessCache;
use crate::config::{NetworkSettings, OperationKind, TX_FEE_LOVELACE_TOLERANCE, TX_TTL_TOLERANCE};
use crate::error::ComposeResult;
use crate::utils::time_delta_to_str;
use crate::utxo::{sort_ascending, sort_descending, InputSet, OutputSet, ProtocolParameters, Utxo};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentParams {
    pub output_count: usize,
    /// Lovelace spread over all outputs of one transaction.
    pub output_total: u64,
    pub address_mode: OutputAddressMode,
    pub distribution: DistributionMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Spread bootstrap address funds over many outputs.
    Fragment(FragmentParams),
    /// Consolidate wallet utxos into change at the bootstrap address.
    Defragment,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Fragment(_) => OperationKind::Fragment,
            Operation::Defragment => OperationKind::Defragment,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunSettings {
    pub network: NetworkSettings,
    pub max_inputs: usize,
    pub repeat: usize,
    pub live: bool,
    /// Re-query the utxo source before every transaction and drop vanished utxos.
    pub dynamic: bool,
    pub timers: bool,
    /// Replaces the protocol minimum utxo value as output floor and defrag target.
    pub min_override: Option<u64>,
}

/// Everything the run talks to outside the process.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainSource>,
    pub toolchain: Arc<dyn TransactionToolchain>,
    pub inspector: Arc<dyn AddressInspector>,
    pub deriver: Arc<dyn KeyDeriver>,
    pub wallet: Arc<dyn WalletSource>,
    pub address_factory: Arc<dyn AddressFactory>,
}

/// The operator's own address, funding fragmentation and receiving all change.
#[derive(Clone)]
pub struct BootstrapIdentity {
    pub address: String,
    pub signing_key: SigningKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// All requested repeats were composed.
    Completed,
    /// The ledger ran out of usable utxos first.
    Exhausted,
    Interrupted,
}

/// Mutable state owned by a single run.
pub struct RunContext {
    pub ledger: RuntimeLedger,
    pub witnesses: WitnessCache,
    pub distribution: OutputDistribution,
    pub totals: RunTotals,
    pub wallet_addresses: Vec<String>,
    bootstrap: BootstrapIdentity,
    rng: StdRng,
    started: Instant,
}

impl RunContext {
    pub fn new(
        operation: &Operation,
        source: Vec<Utxo>,
        snapshot: &WalletSnapshot,
        bootstrap: BootstrapIdentity,
        filter: Option<&InputFilter>,
        seed: Option<u64>,
    ) -> ComposeResult<Self> {
        let mut source = source;
        match operation {
            Operation::Fragment(_) => sort_descending(&mut source),
            Operation::Defragment => sort_ascending(&mut source),
        }
        let mut ledger = RuntimeLedger::seed(source);
        if let Some(filter) = filter {
            let removed = ledger.apply_filter(filter)?;
            tracing::info!(
                "Input filter removed {} utxos, {} remain",
                removed,
                ledger.len()
            );
        }

        let mode = match operation {
            Operation::Fragment(params) => params.distribution,
            Operation::Defragment => DistributionMode::default(),
        };
        let (distribution, rng) = match seed {
            Some(seed) => (
                OutputDistribution::with_seed(mode, 0, seed),
                StdRng::seed_from_u64(seed),
            ),
            None => (OutputDistribution::new(mode, 0), StdRng::from_entropy()),
        };

        let mut witnesses =
            WitnessCache::new(DerivationIndexTable::from_entries(snapshot.derivation_entries()));
        witnesses.seed(bootstrap.address.clone(), bootstrap.signing_key.clone());

        Ok(Self {
            ledger,
            witnesses,
            distribution,
            totals: RunTotals::default(),
            wallet_addresses: wallet_addresses(snapshot),
            bootstrap,
            rng,
            started: Instant::now(),
        })
    }

    pub fn bootstrap_address(&self) -> &str {
        &self.bootstrap.address
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    fn refresh_wallet(&mut self, snapshot: &WalletSnapshot) {
        self.wallet_addresses = wallet_addresses(snapshot);
        self.witnesses
            .derivations_mut()
            .merge(snapshot.derivation_entries());
    }
}

fn wallet_addresses(snapshot: &WalletSnapshot) -> Vec<String> {
    snapshot
        .addresses
        .iter()
        .map(|entry| entry.address.clone())
        .collect()
}

/// Queries the starting utxo sets and builds the run context.
///
/// Fragmentation spends from the bootstrap address as seen by the node,
/// defragmentation spends the wallet-store utxos.
pub async fn prepare_run(
    operation: &Operation,
    collaborators: &Collaborators,
    bootstrap: BootstrapIdentity,
    filter: Option<&InputFilter>,
    seed: Option<u64>,
) -> ComposeResult<RunContext> {
    let snapshot = collaborators.wallet.snapshot().await?;
    let stats = snapshot.stats();
    tracing::debug!(
        utxos = stats.utxo_count,
        asset_utxos = snapshot.asset_utxo_count,
        utxo_addresses = stats.address_count,
        lovelace = stats.lovelace,
        addresses = snapshot.addresses.len(),
        "wallet store snapshot"
    );

    let source = match operation {
        Operation::Fragment(_) => {
            let utxos = collaborators.chain.query_utxos(&bootstrap.address).await?;
            tracing::debug!(
                "bootstrap address utxo count (excluding asset utxos): {}",
                utxos.len()
            );
            utxos
        }
        Operation::Defragment => snapshot.utxos.clone(),
    };

    RunContext::new(operation, source, &snapshot, bootstrap, filter, seed)
}

fn log_timer(enabled: bool, label: &str, since: Instant) {
    if enabled {
        tracing::info!("Time to {}: {}", label, time_delta_to_str(since.elapsed(), true));
    }
}

/// Runs up to `settings.repeat` transactions.
///
/// `interrupt` is only looked at between transactions.
pub async fn run(
    operation: &Operation,
    settings: &RunSettings,
    collaborators: &Collaborators,
    context: &mut RunContext,
    interrupt: &AtomicBool,
) -> ComposeResult<RunOutcome> {
    let kind = operation.kind();
    for iteration in 1..=settings.repeat {
        if interrupt.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted before {} operation {}", kind, iteration);
            return Ok(RunOutcome::Interrupted);
        }
        let iteration_start = Instant::now();

        let protocol = collaborators.chain.protocol_parameters().await?;
        let floor = settings.min_override.unwrap_or(protocol.min_utxo_value);
        context.distribution.set_floor(floor);

        if settings.dynamic {
            purge_vanished(operation, settings, collaborators, context).await?;
        }

        if !context.ledger.activate(kind.minimum_utxos()) {
            log_exhausted(kind);
            return Ok(RunOutcome::Exhausted);
        }

        tracing::info!(
            "{} operation {} of {} started with {} non-asset utxo inputs {}:",
            kind,
            iteration,
            settings.repeat,
            context.ledger.len(),
            match kind {
                OperationKind::Fragment => "available",
                OperationKind::Defragment => "to be processed",
            }
        );
        let stats_before = context.witnesses.stats();

        let timer = Instant::now();
        let (selection, outputs) = match operation {
            Operation::Fragment(params) => {
                compose_fragment(params, settings, collaborators, context).await?
            }
            Operation::Defragment => {
                let selection = select_inputs(
                    context.ledger.available(),
                    floor + TX_FEE_LOVELACE_TOLERANCE,
                    settings.max_inputs,
                    SelectionStrategy::Max,
                )?;
                (selection, OutputSet::empty())
            }
        };
        log_timer(settings.timers, "generate tx inputs and outputs", timer);

        let report = process_transaction(
            settings,
            collaborators,
            context,
            &selection,
            &outputs,
            &protocol,
        )
        .await?;

        let timer = Instant::now();
        context.ledger.consume(selection.selected_utxos())?;
        log_timer(settings.timers, "purge consumed utxos", timer);
        context.totals.record(&report);

        let stats = context.witnesses.stats().since(&stats_before);
        let algorithm = match kind {
            OperationKind::Fragment => String::new(),
            OperationKind::Defragment => format!(", Dust algorithm: {}", selection.algorithm),
        };
        tracing::info!(
            "Cache (drvHits, skeyHits, drvLen, skeyLen): ({}, {}, {}, {}){}",
            stats.derivation_hits,
            stats.key_hits,
            stats.derivation_len,
            stats.key_len,
            algorithm
        );
        tracing::info!(
            "Operation time: {}, Elapsed time: {}",
            time_delta_to_str(iteration_start.elapsed(), true),
            time_delta_to_str(context.elapsed(), false)
        );
    }
    Ok(RunOutcome::Completed)
}

fn log_exhausted(kind: OperationKind) {
    match kind {
        OperationKind::Fragment => tracing::info!("Fragmentation complete: no UTxO remain"),
        OperationKind::Defragment => tracing::info!(
            "Defragmentation complete: less than 2 UTxO remain (excluding new defrag Tx change UTxOs)"
        ),
    }
}

async fn purge_vanished(
    operation: &Operation,
    settings: &RunSettings,
    collaborators: &Collaborators,
    context: &mut RunContext,
) -> ComposeResult<()> {
    let timer = Instant::now();
    let snapshot = collaborators.wallet.snapshot().await?;
    context.refresh_wallet(&snapshot);

    let purged = match operation {
        Operation::Fragment(_) => {
            let current = collaborators
                .chain
                .query_utxos(context.bootstrap_address())
                .await?;
            context.ledger.purge_missing(&current)
        }
        Operation::Defragment => context.ledger.purge_missing(&snapshot.utxos),
    };
    if !purged.is_empty() {
        tracing::info!("Purged {} utxos that are no longer unspent", purged.len());
        for utxo in &purged {
            tracing::debug!("purged {} ({} lovelace)", utxo.id, utxo.value);
        }
    }
    log_timer(settings.timers, "purge missing input utxos", timer);
    Ok(())
}

async fn compose_fragment(
    params: &FragmentParams,
    settings: &RunSettings,
    collaborators: &Collaborators,
    context: &mut RunContext,
) -> ComposeResult<(Selection, OutputSet)> {
    let selection = select_inputs(
        context.ledger.available(),
        params.output_total + TX_FEE_LOVELACE_TOLERANCE,
        settings.max_inputs,
        SelectionStrategy::Min,
    )?;
    let addresses = output_addresses(
        params.address_mode,
        params.output_count,
        &context.bootstrap.address,
        &context.wallet_addresses,
        collaborators.address_factory.as_ref(),
        &mut context.rng,
    )
    .await?;
    let amounts = context
        .distribution
        .generate(params.output_count, params.output_total);
    let outputs = build_outputs(addresses, amounts)?;
    Ok((selection, outputs))
}

/// Stabilises the fee, signs and, in live runs, submits one transaction.
async fn process_transaction(
    settings: &RunSettings,
    collaborators: &Collaborators,
    context: &mut RunContext,
    selection: &Selection,
    outputs: &OutputSet,
    protocol: &ProtocolParameters,
) -> ComposeResult<TxReport> {
    let inputs: &InputSet = &selection.inputs;
    let tip = collaborators.chain.tip().await?;
    let ttl = tip.slot + TX_TTL_TOLERANCE;

    let timer = Instant::now();
    let stable = stabilize_fee(
        collaborators.toolchain.as_ref(),
        inputs,
        outputs,
        &context.bootstrap.address,
        ttl,
        protocol,
    )
    .await?;
    tracing::info!(
        "Tx ready: (inputs, outputs, inSum, outSum, change, fees) = ({}, {} + change_addr, {}, {}, {}, {})...",
        inputs.count(),
        outputs.count(),
        inputs.sum(),
        outputs.sum(),
        stable.change,
        stable.fee
    );
    log_timer(settings.timers, "generate a stable fee estimation", timer);

    let timer = Instant::now();
    let witnesses = context
        .witnesses
        .witnesses_for(
            &selection.witness_addresses,
            collaborators.inspector.as_ref(),
            collaborators.deriver.as_ref(),
        )
        .await?;
    let signed = collaborators.toolchain.sign(&stable.body, &witnesses).await?;
    let tx_id = collaborators.toolchain.tx_id(&signed).await?;
    log_timer(settings.timers, "sign the tx and obtain a tx_id", timer);

    tracing::debug!(inputs = ?inputs.ids().collect::<Vec<_>>(), "tx inputs");
    tracing::debug!(outputs = ?outputs.outputs(), "tx outputs (excluding change_addr)");

    let timer = Instant::now();
    if settings.live {
        tracing::info!(
            "    ...submitted to network {} as tx_id: {}",
            settings.network,
            tx_id
        );
        collaborators.toolchain.submit(&signed).await?;
    } else {
        tracing::info!(
            "    ...dry run -- not submitting Tx to the network (txid: {})",
            tx_id
        );
    }
    log_timer(settings.timers, "submit the tx", timer);

    Ok(TxReport {
        tx_id,
        fee: stable.fee,
        inputs: inputs.count(),
        outputs: outputs.count(),
        submitted: settings.live,
    })
}
