mod constants;

use anyhow::{bail, Context};
use clap::Parser;
use constants::{DEFAULT_NODES, MAX_AMOUNT, MIN_AMOUNT, TRANSACTIONS_PER_NODE};
use ledger_core::{Ledger, LedgerConfig, MiningStrategy, Replica};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Runs a set of replicas against one shared ledger: each queues random
/// transfers, all mine at once, then the ledger reconciles and prints its chain.
#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
struct Args {
    /// Required leading zero hex digits in every block hash
    #[arg(long)]
    difficulty: Option<u32>,

    /// Comma-separated replica names
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_NODES)]
    nodes: Vec<String>,

    /// Transfers each replica simulates before mining
    #[arg(long, default_value_t = TRANSACTIONS_PER_NODE)]
    transactions: usize,

    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,

    /// Give up on a block after this many nonces
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Seed for the transaction simulator
    #[arg(long)]
    seed: Option<u64>,

    /// JSON ledger config; flags above override it
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn ledger_config(&self) -> anyhow::Result<LedgerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                LedgerConfig::from_json_str(&raw)?
            }
            None => LedgerConfig::default(),
        };
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if self.parallel {
            config.mining = MiningStrategy::Parallel;
        }
        if self.max_attempts.is_some() {
            config.max_mining_attempts = self.max_attempts;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Queues `count` random transfers on `replica`, drawn between random pairs of
/// `replicas`. Self-transfers are skipped rather than redrawn.
fn simulate_transactions(
    replica: &Replica,
    replicas: &[Arc<Replica>],
    count: usize,
    rng: &mut StdRng,
) {
    for _ in 0..count {
        let sender = replicas.choose(&mut *rng);
        let receiver = replicas.choose(&mut *rng);
        let (Some(sender), Some(receiver)) = (sender, receiver) else {
            return;
        };
        if sender.name() == receiver.name() {
            continue;
        }
        let amount = rng.gen_range(MIN_AMOUNT..=MAX_AMOUNT);
        let tx = sender.create_transaction(receiver.name(), amount);
        replica.submit_transaction(&tx);
        info!("{} sent {} coins to {}", sender.name(), amount, receiver.name());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.nodes.is_empty() {
        bail!("at least one node name is required");
    }
    let config = args.ledger_config()?;
    let ledger = Arc::new(Ledger::with_config(config)?);

    let replicas = args
        .nodes
        .iter()
        .map(|name| Replica::join(name.as_str(), ledger.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    for replica in &replicas {
        simulate_transactions(replica, &replicas, args.transactions, &mut rng);
    }

    let handles: Vec<_> = replicas
        .iter()
        .cloned()
        .map(|replica| tokio::task::spawn_blocking(move || replica.mine_pending()))
        .collect();
    for handle in handles {
        handle.await.context("mining task panicked")??;
    }

    let adopted = ledger.resolve_conflicts();
    let valid = ledger.validate();
    info!(height = ledger.len(), adopted, valid, "simulation finished");

    let chain = ledger.chain();
    println!("{}", serde_json::to_string_pretty(&*chain)?);
    println!("chain length: {}", chain.len());
    println!("chain valid: {valid}");
    if !valid {
        bail!("ledger failed validation");
    }
    Ok(())
}
