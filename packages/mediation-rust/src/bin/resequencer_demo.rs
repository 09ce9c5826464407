//! Feeds shuffled, numbered messages through a store-and-resequence
//! pipeline and prints the order they come out in.
//!
//! ```text
//! resequencer-demo --count 20 --duplicates 3 --delete-duplicates
//! RUST_LOG=conduit_mediation=debug resequencer-demo --json
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use conduit_core::{Environment, MessageContext, Value};
use conduit_mediation::config::keys;
use conduit_mediation::mediators::{BuildContext, SequenceConfig, StepRegistry};
use conduit_mediation::{
    mediate_with_fault_handling, ChannelEndpoint, InMemoryMessageStore, MediationEnvironment,
    MetricsCollector, ResequencingProcessor,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of distinct sequence numbers to send, starting at 1
    #[arg(short, long, default_value_t = 20)]
    count: u32,

    /// Extra copies of random already-sent numbers
    #[arg(short, long, default_value_t = 0)]
    duplicates: u32,

    /// Delete copies numbered below the next expected number
    #[arg(long)]
    delete_duplicates: bool,

    /// Milliseconds between resequencing runs
    #[arg(long, default_value_t = 100, env = "CONDUIT_RESEQUENCE_INTERVAL_MS")]
    interval_ms: u64,

    /// Milliseconds between start-selection attempts
    #[arg(long, default_value_t = 50)]
    init_delay_ms: u64,

    /// Shuffle seed, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn sequence_config(value: serde_json::Value) -> anyhow::Result<SequenceConfig> {
    serde_json::from_value(value).context("invalid sequence definition")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json);
    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let env = MediationEnvironment::builder()
        .statistics(Arc::new(MetricsCollector::new()))
        .build();
    let configuration = env.configuration();

    configuration.add_store(Arc::new(InMemoryMessageStore::new("orders")));
    let capacity = usize::try_from(args.count + args.duplicates)?;
    let (endpoint, mut delivered) = ChannelEndpoint::new("delivered", capacity);
    configuration.add_endpoint("delivered", Arc::new(endpoint));

    let registry = StepRegistry::with_builtins();
    let ctx = BuildContext { configuration };
    let deliver = registry.build_sequence(
        &sequence_config(json!({
            "name": "deliver",
            "statistics": true,
            "steps": [
                {"kind": "log", "params": {"level": "debug", "text": "released", "properties": "seq"}},
                {"kind": "target", "params": {"endpoint": "delivered"}}
            ]
        }))?,
        &ctx,
    )?;
    configuration.add_sequence("deliver", Arc::new(deliver));
    let main_sequence = registry.build_sequence(
        &sequence_config(json!({
            "name": "main",
            "steps": [
                {"kind": "property", "params": {"name": "seq", "expression": "payload:/order/seq"}},
                {"kind": "store", "params": {"messageStore": "orders"}}
            ]
        }))?,
        &ctx,
    )?;
    configuration.add_sequence("main", Arc::new(main_sequence));

    let params = HashMap::from([
        (keys::MESSAGE_STORE.to_string(), "orders".to_string()),
        (keys::NEXT_SEQUENCE.to_string(), "deliver".to_string()),
        (keys::SEQUENCE_NUMBER.to_string(), "property:seq".to_string()),
        (keys::INTERVAL.to_string(), args.interval_ms.to_string()),
        (keys::INIT_DELAY.to_string(), args.init_delay_ms.to_string()),
        (keys::REQUIRED_INIT_MESSAGES.to_string(), args.count.min(4).to_string()),
        (keys::DELETE_DUPLICATES.to_string(), args.delete_duplicates.to_string()),
    ]);
    env.processors()
        .register(ResequencingProcessor::from_params("resequencer", &params)?)?;
    env.init().await?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    let mut numbers: Vec<i64> = (1..=i64::from(args.count)).collect();
    for _ in 0..args.duplicates {
        let copy = rng.random_range(1..=i64::from(args.count));
        numbers.push(copy);
    }
    numbers.shuffle(&mut rng);
    info!(sent = ?numbers, "sending messages");

    let main = env.main_sequence().context("main sequence missing")?;
    for (i, seq) in numbers.iter().enumerate() {
        let mut msg =
            MessageContext::with_id(format!("msg-{i}"), Value::from(json!({"order": {"seq": seq}})));
        mediate_with_fault_handling(main.as_ref(), &mut msg, &env).await?;
    }

    let mut released = Vec::new();
    while released.len() < numbers.len() {
        match tokio::time::timeout(Duration::from_secs(2), delivered.recv()).await {
            Ok(Some(msg)) => {
                let seq = msg
                    .property("seq")
                    .and_then(Value::as_text)
                    .unwrap_or_default();
                released.push(seq);
            }
            Ok(None) | Err(_) => break,
        }
    }

    println!("sent:     {}", join(numbers.iter().map(ToString::to_string)));
    println!("released: {}", join(released.iter().cloned()));
    let store = env.configuration().store("orders").context("store missing")?;
    println!("left in store: {}", store.size());

    env.shutdown().await
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(" ")
}
