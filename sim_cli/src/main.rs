//! Demo runner: loads a profile directory, spins up one wrapper per engine
//! kind, feeds a synthetic operation stream, and prints per-tick summaries.
//!
//! This is not a dashboard or a façade over the simulator — external
//! monitoring surfaces are explicitly out of scope (§1). It exists to
//! exercise the wrapper end to end the way a developer would at a shell.

use clap::Parser;
use sim_common::complexity::{ComplexityLevel, EngineKind};
use sim_common::config::SimConfig;
use sim_common::operation::{ComplexityClass, Language, Operation, OperationType};
use sim_common::profile::store::ProfileStore;
use sim_engine::cpu::CpuEngine;
use sim_engine::engine::Engine;
use sim_engine::memory::MemoryEngine;
use sim_engine::network::NetworkEngine;
use sim_engine::queue_sizing;
use sim_engine::storage::StorageEngine;
use sim_engine::wrapper::{self, RoutingTable, DRAIN};
use sim_common::error::SimResult;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Drives the CPU/memory/storage/network engine wrappers for a fixed
/// number of ticks against a profile directory, logging per-tick summaries.
#[derive(Parser, Debug)]
#[command(name = "sim_cli", about = "Datacenter hardware simulator demo runner")]
struct Args {
    /// Directory holding cpu/memory/storage/network profile subdirectories.
    /// Bootstrapped with bundled defaults on first run if missing.
    #[arg(long, default_value = "./profiles")]
    profiles_root: PathBuf,

    /// CPU profile name to load.
    #[arg(long, default_value = "intel_xeon_6248r")]
    cpu_profile: String,

    /// Memory profile name to load.
    #[arg(long, default_value = "ddr5_6400_server")]
    memory_profile: String,

    /// Storage profile name to load.
    #[arg(long, default_value = "samsung_980_pro")]
    storage_profile: String,

    /// Network profile name to load.
    #[arg(long, default_value = "gigabit_ethernet")]
    network_profile: String,

    /// Simulated complexity level, 0 (Minimal) .. 3 (Maximum).
    #[arg(long, default_value_t = 2)]
    complexity: i64,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 200)]
    ticks: u64,

    /// Synthetic operations queued per engine at tick 0.
    #[arg(long, default_value_t = 20)]
    seed_operations: usize,
}

fn seed_op(kind: EngineKind, index: usize) -> Operation {
    let op_type = match kind {
        EngineKind::Cpu => OperationType::Compute,
        EngineKind::Memory => OperationType::MemoryRead,
        EngineKind::Storage => OperationType::StorageRead,
        EngineKind::Network => OperationType::NetworkRequest,
    };
    Operation {
        id: format!("{}-{index}", kind.dir_name()),
        op_type,
        complexity: ComplexityClass::ON,
        language: Language::Rust,
        data_size: 4096,
        next_component: None,
        metadata: HashMap::new(),
    }
}

#[tokio::main]
async fn main() -> SimResult<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let level = ComplexityLevel::from_raw(args.complexity);
    info!(?level, ticks = args.ticks, "starting sim_cli");

    let store = ProfileStore::load(&args.profiles_root)?;
    let mut config = SimConfig::default();
    config.complexity_level = sim_common::config::RawComplexityLevel(level as i64);

    let cpu_profile = store.get(EngineKind::Cpu, &args.cpu_profile)?.clone();
    let memory_profile = store.get(EngineKind::Memory, &args.memory_profile)?.clone();
    let storage_profile = store.get(EngineKind::Storage, &args.storage_profile)?.clone();
    let network_profile = store.get(EngineKind::Network, &args.network_profile)?.clone();

    let mut cpu_engine = CpuEngine::new(config.tick_duration_ns, config.variance_seed, config.pressure_factor);
    cpu_engine.set_complexity_level(level);
    cpu_engine.load_profile(cpu_profile.clone())?;
    let cpu_inbox = queue_sizing::queue_capacity(&cpu_profile, level, config.tick_duration_ns);

    let mut memory_engine = MemoryEngine::new(config.tick_duration_ns, config.variance_seed, config.pressure_factor);
    memory_engine.set_complexity_level(level);
    memory_engine.load_profile(memory_profile.clone())?;
    let memory_inbox = queue_sizing::queue_capacity(&memory_profile, level, config.tick_duration_ns);

    let mut storage_engine = StorageEngine::new(config.tick_duration_ns, config.variance_seed, config.pressure_factor);
    storage_engine.set_complexity_level(level);
    storage_engine.load_profile(storage_profile.clone())?;
    let storage_inbox = queue_sizing::queue_capacity(&storage_profile, level, config.tick_duration_ns);

    let mut network_engine = NetworkEngine::new(config.tick_duration_ns, config.variance_seed, config.pressure_factor);
    network_engine.set_complexity_level(level);
    network_engine.load_profile(network_profile.clone())?;
    let network_inbox = queue_sizing::queue_capacity(&network_profile, level, config.tick_duration_ns);

    let mut all_drain = RoutingTable::default();
    all_drain.set("default", DRAIN);

    let (cpu, _cpu_join) = wrapper::spawn(
        "cpu-0".to_string(),
        EngineKind::Cpu,
        cpu_profile.name.clone(),
        cpu_engine,
        &config,
        cpu_inbox,
        all_drain.clone(),
        None,
    );
    let (memory, _memory_join) = wrapper::spawn(
        "memory-0".to_string(),
        EngineKind::Memory,
        memory_profile.name.clone(),
        memory_engine,
        &config,
        memory_inbox,
        all_drain.clone(),
        None,
    );
    let (storage, _storage_join) = wrapper::spawn(
        "storage-0".to_string(),
        EngineKind::Storage,
        storage_profile.name.clone(),
        storage_engine,
        &config,
        storage_inbox,
        all_drain.clone(),
        None,
    );
    let (network, _network_join) = wrapper::spawn(
        "network-0".to_string(),
        EngineKind::Network,
        network_profile.name.clone(),
        network_engine,
        &config,
        network_inbox,
        all_drain,
        None,
    );

    for i in 0..args.seed_operations {
        cpu.queue_operation(seed_op(EngineKind::Cpu, i))?;
        memory.queue_operation(seed_op(EngineKind::Memory, i))?;
        storage.queue_operation(seed_op(EngineKind::Storage, i))?;
        network.queue_operation(seed_op(EngineKind::Network, i))?;
    }

    let mut total_retired = 0u64;
    for tick in 1..=args.ticks {
        let cpu_results = cpu.process_tick(tick).await?;
        let memory_results = memory.process_tick(tick).await?;
        let storage_results = storage.process_tick(tick).await?;
        let network_results = network.process_tick(tick).await?;

        let retired_this_tick =
            cpu_results.len() + memory_results.len() + storage_results.len() + network_results.len();
        total_retired += retired_this_tick as u64;

        if retired_this_tick > 0 || tick % 50 == 0 {
            info!(
                tick,
                cpu_retired = cpu_results.len(),
                memory_retired = memory_results.len(),
                storage_retired = storage_results.len(),
                network_retired = network_results.len(),
                total_retired,
                "tick summary"
            );
        }
    }

    info!(total_retired, "simulation complete");
    Ok(())
}
