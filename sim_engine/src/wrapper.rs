//! Engine wrapper (C6) — the single-actor boundary (§4.6, §5) that turns a
//! bare `Engine` into a tick-driven state machine with bounded inbox,
//! pause/resume, routing and snapshot/restore.
//!
//! The actor runs on its own `tokio` task; callers reach it only through
//! [`WrapperHandle`], which sends commands over bounded channels and, for
//! `process_tick`/`pause`/`resume`, waits with [`tokio::time::timeout`] per
//! the complexity-dependent bounds in `SimConfig` (§6). The inbox itself is
//! a plain `Mutex`-guarded bounded queue rather than a channel: it is the
//! one piece of state genuinely touched from more than one flow of
//! execution (§5 (a)), while everything else moves only inside the actor
//! loop.

use crate::base::BoundedQueue;
use crate::engine::Engine;
use sim_common::complexity::{ComplexityLevel, EngineKind};
use sim_common::config::SimConfig;
use sim_common::error::{SimError, SimResult};
use sim_common::operation::{Operation, OperationResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Lifecycle state of a wrapper (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperState {
    Stopped,
    Running,
    Paused,
}

/// Routing table (§6): operation type → destination. `"default"` is the
/// reserved fallback key consulted when no type-specific entry exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    entries: HashMap<String, String>,
}

/// Reserved routing destination meaning "this engine completes the
/// operation; no further routing" (§6 glossary: Drain).
pub const DRAIN: &str = "drain";
/// Reserved routing destination synonymous with `drain` for callers that
/// track completion separately from draining.
pub const COMPLETED: &str = "completed";
/// Reserved routing destination meaning "re-admit this operation into the
/// same engine's queue."
pub const SAME_ENGINE: &str = "same_engine";
/// Reserved fallback key consulted when no type-specific route exists.
pub const DEFAULT_KEY: &str = "default";

impl RoutingTable {
    pub fn set(&mut self, op_type: impl Into<String>, destination: impl Into<String>) {
        self.entries.insert(op_type.into(), destination.into());
    }

    /// Resolve the destination for a retired operation's type, falling
    /// back to the `default` key, and finally to `drain` if even that is
    /// unset.
    pub fn destination_for(&self, op_type: &str) -> &str {
        self.entries
            .get(op_type)
            .or_else(|| self.entries.get(DEFAULT_KEY))
            .map(|s| s.as_str())
            .unwrap_or(DRAIN)
    }
}

/// Callback the environment registers to accept a routed result bound for
/// an external destination (§6: "the core exposes `route_completed(result)
/// → bool`"). Returns `true` if the result was accepted.
pub trait ExternalRouter: Send {
    fn route_completed(&mut self, destination: &str, result: &OperationResult) -> bool;
}

/// Bounded, mutex-guarded inbox shared between producers and the actor.
struct Inbox {
    queue: Mutex<BoundedQueue>,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self { queue: Mutex::new(BoundedQueue::new(capacity)) }
    }

    fn push(&self, op: Operation) -> SimResult<()> {
        self.queue.lock().unwrap().push_back(op)
    }

    fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn capacity(&self) -> usize {
        self.queue.lock().unwrap().capacity()
    }

    fn snapshot_contents(&self) -> Vec<Operation> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }
}

enum Command {
    Tick(u64, oneshot::Sender<SimResult<Vec<OperationResult>>>),
    Pause(oneshot::Sender<SimResult<()>>),
    Resume(oneshot::Sender<SimResult<()>>),
    Stop(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<SimResult<SnapshotV1>>),
    Restore(Box<SnapshotV1>, oneshot::Sender<SimResult<()>>),
    SetComplexityLevel(ComplexityLevel, oneshot::Sender<()>),
}

/// Snapshot JSON shape (§6). `completed_operations` appears once; the
/// duplicate key in the external contract's prose is folded into a single
/// field here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotV1 {
    pub engine_id: String,
    pub engine_type: String,
    pub profile_name: String,
    pub current_tick: u64,
    pub total_operations: u64,
    pub completed_operations: u64,
    pub failed_operations: u64,
    pub saved_at: String,
    pub architecture: String,
    pub is_running: bool,
    pub is_paused: bool,
    pub complexity_level: i64,
    pub input_queue_operations: Vec<Operation>,
    pub pending_results: Vec<OperationResult>,
    pub routing_table: HashMap<String, String>,
    pub processed_operations: u64,
    pub queued_operations: u64,
    pub engine_state: serde_json::Value,
}

/// Handle held by callers; cheaply cloneable, safe to share across tasks.
#[derive(Clone)]
pub struct WrapperHandle {
    inbox: Arc<Inbox>,
    cmd_tx: mpsc::Sender<Command>,
    tick_timeout: std::time::Duration,
    pause_timeout: std::time::Duration,
    resume_timeout: std::time::Duration,
}

impl WrapperHandle {
    /// Queue an operation into the inbox. Non-blocking: the only suspension
    /// points are the tick/pause/resume sends (§5), never `queue_operation`.
    pub fn queue_operation(&self, op: Operation) -> SimResult<()> {
        self.inbox.push(op)
    }

    pub fn inbox_length(&self) -> usize {
        self.inbox.len()
    }

    pub fn inbox_capacity(&self) -> usize {
        self.inbox.capacity()
    }

    /// Drive the wrapper by one tick (§4.6, §5 (ii)). Bounded-time send;
    /// times out with `TickTimeout` if the actor doesn't accept within the
    /// complexity-scaled window.
    pub async fn process_tick(&self, tick: u64) -> SimResult<Vec<OperationResult>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_bounded(Command::Tick(tick, reply_tx), self.tick_timeout, SimError::TickTimeout(self.tick_timeout))
            .await?;
        reply_rx.await.map_err(|_| SimError::NotRunning)?
    }

    pub async fn pause(&self) -> SimResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_bounded(Command::Pause(reply_tx), self.pause_timeout, SimError::PauseTimeout(self.pause_timeout))
            .await?;
        reply_rx.await.map_err(|_| SimError::NotRunning)?
    }

    pub async fn resume(&self) -> SimResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_bounded(Command::Resume(reply_tx), self.resume_timeout, SimError::ResumeTimeout(self.resume_timeout))
            .await?;
        reply_rx.await.map_err(|_| SimError::NotRunning)?
    }

    /// Cooperative shutdown (§5: "stop closes a stop channel; the actor
    /// loop drains no further work and returns").
    pub async fn stop(&self) -> SimResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop(reply_tx)).await.is_err() {
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }

    pub async fn snapshot(&self) -> SimResult<SnapshotV1> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(Command::Snapshot(reply_tx)).await.map_err(|_| SimError::NotRunning)?;
        reply_rx.await.map_err(|_| SimError::NotRunning)?
    }

    pub async fn save_snapshot(&self, dir: &Path) -> SimResult<()> {
        let snap = self.snapshot().await?;
        let path = dir.join(format!("{}_{}.snapshot.json", snap.engine_type, snap.engine_id));
        let json = serde_json::to_string_pretty(&snap)?;
        std::fs::create_dir_all(dir)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub async fn restore(&self, snapshot: SnapshotV1) -> SimResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Restore(Box::new(snapshot), reply_tx))
            .await
            .map_err(|_| SimError::NotRunning)?;
        reply_rx.await.map_err(|_| SimError::NotRunning)?
    }

    pub async fn load_snapshot(&self, path: &Path) -> SimResult<()> {
        let content = std::fs::read_to_string(path)?;
        let snap: SnapshotV1 = serde_json::from_str(&content)?;
        self.restore(snap).await
    }

    pub async fn set_complexity_level(&self, level: ComplexityLevel) -> SimResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx.send(Command::SetComplexityLevel(level, reply_tx)).await.map_err(|_| SimError::NotRunning)?;
        reply_rx.await.map_err(|_| SimError::NotRunning)
    }

    async fn send_bounded(&self, cmd: Command, timeout: std::time::Duration, timeout_err: SimError) -> SimResult<()> {
        match tokio::time::timeout(timeout, self.cmd_tx.send(cmd)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SimError::NotRunning),
            Err(_) => Err(timeout_err),
        }
    }
}

/// Spawn a wrapper actor around `engine`, returning the handle callers use
/// to drive it. The wrapper starts `Stopped`; callers must start it before
/// the first `process_tick`, mirroring §4.6's lifecycle transitions.
pub fn spawn<E>(
    engine_id: String,
    engine_kind: EngineKind,
    profile_name: String,
    engine: E,
    config: &SimConfig,
    inbox_capacity: usize,
    routing_table: RoutingTable,
    external_router: Option<Box<dyn ExternalRouter>>,
) -> (WrapperHandle, tokio::task::JoinHandle<()>)
where
    E: Engine + Send + 'static,
{
    let inbox = Arc::new(Inbox::new(inbox_capacity));
    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    let actor = WrapperActor {
        engine_id,
        engine_kind,
        profile_name,
        engine,
        state: WrapperState::Stopped,
        fetch_width: config.fetch_width,
        current_tick: 0,
        inbox: Arc::clone(&inbox),
        originals: HashMap::new(),
        pending_results: VecDeque::new(),
        routing: routing_table,
        external_router,
        queued_operations: 0,
        processed_operations: 0,
        complexity_level: config.complexity_level(),
        cmd_rx,
    };

    let join = tokio::spawn(actor.run());

    let handle = WrapperHandle {
        inbox,
        cmd_tx,
        tick_timeout: config.tick_timeout(),
        pause_timeout: config.pause_timeout(),
        resume_timeout: config.resume_timeout(),
    };

    (handle, join)
}

struct WrapperActor<E: Engine> {
    engine_id: String,
    engine_kind: EngineKind,
    profile_name: String,
    engine: E,
    state: WrapperState,
    fetch_width: usize,
    current_tick: u64,
    inbox: Arc<Inbox>,
    /// Originating operations for those currently admitted into the
    /// engine's queue/heap, keyed by id, so a `same_engine` route can
    /// rebuild the operation to re-admit (§9 open question: resolved to
    /// carry the prior penalty chain forward as metadata).
    originals: HashMap<String, Operation>,
    pending_results: VecDeque<(String, OperationResult)>,
    routing: RoutingTable,
    external_router: Option<Box<dyn ExternalRouter>>,
    queued_operations: u64,
    processed_operations: u64,
    complexity_level: ComplexityLevel,
    cmd_rx: mpsc::Receiver<Command>,
}

impl<E: Engine + Send> WrapperActor<E> {
    /// The actor loop: the single flow of execution that mutates engine
    /// state (§5). Suspension point (i): blocking receive on the command
    /// channel, which folds pause/tick/stop into one multi-way selection.
    async fn run(mut self) {
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Tick(t, reply) => {
                    let result = self.handle_tick(t);
                    let _ = reply.send(result);
                }
                Command::Pause(reply) => {
                    let result = self.handle_pause();
                    let _ = reply.send(result);
                }
                Command::Resume(reply) => {
                    let result = self.handle_resume();
                    let _ = reply.send(result);
                }
                Command::Stop(reply) => {
                    self.state = WrapperState::Stopped;
                    let _ = reply.send(());
                    break;
                }
                Command::Snapshot(reply) => {
                    let result = Ok(self.build_snapshot());
                    let _ = reply.send(result);
                }
                Command::Restore(snapshot, reply) => {
                    let result = self.apply_snapshot(*snapshot);
                    let _ = reply.send(result);
                }
                Command::SetComplexityLevel(level, reply) => {
                    self.complexity_level = level;
                    self.engine.set_complexity_level(level);
                    let _ = reply.send(());
                }
            }
        }
        debug!(engine_id = %self.engine_id, "wrapper actor loop exited");
    }

    fn handle_pause(&mut self) -> SimResult<()> {
        match self.state {
            WrapperState::Running => {
                self.state = WrapperState::Paused;
                Ok(())
            }
            WrapperState::Paused => Err(SimError::AlreadyPaused),
            WrapperState::Stopped => Err(SimError::NotRunning),
        }
    }

    fn handle_resume(&mut self) -> SimResult<()> {
        match self.state {
            WrapperState::Paused => {
                self.state = WrapperState::Running;
                Ok(())
            }
            WrapperState::Running => Err(SimError::AlreadyRunning),
            WrapperState::Stopped => Err(SimError::NotRunning),
        }
    }

    /// The three ordered cycles per tick (§4.6). Implicitly starts the
    /// wrapper `Running` on its first tick from `Stopped`, mirroring the
    /// `Start` transition without requiring a separate call for every test
    /// and CLI driver that just wants to feed ticks.
    fn handle_tick(&mut self, tick: u64) -> SimResult<Vec<OperationResult>> {
        self.current_tick = tick;
        if self.state == WrapperState::Stopped {
            self.state = WrapperState::Running;
        }
        if self.state == WrapperState::Paused {
            return Ok(Vec::new());
        }

        // Fetch cycle: move up to fetch_width ops from inbox to engine
        // queue, honoring engine queue capacity (§4.6 (1)).
        let mut moved = 0;
        while moved < self.fetch_width {
            if self.engine.queue_length() >= self.engine.capacity() {
                break;
            }
            let Some(op) = self.inbox.queue.lock().unwrap().pop_front() else {
                break;
            };
            match self.engine.queue_operation(op.clone()) {
                Ok(()) => {
                    self.originals.insert(op.id.clone(), op);
                    self.queued_operations += 1;
                    moved += 1;
                }
                Err(SimError::QueueFull { .. }) => {
                    self.inbox.queue.lock().unwrap().push_front(op);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        // Execute cycle (§4.6 (2)).
        let results = self.engine.process_tick(tick)?;
        self.processed_operations += results.len() as u64;

        // Write-back cycle (§4.6 (3)).
        for result in results.clone() {
            self.route(result);
        }
        self.drain_pending();

        Ok(results)
    }

    fn route(&mut self, result: OperationResult) {
        let destination = self.routing.destination_for(&result.op_type.to_string()).to_string();
        match destination.as_str() {
            DRAIN | COMPLETED => {
                self.originals.remove(&result.id);
            }
            SAME_ENGINE => {
                self.requeue_same_engine(result);
            }
            other => {
                self.originals.remove(&result.id);
                if !self.try_external_route(other, &result) {
                    self.pending_results.push_back((other.to_string(), result));
                }
            }
        }
    }

    /// Re-admit the originating operation into this engine's queue,
    /// carrying the retiring result's penalty chain forward as metadata so
    /// downstream stages (and diagnostics) can see cumulative cost across
    /// hops (§9 open question, resolved: carry over, don't reset).
    fn requeue_same_engine(&mut self, result: OperationResult) {
        let Some(mut original) = self.originals.remove(&result.id) else {
            warn!(id = %result.id, "same_engine route with no known originating operation, dropping");
            return;
        };
        if let Ok(carried) = serde_json::to_value(&result.penalty_info) {
            original.metadata.insert("carried_penalty_chain".to_string(), carried);
        }
        match self.engine.queue_operation(original.clone()) {
            Ok(()) => {
                self.originals.insert(original.id.clone(), original);
            }
            Err(SimError::QueueFull { .. }) => {
                warn!(id = %original.id, "same_engine re-queue dropped: engine queue full");
            }
            Err(e) => {
                warn!(id = %original.id, error = %e, "same_engine re-queue failed");
            }
        }
    }

    fn try_external_route(&mut self, destination: &str, result: &OperationResult) -> bool {
        match self.external_router.as_mut() {
            Some(router) => router.route_completed(destination, result),
            None => false,
        }
    }

    /// Drain the pending-results buffer against the external router,
    /// opportunistically, once per tick (§4.6 (3): "drained on idle").
    fn drain_pending(&mut self) {
        if self.external_router.is_none() {
            return;
        }
        let mut retained = VecDeque::with_capacity(self.pending_results.len());
        while let Some((destination, result)) = self.pending_results.pop_front() {
            if !self.try_external_route(&destination, &result) {
                retained.push_back((destination, result));
            }
        }
        self.pending_results = retained;
    }

    fn build_snapshot(&self) -> SnapshotV1 {
        let dynamic = self.engine.get_dynamic_state();
        SnapshotV1 {
            engine_id: self.engine_id.clone(),
            engine_type: self.engine_kind.dir_name().to_string(),
            profile_name: self.profile_name.clone(),
            current_tick: self.current_tick,
            total_operations: self.queued_operations,
            completed_operations: dynamic
                .get("completed_operations")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            failed_operations: dynamic.get("failed_operations").and_then(|v| v.as_u64()).unwrap_or(0),
            saved_at: format!("tick:{}", self.current_tick),
            architecture: "single_actor_sequential".to_string(),
            is_running: self.state == WrapperState::Running,
            is_paused: self.state == WrapperState::Paused,
            complexity_level: self.complexity_level as i64,
            input_queue_operations: self.inbox.snapshot_contents(),
            pending_results: self.pending_results.iter().map(|(_, r)| r.clone()).collect(),
            routing_table: self.routing.entries.clone(),
            processed_operations: self.processed_operations,
            queued_operations: self.queued_operations,
            engine_state: dynamic,
        }
    }

    /// Restore from a snapshot (§8 round-trip law): tick, inbox contents
    /// (as a multiset), pending-results, routing table and counters are
    /// all reinstated; engine-internal state is restored via the opaque
    /// `engine_state` blob.
    fn apply_snapshot(&mut self, snapshot: SnapshotV1) -> SimResult<()> {
        self.current_tick = snapshot.current_tick;
        self.state = if snapshot.is_paused {
            WrapperState::Paused
        } else if snapshot.is_running {
            WrapperState::Running
        } else {
            WrapperState::Stopped
        };
        self.processed_operations = snapshot.processed_operations;
        self.queued_operations = snapshot.queued_operations;
        self.complexity_level = ComplexityLevel::from_raw(snapshot.complexity_level);
        self.engine.set_complexity_level(self.complexity_level);
        self.routing = RoutingTable { entries: snapshot.routing_table };
        self.pending_results = snapshot
            .pending_results
            .into_iter()
            .map(|r| (self.routing.destination_for(&r.op_type.to_string()).to_string(), r))
            .collect();

        {
            let mut guard = self.inbox.queue.lock().unwrap();
            guard.clear();
            for op in snapshot.input_queue_operations {
                guard.push_back(op)?;
            }
        }

        self.engine.load_dynamic_state(snapshot.engine_state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuEngine;
    use sim_common::profile::EngineProfile;
    use sim_common::operation::{ComplexityClass, Language, OperationType};
    use std::collections::HashMap;

    fn xeon_profile() -> EngineProfile {
        let content = include_str!("../../sim_common/src/profile/defaults/cpu_intel_xeon_6248r.json");
        let doc: sim_common::profile::ProfileDocument = serde_json::from_str(content).unwrap();
        EngineProfile::parse("xeon", doc, EngineKind::Cpu).unwrap()
    }

    fn op(id: &str) -> Operation {
        Operation {
            id: id.to_string(),
            op_type: OperationType::Compute,
            complexity: ComplexityClass::O1,
            language: Language::Go,
            data_size: 100,
            next_component: None,
            metadata: HashMap::new(),
        }
    }

    fn make_wrapper() -> (WrapperHandle, tokio::task::JoinHandle<()>) {
        let mut engine = CpuEngine::new(10_000, 0, 0.3);
        engine.load_profile(xeon_profile()).unwrap();
        let config = SimConfig::default();
        let mut routing = RoutingTable::default();
        routing.set("compute", DRAIN);
        spawn("cpu-0".to_string(), EngineKind::Cpu, "xeon_6248r".to_string(), engine, &config, 64, routing, None)
    }

    #[tokio::test]
    async fn scenario_s3_queue_overflow_rejection_at_inbox() {
        let (handle, _join) = make_wrapper();
        let cap = handle.inbox_capacity();
        for i in 0..cap {
            handle.queue_operation(op(&format!("a{i}"))).unwrap();
        }
        let mut rejects = 0;
        for i in 0..10 {
            if handle.queue_operation(op(&format!("b{i}"))).is_err() {
                rejects += 1;
            }
        }
        assert_eq!(rejects, 10);
        assert_eq!(handle.inbox_length(), cap);
    }

    #[tokio::test]
    async fn paused_wrapper_tick_is_a_no_op() {
        let (handle, _join) = make_wrapper();
        handle.process_tick(0).await.unwrap(); // auto-starts Stopped -> Running
        handle.queue_operation(op("x")).unwrap();
        handle.pause().await.unwrap();
        let results = handle.process_tick(1).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(handle.inbox_length(), 1);
    }
}
