//! Run orchestration: batch partitioning, the worker pool, and the sink.
//!
//! Thread layout:
//!   - the calling thread acts as scheduler (dispatch, retry bookkeeping)
//!   - `max_workers` worker threads evaluate batches
//!   - one sink thread owns the write connection and persists outputs
//!
//! The work queue is a bounded crossbeam channel of capacity
//! `max_workers * queue_multiplier`, so a slow pool pushes back on dispatch
//! instead of buffering the whole input. Worker panics are caught and fed
//! into the same retry state machine as ordinary batch failures.

use crate::aggregator::aggregate;
use crate::batch::{Batch, BatchState};
use crate::clients::ClientDirectory;
use crate::config::RunConfig;
use crate::error::{AmlError, AmlResult};
use crate::graph::{RelationshipEdge, RelationshipGraph};
use crate::ingest;
use crate::metrics::{Alert, MetricsSink, RunMetrics};
use crate::profiles::{standard_profiles, EvalContext, RiskProfile};
use crate::record::{is_night_hour, ClientAggregates, Party, RiskAssessment, RiskLevel, Transaction};
use crate::store::AmlStore;
use crate::types::{BatchId, RunId};
use chrono::Timelike;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

// ── Cancellation ───────────────────────────────────────────────

/// Cooperative cancellation. `cancel()` stops new dispatch immediately;
/// in-flight batches keep running until the grace period elapses.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    flag: AtomicBool,
    at: Mutex<Option<Instant>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner { flag: AtomicBool::new(false), at: Mutex::new(None) }),
        }
    }

    pub fn cancel(&self) {
        if !self.inner.flag.swap(true, Ordering::SeqCst) {
            *self.inner.at.lock() = Some(Instant::now());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub fn grace_expired(&self, grace: Duration) -> bool {
        if !self.is_cancelled() {
            return false;
        }
        self.inner
            .at
            .lock()
            .map(|at| at.elapsed() >= grace)
            .unwrap_or(false)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

// ── Run summary ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub batches_total: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub records_ingested: u64,
    pub records_skipped: u64,
    pub records_deduplicated: u64,
    pub records_per_second: f64,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.batches_failed == 0
    }
}

// ── Messages ───────────────────────────────────────────────────

/// Everything one worker produced for one batch.
pub struct BatchOutput {
    pub batch_id: BatchId,
    pub scored: Vec<(Transaction, RiskAssessment)>,
    /// Final edge state per transaction, in input order.
    pub edges: Vec<RelationshipEdge>,
    /// Records this attempt skipped as unparseable. Folded into the run
    /// counters only when the batch persists, never per attempt.
    pub records_skipped: u64,
}

enum WorkerOutcome {
    Evaluated { batch: Batch, output: BatchOutput },
    Failed { batch: Batch, error: AmlError },
}

enum SinkMsg {
    State {
        batch_id: BatchId,
        source: String,
        state: &'static str,
        attempts: u32,
        record_count: usize,
    },
    Persist {
        batch: Batch,
        output: BatchOutput,
    },
}

struct SinkReport {
    batch: Batch,
    result: AmlResult<()>,
}

// ── Entry points ───────────────────────────────────────────────

/// Run the pipeline over the given input files with the standard profiles.
pub fn run(
    config: RunConfig,
    store: AmlStore,
    inputs: &[PathBuf],
    cancel: CancelToken,
    monitor: &dyn MetricsSink,
) -> AmlResult<RunSummary> {
    run_with_profiles(config, store, inputs, cancel, monitor, standard_profiles())
}

/// As `run`, with a caller-supplied evaluator set.
pub fn run_with_profiles(
    config: RunConfig,
    store: AmlStore,
    inputs: &[PathBuf],
    cancel: CancelToken,
    monitor: &dyn MetricsSink,
    profiles: Vec<Box<dyn RiskProfile>>,
) -> AmlResult<RunSummary> {
    config.validate()?;
    let started = Instant::now();
    let run_id: RunId = Uuid::new_v4().to_string();
    let config = Arc::new(config);

    store.migrate()?;
    store.insert_run(
        &run_id,
        &chrono::Utc::now().to_rfc3339(),
        &serde_json::to_string(config.as_ref())?,
    )?;

    // Warm in-memory state so re-ingest against an existing database stays
    // idempotent all the way down to the graph.
    let clients = Arc::new(ClientDirectory::new());
    for agg in store.all_clients()? {
        clients.insert(agg);
    }
    let graph = Arc::new(RelationshipGraph::new(config.strength));
    for edge in store.all_edges()? {
        graph.seed_edge(edge);
    }
    for reference in store.all_reference_ids()? {
        graph.mark_applied(&reference);
    }

    // Partition inputs into batches up front; per-file read errors are fatal
    // before the first dispatch.
    let mut pending: VecDeque<Batch> = VecDeque::new();
    let mut next_id: BatchId = 0;
    for path in inputs {
        let records = ingest::load_records(path)?;
        let source = path.display().to_string();
        for chunk in records.chunks(config.batch_size.max(1)) {
            pending.push_back(Batch::new(next_id, source.clone(), chunk.to_vec()));
            next_id += 1;
        }
    }
    let batches_total = pending.len() as u64;
    log::info!(
        "run {run_id}: {batches_total} batches from {} file(s), {} workers",
        inputs.len(),
        config.max_workers
    );

    let metrics = Arc::new(RunMetrics::new());
    let profiles = Arc::new(profiles);

    let (work_tx, work_rx) = bounded::<Batch>(config.queue_capacity());
    let (outcome_tx, outcome_rx) = unbounded::<WorkerOutcome>();
    let (sink_tx, sink_rx) = unbounded::<SinkMsg>();
    let (report_tx, report_rx) = unbounded::<SinkReport>();

    let mut workers = Vec::with_capacity(config.max_workers);
    for n in 0..config.max_workers {
        let work_rx = work_rx.clone();
        let outcome_tx = outcome_tx.clone();
        let config = Arc::clone(&config);
        let clients = Arc::clone(&clients);
        let graph = Arc::clone(&graph);
        let profiles = Arc::clone(&profiles);
        let cancel = cancel.clone();
        let handle = std::thread::Builder::new()
            .name(format!("aml-worker-{n}"))
            .spawn(move || {
                worker_loop(work_rx, outcome_tx, config, clients, graph, profiles, cancel)
            })
            .map_err(AmlError::Io)?;
        workers.push(handle);
    }
    drop(work_rx);
    drop(outcome_tx);

    let sink_handle = {
        let run_id = run_id.clone();
        let config = Arc::clone(&config);
        let clients = Arc::clone(&clients);
        let metrics = Arc::clone(&metrics);
        std::thread::Builder::new()
            .name("aml-sink".to_string())
            .spawn(move || sink_loop(store, run_id, config, clients, metrics, sink_rx, report_tx))
            .map_err(AmlError::Io)?
    };

    // ── Scheduler loop ─────────────────────────────────────────

    let mut outstanding = batches_total;
    while outstanding > 0 {
        // Drained on every pass, not once: an in-flight batch that fails
        // after cancellation lands back on `pending` and must drain too or
        // `outstanding` never reaches zero.
        if cancel.is_cancelled() {
            while let Some(batch) = pending.pop_front() {
                log::warn!("batch {} dropped by cancellation", batch.id);
                record_failed_batch(&batch, "cancelled", &sink_tx, &metrics, monitor);
                outstanding -= 1;
            }
            if outstanding == 0 {
                break;
            }
        }

        // Fill the bounded queue as far as it will take us. This thread is
        // the only producer, so a not-full check cannot race into blocking.
        while !cancel.is_cancelled() && !work_tx.is_full() {
            let Some(mut batch) = pending.pop_front() else { break };
            batch.start();
            let _ = sink_tx.send(SinkMsg::State {
                batch_id: batch.id,
                source: batch.source.clone(),
                state: batch.state.as_str(),
                attempts: batch.attempts,
                record_count: batch.records.len(),
            });
            if work_tx.send(batch).is_err() {
                break;
            }
        }

        crossbeam_channel::select! {
            recv(outcome_rx) -> msg => match msg {
                Ok(WorkerOutcome::Evaluated { batch, output }) => {
                    let _ = sink_tx.send(SinkMsg::Persist { batch, output });
                }
                Ok(WorkerOutcome::Failed { mut batch, error }) => {
                    log::warn!("batch {} attempt {} failed: {error}", batch.id, batch.attempts);
                    // The attempt budget covers transient failures only; a
                    // cancelled run fails the batch on its current attempt.
                    let budget =
                        if cancel.is_cancelled() { batch.attempts } else { config.max_retries };
                    match batch.fail_attempt(budget) {
                        BatchState::Pending => pending.push_back(batch),
                        _ => {
                            record_failed_batch(&batch, &error.to_string(), &sink_tx, &metrics, monitor);
                            outstanding -= 1;
                        }
                    }
                }
                Err(_) => break,
            },
            recv(report_rx) -> msg => match msg {
                Ok(SinkReport { mut batch, result }) => match result {
                    Ok(()) => {
                        batch.complete();
                        metrics.batches_completed.fetch_add(1, Ordering::Relaxed);
                        let _ = sink_tx.send(SinkMsg::State {
                            batch_id: batch.id,
                            source: batch.source.clone(),
                            state: batch.state.as_str(),
                            attempts: batch.attempts,
                            record_count: batch.records.len(),
                        });
                        outstanding -= 1;
                    }
                    Err(error) => {
                        // Persistence already retried internally; this batch
                        // is terminal regardless of evaluation attempts left.
                        batch.fail_attempt(batch.attempts);
                        record_failed_batch(&batch, &error.to_string(), &sink_tx, &metrics, monitor);
                        outstanding -= 1;
                    }
                },
                Err(_) => break,
            },
            default(Duration::from_millis(50)) => {}
        }
    }

    drop(work_tx);
    for handle in workers {
        let _ = handle.join();
    }
    drop(sink_tx);
    let store = match sink_handle.join() {
        Ok(store) => store,
        Err(_) => return Err(AmlError::Other(anyhow::anyhow!("sink thread panicked"))),
    };

    let snap = metrics.snapshot();
    let status = if snap.batches_failed == 0 { "completed" } else { "partial" };
    store.finish_run(&run_id, &chrono::Utc::now().to_rfc3339(), status)?;
    metrics.publish(monitor);
    monitor.alert(
        Alert::RunCompleted,
        &format!(
            "run {run_id} {status}: {}/{} batches, {} records",
            snap.batches_completed, batches_total, snap.records_ingested
        ),
    );

    Ok(RunSummary {
        run_id,
        batches_total,
        batches_completed: snap.batches_completed,
        batches_failed: snap.batches_failed,
        records_ingested: snap.records_ingested,
        records_skipped: snap.records_skipped,
        records_deduplicated: snap.records_deduplicated,
        records_per_second: snap.records_per_second,
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}

fn record_failed_batch(
    batch: &Batch,
    detail: &str,
    sink_tx: &Sender<SinkMsg>,
    metrics: &RunMetrics,
    monitor: &dyn MetricsSink,
) {
    metrics.batches_failed.fetch_add(1, Ordering::Relaxed);
    let _ = sink_tx.send(SinkMsg::State {
        batch_id: batch.id,
        source: batch.source.clone(),
        state: "failed",
        attempts: batch.attempts,
        record_count: batch.records.len(),
    });
    monitor.alert(
        Alert::BatchFailed,
        &format!("batch {} ({}) after {} attempt(s): {detail}", batch.id, batch.source, batch.attempts),
    );
}

// ── Worker ─────────────────────────────────────────────────────

fn worker_loop(
    work_rx: Receiver<Batch>,
    outcome_tx: Sender<WorkerOutcome>,
    config: Arc<RunConfig>,
    clients: Arc<ClientDirectory>,
    graph: Arc<RelationshipGraph>,
    profiles: Arc<Vec<Box<dyn RiskProfile>>>,
    cancel: CancelToken,
) {
    while let Ok(batch) = work_rx.recv() {
        let deadline = Instant::now() + config.timeout_per_batch();
        let result = catch_unwind(AssertUnwindSafe(|| {
            process_batch(&batch, deadline, &cancel, &config, &clients, &graph, &profiles)
        }));
        let outcome = match result {
            Ok(Ok(output)) => WorkerOutcome::Evaluated { batch, output },
            Ok(Err(error)) => WorkerOutcome::Failed { batch, error },
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                let error = AmlError::WorkerFailure { batch_id: batch.id, detail };
                WorkerOutcome::Failed { batch, error }
            }
        };
        if outcome_tx.send(outcome).is_err() {
            return;
        }
    }
}

fn process_batch(
    batch: &Batch,
    deadline: Instant,
    cancel: &CancelToken,
    config: &RunConfig,
    clients: &ClientDirectory,
    graph: &RelationshipGraph,
    profiles: &[Box<dyn RiskProfile>],
) -> AmlResult<BatchOutput> {
    let mut output = BatchOutput {
        batch_id: batch.id,
        scored: Vec::with_capacity(batch.records.len()),
        edges: Vec::with_capacity(batch.records.len()),
        records_skipped: 0,
    };
    let ctx = EvalContext { config, clients, graph };

    for raw in &batch.records {
        if Instant::now() >= deadline {
            return Err(AmlError::BatchTimeout {
                batch_id: batch.id,
                timeout_secs: config.timeout_per_batch_secs,
            });
        }
        if cancel.grace_expired(config.grace_period()) {
            return Err(AmlError::WorkerFailure {
                batch_id: batch.id,
                detail: "cancelled past grace period".to_string(),
            });
        }

        let tx = match crate::normalizer::normalize(raw) {
            Ok(tx) => tx,
            Err(schema) => {
                output.records_skipped += 1;
                log::warn!("batch {}: record skipped: {schema}", batch.id);
                continue;
            }
        };

        let outcomes: Vec<_> = profiles
            .iter()
            .map(|p| (p.name(), p.evaluate(&tx, &ctx)))
            .collect();
        // Evaluation first, then the edge update: the network profile for a
        // transaction must not see that transaction's own contribution.
        let mut edge = graph.apply(&tx);
        let assessment = aggregate(&tx, &outcomes, &config.profile_weights, &config.risk_cuts);
        if assessment.risk_level == RiskLevel::High {
            graph.mark_suspicious(&tx.sender.id, &tx.receiver.id);
            edge.is_suspicious = true;
        }

        output.edges.push(edge);
        output.scored.push((tx, assessment));
    }
    Ok(output)
}

// ── Sink ───────────────────────────────────────────────────────

fn sink_loop(
    store: AmlStore,
    run_id: RunId,
    config: Arc<RunConfig>,
    clients: Arc<ClientDirectory>,
    metrics: Arc<RunMetrics>,
    sink_rx: Receiver<SinkMsg>,
    report_tx: Sender<SinkReport>,
) -> AmlStore {
    while let Ok(msg) = sink_rx.recv() {
        match msg {
            SinkMsg::State { batch_id, source, state, attempts, record_count } => {
                if let Err(e) =
                    store.upsert_batch(&run_id, batch_id, &source, state, attempts, record_count)
                {
                    log::error!("batch {batch_id} state write failed: {e}");
                }
            }
            SinkMsg::Persist { batch, output } => {
                // Record counters move here and nowhere else, so a batch
                // that needed several evaluation attempts counts each
                // record exactly once.
                let result = match persist_with_backoff(&store, &run_id, &config, &clients, &output)
                {
                    Ok(deduplicated) => {
                        metrics
                            .records_ingested
                            .fetch_add(output.scored.len() as u64, Ordering::Relaxed);
                        metrics
                            .records_skipped
                            .fetch_add(output.records_skipped, Ordering::Relaxed);
                        metrics.records_deduplicated.fetch_add(deduplicated, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = report_tx.send(SinkReport { batch, result });
            }
        }
    }
    store
}

/// Exponential backoff around the whole batch persist. Assessment-level
/// idempotence makes a half-persisted retry safe. Returns the number of
/// records the successful attempt found already persisted.
fn persist_with_backoff(
    store: &AmlStore,
    run_id: &str,
    config: &RunConfig,
    clients: &ClientDirectory,
    output: &BatchOutput,
) -> AmlResult<u64> {
    let mut delay = Duration::from_millis(50);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match persist_output(store, run_id, clients, output) {
            Ok(deduplicated) => return Ok(deduplicated),
            Err(e) if attempt < config.max_retries => {
                log::warn!(
                    "batch {}: persist attempt {attempt} failed, retrying: {e}",
                    output.batch_id
                );
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) => {
                return Err(AmlError::Persistence {
                    attempts: config.max_retries,
                    detail: e.to_string(),
                });
            }
        }
    }
}

fn persist_output(
    store: &AmlStore,
    run_id: &str,
    clients: &ClientDirectory,
    output: &BatchOutput,
) -> AmlResult<u64> {
    let mut deduplicated = 0u64;
    for (tx, assessment) in &output.scored {
        let suspicious = assessment.risk_level == RiskLevel::High;
        let night = is_night_hour(tx.timestamp.hour());
        let mut sender_update: Option<ClientAggregates> = None;
        let mut receiver_update: Option<ClientAggregates> = None;

        store.in_transaction(|store| {
            let newly = store.insert_assessment(run_id, assessment)?;
            if !newly {
                deduplicated += 1;
                return Ok(());
            }
            // Aggregates move only for first-time assessments, so a
            // re-ingested export leaves every client row byte-identical.
            let sender = folded_aggregates(clients, &tx.sender, tx.amount, tx, suspicious, night);
            store.upsert_client(&sender)?;
            let receiver =
                folded_aggregates(clients, &tx.receiver, tx.amount, tx, suspicious, night);
            store.upsert_client(&receiver)?;
            sender_update = Some(sender);
            receiver_update = Some(receiver);
            Ok(())
        })?;

        // Publish to the in-memory directory only after the commit, so a
        // rolled-back attempt cannot leave memory ahead of the database.
        if let Some(agg) = sender_update {
            clients.insert(agg);
        }
        if let Some(agg) = receiver_update {
            clients.insert(agg);
        }
    }
    for edge in &output.edges {
        store.upsert_edge(edge)?;
    }
    Ok(deduplicated)
}

fn folded_aggregates(
    clients: &ClientDirectory,
    party: &Party,
    amount: f64,
    tx: &Transaction,
    suspicious: bool,
    night: bool,
) -> ClientAggregates {
    let mut agg = clients.get(&party.id).unwrap_or_else(|| {
        ClientAggregates::new(
            party.id.clone(),
            party.name.clone(),
            party.country.clone(),
            tx.timestamp,
        )
    });
    if agg.display_name.is_empty() && !party.name.is_empty() {
        agg.display_name = party.name.clone();
    }
    if agg.country.is_empty() && !party.country.is_empty() {
        agg.country = party.country.clone();
    }
    agg.absorb(amount, tx.timestamp, suspicious, night);
    agg
}
