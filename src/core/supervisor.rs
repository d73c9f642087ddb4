//! # Process supervisor: spawn gating and running-worker bookkeeping.
//!
//! The [`Supervisor`] owns the job queue, the set of running workers and the host.
//! It is driven only from the coordinator's sequencing step, so the capacity check and
//! the spawn that follows it can never interleave with another spawn decision.
//!
//! ## try_spawn
//! ```text
//! try_spawn()
//!   ├─ not accepting (shutdown)        ─► Stopped
//!   ├─ running == limit                ─► AtCapacity { running, limit }  (+ SpawnRejected)
//!   ├─ queue.next_job() == None        ─► QueueEmpty                     (+ QueueDrained once)
//!   └─ job
//!        ├─► launch = args + env snapshot(job) + silent
//!        ├─► host.spawn(launch, signals)  ── Err ─► job requeued, RuntimeError::Spawn
//!        ├─► running.insert(id, Created)
//!        └─► Spawned(id)                                              (+ WorkerSpawned)
//! ```
//!
//! ## Invariants
//! - `running_count() <= limit()` after every call.
//! - The running set is keyed by worker id, so no id appears twice.
//! - `release` is the only way out of the running set.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, error};

use crate::config::ClusterConfig;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::host::{ProcessHost, SignalSender, WorkerId, WorkerLaunch};
use crate::queue::JobQueue;

/// Lifecycle state of a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawn requested; waiting for the host to confirm.
    Created,
    /// Worker process is running.
    Online,
}

/// How a worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code 0.
    Clean,
    /// Non-zero code or terminating signal.
    Crashed {
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl ExitKind {
    pub fn classify(code: Option<i32>, signal: Option<i32>) -> Self {
        match (code, signal) {
            (Some(0), None) => ExitKind::Clean,
            _ => ExitKind::Crashed { code, signal },
        }
    }
}

/// A worker currently counted against the limit.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub job: String,
    pub state: WorkerState,
    pub spawned_at: Instant,
}

/// Result of one spawn attempt. Only host failures are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned(WorkerId),
    AtCapacity { running: usize, limit: usize },
    QueueEmpty,
    Stopped,
}

/// Counters kept by the supervisor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnStats {
    pub spawned: u64,
    pub rejected: u64,
    pub peak_running: usize,
}

/// Gates spawning by the worker limit and owns the running set.
pub struct Supervisor {
    cfg: ClusterConfig,
    queue: JobQueue,
    running: BTreeMap<WorkerId, WorkerRecord>,
    host: Box<dyn ProcessHost>,
    signals: SignalSender,
    bus: Bus,
    stats: SpawnStats,
    accepting: bool,
    drained_reported: bool,
}

impl Supervisor {
    pub fn new(
        cfg: ClusterConfig,
        host: Box<dyn ProcessHost>,
        signals: SignalSender,
        bus: Bus,
    ) -> Self {
        let queue = JobQueue::new(cfg.queue.iter().cloned(), cfg.looping);
        Self {
            cfg,
            queue,
            running: BTreeMap::new(),
            host,
            signals,
            bus,
            stats: SpawnStats::default(),
            accepting: true,
            drained_reported: false,
        }
    }

    /// Spawns one worker for the next job if there is room.
    pub fn try_spawn(&mut self) -> Result<SpawnOutcome, RuntimeError> {
        if !self.accepting {
            return Ok(SpawnOutcome::Stopped);
        }

        let limit = self.limit();
        let running = self.running.len();
        if running >= limit {
            self.stats.rejected += 1;
            debug!(running, limit, "at capacity; spawn rejected");
            self.bus
                .publish(Event::new(EventKind::SpawnRejected).with_load(running, Some(limit)));
            return Ok(SpawnOutcome::AtCapacity { running, limit });
        }

        let Some(job) = self.queue.next_job() else {
            self.report_drained();
            return Ok(SpawnOutcome::QueueEmpty);
        };

        let launch = WorkerLaunch {
            job: job.clone(),
            args: self.cfg.args.clone(),
            env: self.cfg.worker_env(&job),
            silent: self.cfg.silent,
        };
        let id = match self.host.spawn(launch, self.signals.clone()) {
            Ok(id) => id,
            Err(source) => {
                self.queue.requeue(job.clone());
                return Err(RuntimeError::Spawn { job, source });
            }
        };

        let record = WorkerRecord {
            id,
            job: job.clone(),
            state: WorkerState::Created,
            spawned_at: Instant::now(),
        };
        if self.running.insert(id, record).is_some() {
            error!(worker = %id, "host reused a live worker id");
        }
        self.stats.spawned += 1;
        self.stats.peak_running = self.stats.peak_running.max(self.running.len());

        self.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_worker(id)
                .with_job(job.as_str())
                .with_load(self.running.len(), Some(limit)),
        );
        if self.queue.is_drained() {
            self.report_drained();
        }
        Ok(SpawnOutcome::Spawned(id))
    }

    /// Spawns until the limit is reached or the queue has nothing left. Returns how many started.
    pub fn fill(&mut self) -> Result<usize, RuntimeError> {
        let mut started = 0;
        while let SpawnOutcome::Spawned(_) = self.try_spawn()? {
            started += 1;
        }
        Ok(started)
    }

    /// Removes a worker from the running set. Called once per worker, on exit.
    pub fn release(&mut self, id: WorkerId) -> Option<WorkerRecord> {
        self.running.remove(&id)
    }

    pub fn record(&self, id: WorkerId) -> Option<&WorkerRecord> {
        self.running.get(&id)
    }

    pub fn record_mut(&mut self, id: WorkerId) -> Option<&mut WorkerRecord> {
        self.running.get_mut(&id)
    }

    #[inline]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Running worker ids in ascending order.
    pub fn running_ids(&self) -> Vec<WorkerId> {
        self.running.keys().copied().collect()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.cfg.worker_limit_clamped()
    }

    /// No further spawn can ever succeed: queue drained (not looping) or shutting down.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        !self.accepting || self.queue.is_drained()
    }

    /// Exhausted and nothing left running.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.is_exhausted() && self.running.is_empty()
    }

    /// Stops all further spawning.
    pub fn stop_accepting(&mut self) {
        self.accepting = false;
    }

    /// Asks the host to stop every live worker.
    pub fn terminate_all(&mut self) {
        self.host.terminate_all();
    }

    #[inline]
    pub fn stats(&self) -> SpawnStats {
        self.stats
    }

    #[inline]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    fn report_drained(&mut self) {
        if !self.drained_reported {
            self.drained_reported = true;
            debug!(dequeued = self.queue.dequeued(), "job queue drained");
            self.bus.publish(Event::new(EventKind::QueueDrained));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    use crate::error::HostError;
    use crate::host::{LifecycleSignal, SignalReceiver};
    use crate::worker::JOB_ENV;

    /// Host that records launches and confirms them immediately; exits are injected by tests.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingHost {
        pub launches: Arc<Mutex<Vec<(WorkerId, WorkerLaunch)>>>,
        pub fail: bool,
        /// 1-based spawn attempt that fails once.
        pub fail_attempt: Option<usize>,
        pub attempts: Arc<Mutex<usize>>,
        pub terminated: Arc<Mutex<bool>>,
    }

    impl ProcessHost for RecordingHost {
        fn spawn(
            &mut self,
            launch: WorkerLaunch,
            signals: SignalSender,
        ) -> Result<WorkerId, HostError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if self.fail || self.fail_attempt == Some(attempt) {
                return Err(HostError::MissingPipe);
            }
            let mut launches = self.launches.lock().unwrap();
            let id = WorkerId::new(launches.len() as u64 + 1);
            launches.push((id, launch));
            let _ = signals.send(LifecycleSignal::Fork { worker: id });
            let _ = signals.send(LifecycleSignal::Online { worker: id });
            Ok(id)
        }

        fn terminate_all(&mut self) {
            *self.terminated.lock().unwrap() = true;
        }
    }

    pub(crate) fn supervisor(
        cfg: ClusterConfig,
        host: RecordingHost,
    ) -> (Supervisor, SignalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Bus::new(cfg.bus_capacity_clamped());
        (Supervisor::new(cfg, Box::new(host), tx, bus), rx)
    }

    #[test]
    fn fill_stops_at_limit() {
        let host = RecordingHost::default();
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["j1", "j2", "j3"], 2), host.clone());

        assert_eq!(sup.fill().unwrap(), 2);
        assert_eq!(sup.running_count(), 2);
        assert_eq!(
            sup.try_spawn().unwrap(),
            SpawnOutcome::AtCapacity {
                running: 2,
                limit: 2
            }
        );
        let jobs: Vec<String> = host
            .launches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.job.clone())
            .collect();
        assert_eq!(jobs, ["j3", "j2"]);
        assert_eq!(sup.stats().rejected, 2);
    }

    #[test]
    fn launch_env_carries_job() {
        let host = RecordingHost::default();
        let cfg = ClusterConfig::new(["a", "b"], 2)
            .with_env("REGION", "eu")
            .with_args(["--fast"])
            .with_silent(true);
        let (mut sup, _rx) = supervisor(cfg, host.clone());
        sup.fill().unwrap();

        let launches = host.launches.lock().unwrap();
        assert_eq!(launches[0].1.env.get(JOB_ENV).map(String::as_str), Some("b"));
        assert_eq!(launches[1].1.env.get(JOB_ENV).map(String::as_str), Some("a"));
        assert_eq!(launches[1].1.env.get("REGION").map(String::as_str), Some("eu"));
        assert_eq!(launches[0].1.args, ["--fast"]);
        assert!(launches[0].1.silent);
    }

    #[test]
    fn empty_queue_is_noop() {
        let host = RecordingHost::default();
        let (mut sup, _rx) = supervisor(ClusterConfig::new(Vec::<String>::new(), 3), host.clone());
        assert_eq!(sup.try_spawn().unwrap(), SpawnOutcome::QueueEmpty);
        assert!(sup.is_finished());
        assert!(host.launches.lock().unwrap().is_empty());
    }

    #[test]
    fn release_frees_a_slot() {
        let (mut sup, _rx) =
            supervisor(ClusterConfig::new(["a", "b"], 1), RecordingHost::default());
        let SpawnOutcome::Spawned(id) = sup.try_spawn().unwrap() else {
            panic!("expected a spawn");
        };
        assert_eq!(sup.record(id).map(|r| r.state), Some(WorkerState::Created));
        assert!(sup.release(id).is_some());
        assert!(sup.release(id).is_none());
        assert!(matches!(sup.try_spawn().unwrap(), SpawnOutcome::Spawned(_)));
    }

    #[test]
    fn host_failure_is_spawn_error() {
        let host = RecordingHost {
            fail: true,
            ..RecordingHost::default()
        };
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["a"], 1), host);
        let err = sup.try_spawn().unwrap_err();
        assert_eq!(err.as_label(), "runtime_spawn_failed");
        assert_eq!(sup.running_count(), 0);
        assert!(!sup.is_exhausted());
    }

    #[test]
    fn failed_spawn_keeps_the_job() {
        let host = RecordingHost {
            fail_attempt: Some(1),
            ..RecordingHost::default()
        };
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["a", "b"], 2), host.clone());
        assert!(sup.try_spawn().is_err());
        assert_eq!(sup.fill().unwrap(), 2);

        let jobs: Vec<String> = host
            .launches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.job.clone())
            .collect();
        assert_eq!(jobs, ["b", "a"]);
    }

    #[test]
    fn stopped_supervisor_refuses() {
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["a"], 1), RecordingHost::default());
        sup.stop_accepting();
        assert_eq!(sup.try_spawn().unwrap(), SpawnOutcome::Stopped);
        assert!(sup.is_finished());
    }

    #[test]
    fn exit_classification() {
        assert_eq!(ExitKind::classify(Some(0), None), ExitKind::Clean);
        assert!(matches!(ExitKind::classify(Some(1), None), ExitKind::Crashed { .. }));
        assert!(matches!(ExitKind::classify(None, Some(9)), ExitKind::Crashed { .. }));
        assert!(matches!(ExitKind::classify(None, None), ExitKind::Crashed { .. }));
    }
}
