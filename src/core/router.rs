//! # Lifecycle event router.
//!
//! Dispatches each [`LifecycleSignal`] to its handler. Per-worker state lives in the
//! supervisor's running set:
//!
//! ```text
//! Created ──Fork──► (confirmed) ──Online──► Online ──Exit──► released
//!    │                                                  │
//!    └──────────────────────Exit────────────────────────┘
//! ```
//!
//! ## Exit handling
//! ```text
//! Exit { worker, code, signal }
//!   ├─► supervisor.release(worker)          (unknown worker: warn, nothing else)
//!   ├─► classify: code 0 ─► WorkerExited
//!   │             else   ─► WorkerCrashed   (logged, never fatal)
//!   ├─► supervisor.try_spawn()              (unconditional; the gate decides)
//!   │     └─ host error: job stays queued, SpawnFailed published;
//!   │        fatal only when nothing else runs (no exit would retry it)
//!   └─► Finished if nothing can run anymore, else Continue
//! ```
//!
//! Control messages are published with their text; the three actions currently have
//! no side effects. User-facing lines come from subscribers, the router only traces.

use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::events::{Event, EventKind};
use crate::fault::Fault;
use crate::host::{LifecycleSignal, WorkerId};
use crate::protocol::{Action, ControlMessage};

use super::supervisor::{ExitKind, Supervisor, WorkerState};

/// What the event loop should do after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Nothing is running and nothing will be spawned.
    Finished,
}

/// Exit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStats {
    pub clean_exits: u64,
    pub crashes: u64,
}

/// Routes lifecycle signals into supervisor actions.
#[derive(Debug, Default)]
pub struct Router {
    stats: ExitStats,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stats(&self) -> ExitStats {
        self.stats
    }

    /// Applies one signal.
    ///
    /// The only error is a respawn the host refused while no other worker is running.
    pub fn route(
        &mut self,
        sup: &mut Supervisor,
        signal: LifecycleSignal,
    ) -> Result<Flow, RuntimeError> {
        let worker = signal.worker();
        match signal {
            LifecycleSignal::Fork { .. } => self.on_fork(sup, worker),
            LifecycleSignal::Online { .. } => self.on_online(sup, worker),
            LifecycleSignal::Message { message, .. } => self.on_message(sup, worker, message),
            LifecycleSignal::Exit { code, signal, .. } => self.on_exit(sup, worker, code, signal)?,
        }
        Ok(if sup.is_finished() {
            Flow::Finished
        } else {
            Flow::Continue
        })
    }

    fn on_fork(&mut self, sup: &mut Supervisor, worker: WorkerId) {
        let Some(record) = sup.record(worker) else {
            warn!(%worker, "fork for unknown worker");
            return;
        };
        let job = record.job.clone();
        debug!(%worker, job = %job, "worker forked");
        sup.bus().publish(
            Event::new(EventKind::WorkerForked)
                .with_worker(worker)
                .with_job(job.as_str()),
        );
        if sup.is_exhausted() {
            debug!("queue drained; no further workers will be spawned");
        }
    }

    fn on_online(&mut self, sup: &mut Supervisor, worker: WorkerId) {
        let Some(record) = sup.record_mut(worker) else {
            warn!(%worker, "online for unknown worker");
            return;
        };
        if record.state != WorkerState::Created {
            warn!(%worker, state = ?record.state, "duplicate online signal");
            return;
        }
        record.state = WorkerState::Online;
        let job = record.job.clone();
        sup.bus().publish(
            Event::new(EventKind::WorkerOnline)
                .with_worker(worker)
                .with_job(job.as_str()),
        );
    }

    fn on_message(&mut self, sup: &mut Supervisor, worker: WorkerId, message: ControlMessage) {
        let job = sup.record(worker).map(|r| r.job.clone());
        if let Some(text) = message.message.as_deref() {
            debug!(%worker, job = job.as_deref().unwrap_or("-"), "{text}");
        }

        match message.action {
            Some(Action::CheckQueue) => {}
            Some(Action::HandleError) => {}
            Some(Action::UnhandledException) => {}
            None => {}
        }

        let mut event = Event::new(EventKind::ControlReceived)
            .with_worker(worker)
            .with_job_opt(job.as_deref())
            .with_action(message.action);
        if let Some(text) = message.message {
            event = event.with_reason(text);
        }
        sup.bus().publish(event);
    }

    fn on_exit(
        &mut self,
        sup: &mut Supervisor,
        worker: WorkerId,
        code: Option<i32>,
        signal: Option<i32>,
    ) -> Result<(), RuntimeError> {
        let Some(record) = sup.release(worker) else {
            warn!(%worker, ?code, ?signal, "exit for unknown worker");
            return Ok(());
        };
        let running = sup.running_count();

        let kind = match ExitKind::classify(code, signal) {
            ExitKind::Clean => {
                self.stats.clean_exits += 1;
                EventKind::WorkerExited
            }
            ExitKind::Crashed { code, signal } => {
                self.stats.crashes += 1;
                let fault = Fault::WorkerCrash {
                    worker,
                    job: Some(record.job.clone()),
                    code,
                    signal,
                };
                debug!(label = fault.as_label(), "{}", fault.lines().join("; "));
                EventKind::WorkerCrashed
            }
        };
        sup.bus().publish(
            Event::new(kind)
                .with_worker(worker)
                .with_job(record.job.as_str())
                .with_exit(code, signal)
                .with_load(running, None),
        );

        match sup.try_spawn() {
            Ok(_) => Ok(()),
            Err(err) if sup.running_count() == 0 => Err(err),
            Err(err) => {
                debug!(error = %err, running = sup.running_count(), "respawn failed; job kept");
                let job = match &err {
                    RuntimeError::Spawn { job, .. } => Some(job.as_str()),
                    _ => None,
                };
                sup.bus().publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_job_opt(job)
                        .with_load(sup.running_count(), None)
                        .with_reason(err.to_string()),
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, VecDeque};
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use crate::config::ClusterConfig;
    use crate::core::supervisor::SpawnOutcome;
    use crate::core::supervisor::tests::{RecordingHost, supervisor};
    use crate::host::SignalReceiver;

    fn exit(worker: WorkerId, code: i32) -> LifecycleSignal {
        LifecycleSignal::Exit {
            worker,
            code: Some(code),
            signal: None,
        }
    }

    /// Routes every pending host signal; returns the ids that came online.
    fn pump(
        router: &mut Router,
        sup: &mut Supervisor,
        rx: &mut SignalReceiver,
        online: &mut Vec<WorkerId>,
    ) -> Flow {
        let mut flow = Flow::Continue;
        while let Ok(sig) = rx.try_recv() {
            if let LifecycleSignal::Online { worker } = sig {
                online.push(worker);
            }
            flow = router.route(sup, sig).unwrap();
        }
        flow
    }

    #[test]
    fn three_jobs_two_slots() {
        let host = RecordingHost::default();
        let (mut sup, mut rx) = supervisor(ClusterConfig::new(["j1", "j2", "j3"], 2), host.clone());
        let mut router = Router::new();
        let mut online = Vec::new();

        sup.fill().unwrap();
        pump(&mut router, &mut sup, &mut rx, &mut online);
        assert_eq!(online.len(), 2);
        assert_eq!(sup.running_count(), 2);

        let first = online.remove(0);
        assert_eq!(router.route(&mut sup, exit(first, 0)).unwrap(), Flow::Continue);
        assert_eq!(sup.running_count(), 2);
        pump(&mut router, &mut sup, &mut rx, &mut online);

        let mut flow = Flow::Continue;
        for worker in online.drain(..) {
            flow = router.route(&mut sup, exit(worker, 0)).unwrap();
        }
        assert_eq!(flow, Flow::Finished);
        assert_eq!(host.launches.lock().unwrap().len(), 3);
        assert_eq!(router.stats().clean_exits, 3);
        assert_eq!(sup.stats().peak_running, 2);
    }

    #[test]
    fn crash_triggers_respawn_when_looping() {
        let host = RecordingHost::default();
        let cfg = ClusterConfig::new(["j1"], 1).with_looping(true);
        let (mut sup, mut rx) = supervisor(cfg, host.clone());
        let mut router = Router::new();
        let mut online = Vec::new();

        sup.fill().unwrap();
        for _ in 0..5 {
            pump(&mut router, &mut sup, &mut rx, &mut online);
            let worker = online.pop().unwrap();
            assert_eq!(router.route(&mut sup, exit(worker, 1)).unwrap(), Flow::Continue);
        }
        assert_eq!(router.stats().crashes, 5);
        let launches = host.launches.lock().unwrap();
        assert_eq!(launches.len(), 6);
        assert!(launches.iter().all(|(_, l)| l.job == "j1"));
    }

    #[test]
    fn unknown_worker_is_ignored() {
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["a"], 1), RecordingHost::default());
        let mut router = Router::new();
        sup.fill().unwrap();

        let ghost = WorkerId::new(99);
        assert_eq!(router.route(&mut sup, exit(ghost, 0)).unwrap(), Flow::Continue);
        router
            .route(&mut sup, LifecycleSignal::Online { worker: ghost })
            .unwrap();
        assert_eq!(sup.running_count(), 1);
        assert_eq!(router.stats(), ExitStats::default());
    }

    #[test]
    fn messages_do_not_touch_running_set() {
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["a"], 1), RecordingHost::default());
        let mut rx_events = sup.bus().subscribe();
        let mut router = Router::new();
        let SpawnOutcome::Spawned(worker) = sup.try_spawn().unwrap() else {
            panic!("expected a spawn");
        };

        for action in [
            Some(Action::CheckQueue),
            Some(Action::HandleError),
            Some(Action::UnhandledException),
            None,
        ] {
            let message = ControlMessage {
                action,
                message: Some("page 3 done".into()),
            };
            router
                .route(&mut sup, LifecycleSignal::Message { worker, message })
                .unwrap();
        }
        assert_eq!(sup.running_count(), 1);

        let mut received = 0;
        while let Ok(ev) = rx_events.try_recv() {
            if ev.kind == EventKind::ControlReceived {
                assert_eq!(ev.reason.as_deref(), Some("page 3 done"));
                received += 1;
            }
        }
        assert_eq!(received, 4);
    }

    #[test]
    fn killed_worker_counts_as_crash() {
        let (mut sup, _rx) = supervisor(ClusterConfig::new(["a"], 1), RecordingHost::default());
        let mut router = Router::new();
        let SpawnOutcome::Spawned(worker) = sup.try_spawn().unwrap() else {
            panic!("expected a spawn");
        };
        let flow = router
            .route(
                &mut sup,
                LifecycleSignal::Exit {
                    worker,
                    code: None,
                    signal: Some(9),
                },
            )
            .unwrap();
        assert_eq!(flow, Flow::Finished);
        assert_eq!(router.stats().crashes, 1);
    }

    #[test]
    fn refused_respawn_is_not_fatal_while_others_run() {
        let host = RecordingHost {
            fail_attempt: Some(3),
            ..RecordingHost::default()
        };
        let (mut sup, mut rx) = supervisor(ClusterConfig::new(["a", "b", "c"], 2), host.clone());
        let mut events = sup.bus().subscribe();
        let mut router = Router::new();
        let mut online = Vec::new();

        sup.fill().unwrap();
        pump(&mut router, &mut sup, &mut rx, &mut online);
        let first = online.remove(0);

        let flow = router.route(&mut sup, exit(first, 0)).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(sup.running_count(), 1);
        assert!(!*host.terminated.lock().unwrap());

        let mut failed = None;
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::SpawnFailed {
                failed = ev.job.clone();
            }
        }
        assert_eq!(failed.as_deref(), Some("a"));

        // The next exit retries the kept job.
        let second = online.remove(0);
        router.route(&mut sup, exit(second, 0)).unwrap();
        pump(&mut router, &mut sup, &mut rx, &mut online);
        let jobs: Vec<String> = host
            .launches
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| l.job.clone())
            .collect();
        assert_eq!(jobs, ["c", "b", "a"]);

        let last = online.remove(0);
        assert_eq!(router.route(&mut sup, exit(last, 0)).unwrap(), Flow::Finished);
    }

    #[test]
    fn refused_respawn_with_nothing_running_is_an_error() {
        let host = RecordingHost {
            fail_attempt: Some(2),
            ..RecordingHost::default()
        };
        let (mut sup, mut rx) = supervisor(ClusterConfig::new(["a", "b"], 1), host);
        let mut router = Router::new();
        let mut online = Vec::new();

        sup.fill().unwrap();
        pump(&mut router, &mut sup, &mut rx, &mut online);
        let err = router.route(&mut sup, exit(online[0], 0)).unwrap_err();
        assert_eq!(err.as_label(), "runtime_spawn_failed");
        assert!(!sup.is_exhausted());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn messages_and_crashes_are_not_logged_above_debug() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (mut sup, _rx) = supervisor(ClusterConfig::new(["a"], 1), RecordingHost::default());
            let mut router = Router::new();
            let SpawnOutcome::Spawned(worker) = sup.try_spawn().unwrap() else {
                panic!("expected a spawn");
            };
            let message = ControlMessage::default().with_message("page 3 done");
            router
                .route(&mut sup, LifecycleSignal::Message { worker, message })
                .unwrap();
            router.route(&mut sup, exit(worker, 4)).unwrap();
            assert_eq!(router.stats().crashes, 1);
        });

        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.is_empty(), "unexpected output: {logged}");
    }

    /// Host signals buffered per worker; each worker's own order is kept.
    #[derive(Default)]
    struct Pending {
        lanes: BTreeMap<WorkerId, VecDeque<LifecycleSignal>>,
    }

    impl Pending {
        fn collect(&mut self, rx: &mut SignalReceiver) {
            while let Ok(sig) = rx.try_recv() {
                self.lanes.entry(sig.worker()).or_default().push_back(sig);
            }
        }

        fn take(&mut self, pick: u8) -> Option<LifecycleSignal> {
            let ready: Vec<WorkerId> = self
                .lanes
                .iter()
                .filter(|(_, lane)| !lane.is_empty())
                .map(|(w, _)| *w)
                .collect();
            if ready.is_empty() {
                return None;
            }
            let worker = ready[pick as usize % ready.len()];
            self.lanes.get_mut(&worker)?.pop_front()
        }

        fn push(&mut self, sig: LifecycleSignal) {
            self.lanes.entry(sig.worker()).or_default().push_back(sig);
        }
    }

    proptest! {
        #[test]
        fn limit_holds_under_interleaved_signals(
            jobs in 0usize..10,
            limit in 1usize..5,
            looping in any::<bool>(),
            choices in prop::collection::vec((any::<u8>(), 0u8..4), 0..96),
        ) {
            let queue: Vec<String> = (0..jobs).map(|i| format!("job-{i}")).collect();
            let host = RecordingHost::default();
            let cfg = ClusterConfig::new(queue.clone(), limit).with_looping(looping);
            let (mut sup, mut rx) = supervisor(cfg, host.clone());
            let mut router = Router::new();
            let mut pending = Pending::default();

            sup.fill().unwrap();
            prop_assert!(sup.running_count() <= limit);

            let mut choices = choices.into_iter();
            let mut steps = 0usize;
            loop {
                pending.collect(&mut rx);
                if looping && steps == 64 {
                    sup.stop_accepting();
                }
                let (pick, outcome) = choices.next().unwrap_or((0, 0));
                let Some(sig) = pending.take(pick) else { break };
                steps += 1;

                // Once a worker is online, it may talk before it exits.
                if let LifecycleSignal::Online { worker } = sig {
                    if outcome == 3 {
                        pending.push(LifecycleSignal::Message {
                            worker,
                            message: ControlMessage::action(Action::CheckQueue),
                        });
                    }
                    let code = if outcome == 1 { 2 } else { 0 };
                    pending.push(exit(worker, code));
                }

                let flow = router.route(&mut sup, sig).unwrap();
                prop_assert!(sup.running_count() <= limit);
                if flow == Flow::Finished {
                    break;
                }
            }

            prop_assert!(sup.is_finished());
            let exits = router.stats();
            prop_assert_eq!(exits.clean_exits + exits.crashes, sup.stats().spawned);

            let launched: Vec<String> = host
                .launches
                .lock()
                .unwrap()
                .iter()
                .map(|(_, l)| l.job.clone())
                .collect();
            prop_assert_eq!(launched.len() as u64, sup.stats().spawned);
            prop_assert!(launched.iter().all(|j| queue.contains(j)));
            if looping && jobs > 0 {
                prop_assert_eq!(sup.stats().peak_running, limit);
            } else {
                prop_assert_eq!(sup.stats().peak_running, limit.min(jobs));
            }
            if !looping {
                prop_assert_eq!(launched.len(), jobs);
                let distinct: BTreeSet<&String> = launched.iter().collect();
                prop_assert_eq!(distinct.len(), jobs);
            }
        }
    }
}
