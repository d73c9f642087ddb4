//! # Coordinator: sequencing loop, fan-out delivery, and graceful shutdown.
//!
//! The [`Coordinator`] owns the [`Supervisor`], the [`Router`] and the single receiving
//! end of the host's lifecycle channel. Every signal is applied by one loop, one at a
//! time, so the spawn gate never races with itself.
//!
//! ## High-level architecture
//! ```text
//! start():
//!   pre-start hook ──Err──► RuntimeError::Hook  (nothing spawned)
//!   subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   supervisor.fill()      (spawn up to the limit)
//!
//! Event loop:
//!   host tasks ── LifecycleSignal ──► mpsc ──► Router::route(&mut Supervisor, sig)
//!                                                    │
//!                                          Finished ─┴─► stop
//!
//! Shutdown path:
//!   shutdown_requested()
//!        └─► Bus.publish(ShutdownRequested)
//!        └─► supervisor.stop_accepting()
//!        └─► supervisor.terminate_all()   (host kills every worker)
//!        └─► keep routing exits until none run, at most cfg.grace
//!               ├─ all exited        ─► Ok(report)
//!               └─ grace exceeded    ─► RuntimeError::GraceExceeded { stuck }
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use clustervisor::{ClusterConfig, Coordinator, LogWriter, OsProcessHost, Subscribe};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let cfg = ClusterConfig::new(["site-a", "site-b", "site-c"], 2);
//!     Coordinator::builder(cfg, OsProcessHost::new("./scrape-worker"))
//!         .with_subscribers(vec![Arc::new(LogWriter::new()) as Arc<dyn Subscribe>])
//!         .build()
//!         .start_or_exit()
//!         .await
//! }
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::fault::{self, Fault};
use crate::host::{ProcessHost, SignalReceiver};
use crate::subscribers::{Subscribe, SubscriberSet};

use super::builder::CoordinatorBuilder;
use super::router::{Flow, Router};
use super::shutdown::shutdown_requested;
use super::supervisor::Supervisor;

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorReport {
    /// Workers spawned over the whole run (respawns included).
    pub spawned: u64,
    pub clean_exits: u64,
    pub crashes: u64,
    /// Highest number of simultaneously running workers.
    pub peak_running: usize,
    /// Spawn attempts turned away because the limit was reached.
    pub rejected: u64,
    /// True if the run ended because of an OS shutdown signal.
    pub shutdown: bool,
}

/// Drives workers for a job queue under a concurrency limit.
pub struct Coordinator {
    cfg: ClusterConfig,
    supervisor: Supervisor,
    router: Router,
    signals: SignalReceiver,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Coordinator {
    /// Starts building a coordinator for `cfg` whose workers run on `host`.
    pub fn builder(cfg: ClusterConfig, host: impl ProcessHost + 'static) -> CoordinatorBuilder {
        CoordinatorBuilder::new(cfg, Box::new(host))
    }

    pub(crate) fn new_internal(
        cfg: ClusterConfig,
        host: Box<dyn ProcessHost>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let supervisor = Supervisor::new(cfg.clone(), host, tx, bus);
        Self {
            cfg,
            supervisor,
            router: Router::new(),
            signals: rx,
            subscribers,
        }
    }

    /// Receiver for every event published after this call. Closed when the run ends.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.supervisor.bus().subscribe()
    }

    /// Runs until the queue is drained and every worker has exited, or until shutdown.
    ///
    /// An empty queue returns immediately. With `looping` set, only a shutdown signal
    /// (or a fatal error) ends the run.
    pub async fn start(mut self) -> Result<CoordinatorReport, RuntimeError> {
        let listener = self.subscriber_listener();
        info!(
            jobs = self.cfg.queue.len(),
            limit = self.supervisor.limit(),
            looping = self.cfg.looping,
            "coordinator starting"
        );

        let result = self.drive().await;
        if result.is_err() {
            self.supervisor.stop_accepting();
            self.supervisor.terminate_all();
        }

        let report = self.report(matches!(result, Ok(true)));
        self.supervisor.bus().publish(
            Event::new(EventKind::CoordinatorStopped)
                .with_load(self.supervisor.running_count(), None),
        );

        let Coordinator { supervisor, .. } = self;
        drop(supervisor);
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        result.map(|_| report)
    }

    /// Runs the coordinator and converts the outcome into a process exit code.
    ///
    /// Fatal errors are classified and logged via [`fault::handle`] first.
    pub async fn start_or_exit(self) -> ExitCode {
        match self.start().await {
            Ok(report) => {
                info!(
                    spawned = report.spawned,
                    clean = report.clean_exits,
                    crashed = report.crashes,
                    "coordinator finished"
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                let fault = Fault::from(e);
                fault::handle(&fault);
                ExitCode::from(fault.exit_code())
            }
        }
    }

    /// Returns `Ok(true)` when the run ended via an OS shutdown signal.
    async fn drive(&mut self) -> Result<bool, RuntimeError> {
        if let Some(hook) = self.cfg.pre_start.clone() {
            hook.before_start().await.map_err(RuntimeError::Hook)?;
        }

        self.supervisor.fill()?;
        if self.supervisor.is_finished() {
            debug!("nothing to run");
            return Ok(false);
        }

        let shutdown = shutdown_requested(self.cfg.handle_os_signals);
        tokio::pin!(shutdown);
        let grace = tokio::time::sleep(self.cfg.grace);
        tokio::pin!(grace);
        let mut stopping = false;

        loop {
            tokio::select! {
                res = &mut shutdown, if !stopping => {
                    let name = res.map_err(RuntimeError::Signal)?;
                    info!(signal = name, running = self.supervisor.running_count(), "shutdown requested");
                    self.supervisor.bus().publish(
                        Event::new(EventKind::ShutdownRequested)
                            .with_load(self.supervisor.running_count(), None)
                            .with_reason(name),
                    );
                    stopping = true;
                    self.supervisor.stop_accepting();
                    self.supervisor.terminate_all();
                    if let Some(deadline) = tokio::time::Instant::now().checked_add(self.cfg.grace) {
                        grace.as_mut().reset(deadline);
                    }
                    if self.supervisor.is_finished() {
                        return Ok(true);
                    }
                }
                sig = self.signals.recv() => {
                    let Some(sig) = sig else {
                        warn!("lifecycle channel closed");
                        return Ok(stopping);
                    };
                    if self.router.route(&mut self.supervisor, sig)? == Flow::Finished {
                        return Ok(stopping);
                    }
                }
                _ = &mut grace, if stopping => {
                    let stuck = self
                        .supervisor
                        .running_ids()
                        .into_iter()
                        .map(|id| id.get())
                        .collect();
                    return Err(RuntimeError::GraceExceeded {
                        grace: self.cfg.grace,
                        stuck,
                    });
                }
            }
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    fn subscriber_listener(&mut self) -> Option<JoinHandle<()>> {
        if self.subscribers.is_empty() {
            return None;
        }
        let mut rx = self.supervisor.bus().subscribe();
        let subs = std::mem::take(&mut self.subscribers);
        Some(tokio::spawn(async move {
            let set = SubscriberSet::new(subs);
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            let dropped = set.shutdown().await;
            if dropped > 0 {
                warn!(dropped, "subscribers missed events");
            }
        }))
    }

    fn report(&self, shutdown: bool) -> CoordinatorReport {
        let spawn = self.supervisor.stats();
        let exits = self.router.stats();
        CoordinatorReport {
            spawned: spawn.spawned,
            clean_exits: exits.clean_exits,
            crashes: exits.crashes,
            peak_running: spawn.peak_running,
            rejected: spawn.rejected,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::supervisor::tests::RecordingHost;
    use crate::fault::FaultPayload;
    use crate::hook::HookFn;

    #[tokio::test]
    async fn empty_queue_finishes_immediately() {
        let host = RecordingHost::default();
        let cfg = ClusterConfig::new(Vec::<String>::new(), 2)
            .with_os_signals(false)
            .with_looping(true);
        let report = Coordinator::builder(cfg, host.clone())
            .build()
            .start()
            .await
            .unwrap();
        assert_eq!(report, CoordinatorReport::default());
        assert!(host.launches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_hook_spawns_nothing() {
        let host = RecordingHost::default();
        let cfg = ClusterConfig::new(["a"], 1)
            .with_os_signals(false)
            .with_pre_start(HookFn::arc(|| async {
                Err(FaultPayload::Opaque("login refused".into()))
            }));
        let err = Coordinator::builder(cfg, host.clone())
            .build()
            .start()
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Hook(_)));
        assert!(host.launches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_is_fatal() {
        let host = RecordingHost {
            fail: true,
            ..RecordingHost::default()
        };
        let cfg = ClusterConfig::new(["a"], 1).with_os_signals(false);
        let err = Coordinator::builder(cfg, host.clone())
            .build()
            .start()
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "runtime_spawn_failed");
        assert_eq!(Fault::from(err).exit_code(), 1);
        assert!(*host.terminated.lock().unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_the_whole_run() {
        use crate::subscribers::Subscribe;
        use async_trait::async_trait;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Kinds(Mutex<Vec<EventKind>>);

        #[async_trait]
        impl Subscribe for Kinds {
            async fn on_event(&self, ev: &Event) {
                self.0.lock().unwrap().push(ev.kind);
            }
        }

        let kinds = Arc::new(Kinds::default());
        let host = RecordingHost::default();
        let cfg = ClusterConfig::new(Vec::<String>::new(), 1).with_os_signals(false);
        Coordinator::builder(cfg, host)
            .with_subscribers(vec![kinds.clone() as Arc<dyn Subscribe>])
            .build()
            .start()
            .await
            .unwrap();

        let seen = kinds.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![EventKind::QueueDrained, EventKind::CoordinatorStopped]
        );
    }
}
