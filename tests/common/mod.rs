#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clustervisor::{HostError, LifecycleSignal, ProcessHost, SignalSender, WorkerId, WorkerLaunch};

/// What a scripted worker does once online.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Exit(i32),
    /// Exit with the code after a job-specific delay.
    ExitAfter(i32, Duration),
    Hang,
}

#[derive(Debug, Default)]
pub struct HostLog {
    pub launches: Vec<WorkerLaunch>,
    pub live: usize,
    pub max_live: usize,
    pub terminate_calls: usize,
}

/// In-process host: each "worker" is a tokio task that reports an exit after `delay`.
pub struct ScriptedHost {
    next: u64,
    attempts: usize,
    failing: Vec<usize>,
    delay: Duration,
    script: Arc<dyn Fn(&str) -> Outcome + Send + Sync>,
    pub log: Arc<Mutex<HostLog>>,
}

impl ScriptedHost {
    pub fn new(script: impl Fn(&str) -> Outcome + Send + Sync + 'static) -> Self {
        Self {
            next: 0,
            attempts: 0,
            failing: Vec::new(),
            delay: Duration::from_millis(2),
            script: Arc::new(script),
            log: Arc::default(),
        }
    }

    /// Makes the given 1-based spawn attempt fail with a host error.
    pub fn failing_attempt(mut self, attempt: usize) -> Self {
        self.failing.push(attempt);
        self
    }

    pub fn log(&self) -> Arc<Mutex<HostLog>> {
        Arc::clone(&self.log)
    }
}

impl ProcessHost for ScriptedHost {
    fn spawn(&mut self, launch: WorkerLaunch, signals: SignalSender) -> Result<WorkerId, HostError> {
        self.attempts += 1;
        if self.failing.contains(&self.attempts) {
            return Err(HostError::MissingPipe);
        }
        self.next += 1;
        let id = WorkerId::new(self.next);
        let outcome = (self.script)(&launch.job);
        {
            let mut log = self.log.lock().unwrap();
            log.launches.push(launch);
            log.live += 1;
            log.max_live = log.max_live.max(log.live);
        }
        let _ = signals.send(LifecycleSignal::Fork { worker: id });
        let _ = signals.send(LifecycleSignal::Online { worker: id });

        let exit = match outcome {
            Outcome::Exit(code) => Some((code, self.delay)),
            Outcome::ExitAfter(code, delay) => Some((code, delay)),
            Outcome::Hang => None,
        };
        if let Some((code, delay)) = exit {
            let log = Arc::clone(&self.log);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                log.lock().unwrap().live -= 1;
                let _ = signals.send(LifecycleSignal::Exit {
                    worker: id,
                    code: Some(code),
                    signal: None,
                });
            });
        }
        Ok(id)
    }

    fn terminate_all(&mut self) {
        self.log.lock().unwrap().terminate_calls += 1;
    }
}

pub fn jobs(log: &Arc<Mutex<HostLog>>) -> Vec<String> {
    log.lock()
        .unwrap()
        .launches
        .iter()
        .map(|l| l.job.clone())
        .collect()
}
