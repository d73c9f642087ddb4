//! Dual-mode binary: the same executable is the coordinator and every worker.
//!
//! ```text
//! cargo run --example scrape
//! ```
//! The coordinator re-runs itself for each job; inside a worker, `worker::is_worker()`
//! is true and the job body runs once.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clustervisor::worker::{self, WorkerContext};
use clustervisor::{
    Action, ClusterConfig, ControlMessage, Coordinator, HookFn, LogWriter, OsProcessHost,
    Subscribe, WorkerError,
};

async fn scrape(ctx: Arc<WorkerContext>) -> Result<(), WorkerError> {
    let site = ctx.job().to_string();
    ctx.send(&ControlMessage::default().with_message(format!("scraping {site}")))
        .await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    if site == "flaky.example" {
        ctx.send(&ControlMessage::action(Action::HandleError).with_message("retry later"))
            .await?;
    }

    ctx.send(&ControlMessage::action(Action::CheckQueue).with_message(format!("{site} done")))
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    clustervisor::logging::init(clustervisor::logging::LogConfig::new().with_env_overrides());

    if worker::is_worker() {
        return worker::start_job(scrape).await;
    }

    let host = match OsProcessHost::current_exe() {
        Ok(host) => host,
        Err(e) => {
            eprintln!("cannot locate own executable: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cfg = ClusterConfig::new(
        ["a.example", "b.example", "flaky.example", "c.example"],
        2,
    )
    .with_env("SCRAPER_USER_AGENT", "clustervisor-demo")
    .with_pre_start(HookFn::arc(|| async {
        tracing::info!("warming up");
        Ok(())
    }));

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    Coordinator::builder(cfg, host)
        .with_subscribers(subs)
        .build()
        .start_or_exit()
        .await
}
