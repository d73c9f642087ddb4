//! Command-line coordinator: runs a cluster document against a worker program.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{Level, info};

use clustervisor::logging::{self, LogConfig, LogFormat};
use clustervisor::{ClusterConfig, Coordinator, LogWriter, OsProcessHost, Subscribe, fault};

/// Run queued jobs as worker processes under a concurrency limit.
#[derive(Parser, Debug)]
#[command(name = "clustervisor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cluster document (JSON with QUEUE, WORKER_LIMIT, ARGS, ENV_VARIABLES, SILENT_MODE, LOOP).
    #[arg(short, long, env = "CLUSTERVISOR_CONFIG")]
    config: PathBuf,

    /// Program every worker runs.
    #[arg(short, long, env = "CLUSTERVISOR_EXEC")]
    exec: PathBuf,

    /// Log output format: pretty, compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let mut cfg = LogConfig::new();
        match (self.quiet, self.verbose) {
            (true, _) => cfg = cfg.with_filter("warn"),
            (false, 0) => {}
            (false, 1) => cfg = cfg.with_filter("clustervisor=debug,info"),
            (false, _) => cfg = cfg.with_filter("trace").with_level(Level::TRACE),
        }
        let mut cfg = cfg.with_env_overrides();
        if let Some(format) = self.log_format {
            cfg = cfg.with_format(format);
        }
        cfg
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_config());

    let cfg = match ClusterConfig::from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            let fault: fault::Fault = e.into();
            fault::handle(&fault);
            return ExitCode::from(fault.exit_code());
        }
    };

    let host = OsProcessHost::new(&cli.exec);
    info!(program = %host.program().display(), config = %cli.config.display(), "loaded cluster");

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    Coordinator::builder(cfg, host)
        .with_subscribers(subscribers)
        .build()
        .start_or_exit()
        .await
}
