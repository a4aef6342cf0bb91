//! vpsprobed - VPS metrics reporting agent.
//!
//! Samples host metrics from /proc, accumulates network byte counters across
//! reboots and counter resets, and posts HMAC-signed reports to a collector
//! on a fixed interval.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use vpsprobe_core::collector::{ProcfsSource, RealFs, read_hostname};
use vpsprobe_core::config::{Config, ConfigBuilder};
use vpsprobe_core::reporter::Reporter;
use vpsprobe_core::scheduler;
use vpsprobe_core::state::CounterStore;
use vpsprobe_core::transport::HttpTransport;
use vpsprobe_core::{GIT_SHA, VERSION};

/// VPS metrics reporting agent.
#[derive(Parser)]
#[command(name = "vpsprobed", about = "VPS metrics reporting agent", version)]
struct Args {
    /// Collector endpoint reports are POSTed to.
    #[arg(long, env = "PROBE_SERVER_URL")]
    server_url: Option<String>,

    /// Shared HMAC secret.
    #[arg(long, env = "PROBE_HMAC_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Node identifier. Defaults to the hostname.
    #[arg(long, env = "PROBE_NODE_ID")]
    node_id: Option<String>,

    /// Reporting interval in seconds.
    #[arg(short, long, env = "PROBE_INTERVAL_SECONDS", default_value = "10")]
    interval: u64,

    /// Filesystem whose usage is reported.
    #[arg(long, env = "PROBE_DISK_PATH", default_value = "/")]
    disk_path: PathBuf,

    /// File holding the persisted byte counters.
    #[arg(long, env = "PROBE_STATE_PATH", default_value = ConfigBuilder::DEFAULT_STATE_PATH)]
    state_path: PathBuf,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, env = "PROBE_PROC_PATH", default_value = "/proc")]
    proc_path: PathBuf,

    /// Timeout for one report delivery, in seconds.
    #[arg(long, env = "PROBE_TIMEOUT_SECONDS", default_value = "10")]
    timeout: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn builder(&self, hostname: Option<String>) -> ConfigBuilder {
        let mut builder = ConfigBuilder::new()
            .node_id(self.node_id.clone())
            .hostname(hostname)
            .interval(Duration::from_secs(self.interval))
            .disk_path(&self.disk_path)
            .state_path(&self.state_path)
            .proc_path(&self.proc_path)
            .send_timeout(Duration::from_secs(self.timeout));
        if let Some(url) = &self.server_url {
            builder = builder.server_url(url.as_str());
        }
        if let Some(secret) = &self.secret {
            builder = builder.secret(secret.as_str());
        }
        builder
    }
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = log_level(verbose, quiet);

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("vpsprobed={}", level).parse().expect("valid directive"))
        .add_directive(format!("vpsprobe_core={}", level).parse().expect("valid directive"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let hostname = read_hostname(&RealFs::new(), &args.proc_path);
    let config = match args.builder(hostname).build() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vpsprobed")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        on_signal.cancel();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    if let Err(code) = runtime.block_on(serve(config, cancel)) {
        std::process::exit(code);
    }
}

async fn serve(config: Config, cancel: CancellationToken) -> Result<(), i32> {
    info!("vpsprobed {} ({}) starting", VERSION, GIT_SHA);
    info!(
        server_url = %config.server_url,
        node_id = %config.node_id,
        interval_s = config.interval.as_secs(),
        disk = %config.disk_path.display(),
        state = %config.state_path.display(),
        proc = %config.proc_path.display(),
        "configuration loaded"
    );

    let transport = match HttpTransport::new(config.server_url.clone(), config.send_timeout) {
        Ok(transport) => transport,
        Err(e) => {
            error!("failed to create HTTP client: {}", e);
            return Err(1);
        }
    };

    let store = CounterStore::load(&config.state_path);
    let state = store.state();
    info!(
        boot_time = state.boot_time,
        total_rx = state.total_rx_bytes,
        total_tx = state.total_tx_bytes,
        "counter state loaded"
    );

    let source = ProcfsSource::new(RealFs::new(), &config.proc_path, &config.disk_path);
    let reporter = Reporter::new(&config, source, transport, store);

    let stats = scheduler::run(&reporter, config.interval, &cancel).await;
    info!(
        "vpsprobed stopped after {} cycles ({} failed)",
        stats.cycles, stats.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("vpsprobed").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0, false), Level::INFO);
        assert_eq!(log_level(1, false), Level::DEBUG);
        assert_eq!(log_level(3, false), Level::TRACE);
        assert_eq!(log_level(2, true), Level::ERROR);
    }

    #[test]
    fn test_args_into_config() {
        let args = parse(&[
            "--server-url",
            "https://probe.example.com/api/ingest",
            "--secret",
            "s3cr3t",
            "--interval",
            "30",
            "--timeout",
            "3",
            "--state-path",
            "/tmp/probe/state.json",
            "-vv",
        ]);
        assert_eq!(args.verbose, 2);

        let config = args.builder(Some("web01".into())).build().unwrap();
        assert_eq!(config.node_id, "web01");
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert_eq!(config.state_path, PathBuf::from("/tmp/probe/state.json"));
        assert_eq!(config.disk_path, PathBuf::from("/"));
        assert_eq!(config.proc_path, PathBuf::from("/proc"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let args = parse(&[
            "--server-url",
            "http://127.0.0.1:8080/ingest",
            "--secret",
            "k",
            "--node-id",
            "n1",
            "--interval",
            "0",
        ]);
        assert!(args.builder(None).build().is_err());
    }
}
