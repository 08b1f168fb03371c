mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use chattail_logs::{FileSink, Publisher, Scheduler, SourcePoller, StdoutSink};
use chattail_source::{FileSource, SnapshotSource};

use crate::config::{Config, PublisherConfig, SinkConfig};

/// Chattail - follow a game client's chat buffers and print only new messages
#[derive(Parser, Debug)]
#[command(name = "chattail")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults to one public chat publisher)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Snapshot document written by the client exporter
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Minimum pause between polling cycles, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Upper bound on a single source read, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Also append every batch to this file
    #[arg(long, value_name = "FILE")]
    append: Option<PathBuf>,

    /// Do not print batches to stdout
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only messages
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::defaults(),
    };
    apply_overrides(&mut config, &args);

    let path = config
        .source
        .path
        .clone()
        .context("no snapshot source, pass --source or set [source].path")?;
    let source: Arc<dyn SnapshotSource> = Arc::new(FileSource::new(path.clone()));
    let timeout = config.scheduler.fetch_timeout();

    // Build everything before starting any loop
    let publishers = config
        .publishers
        .iter()
        .map(|publisher| build_publisher(publisher, Arc::clone(&source), timeout))
        .collect::<Result<Vec<_>>>()?;

    let mut scheduler = Scheduler::new(config.scheduler.scheduler_config());
    for publisher in publishers {
        scheduler.spawn(publisher);
    }
    info!(source = %path.display(), publishers = scheduler.len(), "watching");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    let report = scheduler.shutdown().await;
    if report.failed_closes > 0 || report.panicked > 0 {
        warn!(
            failed_closes = report.failed_closes,
            panicked = report.panicked,
            "shutdown was not clean"
        );
    }

    Ok(())
}

/// Fold command line flags into the loaded config
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(path) = &args.source {
        config.source.path = Some(path.clone());
    }
    if let Some(ms) = args.interval_ms {
        config.scheduler.min_interval_ms = ms;
    }
    if let Some(ms) = args.timeout_ms {
        config.scheduler.fetch_timeout_ms = ms;
    }

    for publisher in &mut config.publishers {
        if args.quiet {
            publisher.sinks.retain(|sink| *sink != SinkConfig::Stdout);
        }
        if let Some(path) = &args.append {
            publisher.sinks.push(SinkConfig::File { path: path.clone() });
        }
    }
}

fn build_publisher(
    config: &PublisherConfig,
    source: Arc<dyn SnapshotSource>,
    timeout: Duration,
) -> Result<Publisher> {
    let poller = SourcePoller::new(source, config.buffer.as_str()).with_timeout(timeout);
    let filter = config
        .compile_filter()
        .with_context(|| format!("publisher '{}'", config.name))?;

    let mut publisher = Publisher::new(config.name.as_str(), poller, config.aligner_config())
        .with_context(|| format!("publisher '{}'", config.name))?
        .with_compiled_filter(filter)
        .with_every_ticks(config.every_ticks);

    for sink in &config.sinks {
        match sink {
            SinkConfig::Stdout => publisher.add_subscriber(StdoutSink::new()),
            SinkConfig::File { path } => publisher.add_subscriber(open_file_sink(path)?),
        }
    }

    if publisher.subscriber_count() == 0 {
        warn!(publisher = %publisher.name(), "publisher has no sinks, batches will be dropped");
    }

    Ok(publisher)
}

fn open_file_sink(path: &Path) -> Result<FileSink> {
    FileSink::open(path).with_context(|| format!("failed to open {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["chattail"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::defaults();
        let args = args(&[
            "--source",
            "snap.json",
            "--interval-ms",
            "900",
            "--quiet",
            "--append",
            "chat.log",
        ]);
        apply_overrides(&mut config, &args);

        assert_eq!(config.source.path, Some(PathBuf::from("snap.json")));
        assert_eq!(config.scheduler.min_interval_ms, 900);
        assert_eq!(
            config.publishers[0].sinks,
            vec![SinkConfig::File {
                path: PathBuf::from("chat.log")
            }]
        );
    }

    #[test]
    fn test_build_publisher_with_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PublisherConfig::public_chat();
        config.sinks.push(SinkConfig::File {
            path: dir.path().join("chat.log"),
        });

        let source: Arc<dyn SnapshotSource> = Arc::new(FileSource::new(dir.path().join("snap.json")));
        let publisher = build_publisher(&config, source, Duration::from_millis(100)).unwrap();
        assert_eq!(publisher.name(), "public-chat");
        assert_eq!(publisher.subscriber_count(), 2);
        assert!(dir.path().join("chat.log").exists());
    }

    #[test]
    fn test_build_publisher_rejects_bad_sizing() {
        let mut config = PublisherConfig::public_chat();
        config.window = 0;
        let source: Arc<dyn SnapshotSource> = Arc::new(FileSource::new("snap.json"));
        assert!(build_publisher(&config, source, Duration::from_millis(100)).is_err());
    }
}
