//! MEV Pipeline CLI
//! Reads hex-encoded raw transactions from stdin, one per line

use bytes::Bytes;
use mev_pipeline::{ChannelSubmitter, Config, MevEngine};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::env;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const SUBMIT_QUEUE: usize = 1_024;
const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && args[1] == "benchmark" {
        mev_pipeline::run_all_benchmarks();
        return Ok(());
    }

    let config = Config::from_env()?;
    init_logging(&config);

    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║          MEV PIPELINE v0.1.0                                  ║");
    println!("║          Sandwich detection | Bundle construction            ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    if let Some(addr) = &config.metrics.listen_addr {
        let addr: SocketAddr = addr.parse()?;
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "✅ Prometheus exporter listening");
    }

    let block_interval = config.network.block_interval();
    let (submitter, bundles) = ChannelSubmitter::new(SUBMIT_QUEUE);
    let engine = Arc::new(MevEngine::new(config, Arc::new(submitter))?);
    info!("✅ Engine ready, reading transactions from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut blocks = tokio::time::interval(block_interval);
    let mut stats = tokio::time::interval(STATS_INTERVAL);
    let mut block = 0u64;
    let mut window_count = 0u64;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let raw = match read_input(line) {
                    Input::Tx(raw) => raw,
                    Input::Skip => continue,
                    Input::Closed => break,
                };
                window_count += 1;
                let found = tokio::task::block_in_place(|| engine.process_shared(&raw));
                if found {
                    debug!(bytes = raw.len(), "opportunity found");
                }
            }
            _ = blocks.tick() => {
                block += 1;
                engine.sync_state(block);
                for bundle in bundles.try_iter() {
                    info!(block, bytes = bundle.len(), bundle = %hex::encode(&bundle), "📦 bundle ready for relay");
                }
            }
            _ = stats.tick() => {
                let elapsed = window_start.elapsed().as_secs_f64();
                info!(
                    "📊 Stats | {} | Rate: {:.1}/s",
                    engine.snapshot(),
                    window_count as f64 / elapsed.max(f64::EPSILON)
                );
                window_count = 0;
                window_start = Instant::now();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
        }
    }

    for bundle in bundles.try_iter() {
        info!(bytes = bundle.len(), bundle = %hex::encode(&bundle), "📦 bundle ready for relay");
    }
    engine.shutdown();
    println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
    info!("✅ MEV Pipeline shutdown complete");
    Ok(())
}

enum Input {
    Tx(Bytes),
    Skip,
    Closed,
}

/// One stdin read. Bad lines are skipped; only EOF or a broken stream
/// ends the loop, so shutdown still runs.
fn read_input(line: std::io::Result<Option<String>>) -> Input {
    let line = match line {
        Ok(Some(line)) => line,
        Ok(None) => {
            info!("stdin closed");
            return Input::Closed;
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            warn!(error = %e, "skipping undecodable input line");
            return Input::Skip;
        }
        Err(e) => {
            warn!(error = %e, "stdin read failed");
            return Input::Closed;
        }
    };
    let line = line.trim();
    if line.is_empty() {
        return Input::Skip;
    }
    match hex::decode(line.trim_start_matches("0x")) {
        Ok(raw) => Input::Tx(Bytes::from(raw)),
        Err(e) => {
            warn!(error = %e, "skipping non-hex input line");
            Input::Skip
        }
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if config.logging.json_output {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_bad_lines_do_not_end_input() {
        let utf8 = io::Error::new(ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        assert!(matches!(read_input(Err(utf8)), Input::Skip));
        assert!(matches!(read_input(Ok(Some("not hex".into()))), Input::Skip));
        assert!(matches!(read_input(Ok(Some("   ".into()))), Input::Skip));
    }

    #[test]
    fn test_hex_lines_and_end_of_input() {
        match read_input(Ok(Some(" 0xc080 \n".into()))) {
            Input::Tx(raw) => assert_eq!(raw.as_ref(), &[0xc0, 0x80]),
            _ => panic!("expected a transaction"),
        }
        assert!(matches!(read_input(Ok(None)), Input::Closed));
        let broken = io::Error::new(ErrorKind::BrokenPipe, "closed");
        assert!(matches!(read_input(Err(broken)), Input::Closed));
    }
}
