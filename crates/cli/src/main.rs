//! CLI for the Tally ERC20 activity scanner.
//!
//! Pipeline: fetch recent blocks -> classify recipients -> count activity -> report.

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_analyzer::pipeline::DEFAULT_CONCURRENCY;
use tally_analyzer::reporter::Report;
use tally_analyzer::sink::json_stream::JsonStreamSink;
use tally_analyzer::{BatchClassifier, CancelPolicy, ClassifierConfig};
use tally_core::TallyError;
use tally_provider::config::DEFAULT_ENDPOINT;
use tally_provider::{BlockDataProvider, ProviderConfig, RpcProvider};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Most active ERC20 addresses in recent blocks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Full node URL. Takes precedence over --endpoint/--api-key.
    #[arg(long, env = "TALLY_RPC_URL")]
    rpc_url: Option<String>,

    #[arg(long, env = "GETBLOCK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Per-call deadline for one eth_getCode request.
    #[arg(long, default_value_t = 10)]
    fetch_timeout_secs: u64,
}

impl ConnectionArgs {
    fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            rpc_url: self.rpc_url.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank the most active addresses across ERC20 transactions.
    Scan {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Number of recent blocks to scan.
        #[arg(short, long, default_value_t = 100)]
        blocks: usize,

        /// How many addresses to rank.
        #[arg(short, long, default_value_t = 5)]
        top: usize,

        /// Max concurrent contract-code fetches.
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// Cancel the scan after this many seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Fail instead of reporting partial results when cancelled.
        #[arg(long, default_value_t = false)]
        strict: bool,

        #[arg(long, default_value_t = false)]
        json: bool,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long)]
        sink: Option<String>,
    },

    /// Print the ERC20 selector table.
    Selectors,

    /// Check whether the code at one address looks like an ERC20 token.
    Classify {
        #[command(flatten)]
        conn: ConnectionArgs,

        #[arg(short, long)]
        address: Address,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional: a missing .env is not an error.
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            conn,
            blocks,
            top,
            concurrency,
            deadline_secs,
            strict,
            json,
            sink,
        } => {
            let config = ClassifierConfig::default()
                .with_concurrency(concurrency)
                .with_fetch_timeout(Duration::from_secs(conn.fetch_timeout_secs))
                .with_cancel_policy(if strict {
                    CancelPolicy::Fail
                } else {
                    CancelPolicy::Partial
                });
            // Reject a bad sink before any RPC work.
            let sink = sink.as_deref().map(SinkTarget::parse).transpose()?;
            let cancel = shutdown_token(deadline_secs.map(Duration::from_secs));

            run_scan(&conn, config, &cancel, blocks, top, json, sink).await?;
        }
        Commands::Selectors => {
            for (signature, selector) in tally_core::erc20_selectors().iter() {
                println!("0x{selector}  {signature}");
            }
        }
        Commands::Classify { conn, address } => {
            let provider = Arc::new(RpcProvider::connect(&conn.provider_config()).await?);
            let config = ClassifierConfig::default()
                .with_fetch_timeout(Duration::from_secs(conn.fetch_timeout_secs));
            let classifier = BatchClassifier::new(provider, config)?;

            let verdict = classifier.classify_address(address).await?;
            if !verdict.contract.has_code() {
                println!("{address}: no code (not a contract)");
            } else if verdict.compatible {
                println!("{address}: ERC20 compatible");
            } else {
                println!("{address}: not ERC20 compatible");
                for sig in &verdict.missing {
                    println!("  missing {sig}");
                }
            }
        }
    }

    Ok(())
}

/// Where `--sink` sends NDJSON rows.
#[derive(Debug, PartialEq, Eq)]
enum SinkTarget {
    Stdout,
    File(String),
}

impl SinkTarget {
    fn parse(spec: &str) -> Result<Self, TallyError> {
        if spec == "ndjson" {
            return Ok(SinkTarget::Stdout);
        }
        match spec.strip_prefix("ndjson:") {
            Some(path) if !path.is_empty() => Ok(SinkTarget::File(path.to_string())),
            _ => Err(TallyError::InvalidInput(format!(
                "unknown sink {spec:?}, use 'ndjson' or 'ndjson:/path'"
            ))),
        }
    }
}

/// Token cancelled on Ctrl-C or when the optional deadline passes.
fn shutdown_token(deadline: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling scan");
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(?deadline, "deadline reached, cancelling scan");
            on_deadline.cancel();
        });
    }

    cancel
}

async fn run_scan(
    conn: &ConnectionArgs,
    config: ClassifierConfig,
    cancel: &CancellationToken,
    block_count: usize,
    top: usize,
    json: bool,
    sink: Option<SinkTarget>,
) -> Result<(), Box<dyn std::error::Error>> {
    let t0 = Instant::now();

    tracing::info!(
        blocks = block_count,
        top,
        concurrency = config.max_concurrent,
        "starting scan"
    );

    // 1. Fetch blocks from RPC.
    let provider = Arc::new(RpcProvider::connect(&conn.provider_config()).await?);
    let blocks = tokio::select! {
        _ = cancel.cancelled() => return Err(TallyError::Cancelled.into()),
        res = provider.fetch_recent_blocks(block_count) => res?,
    };
    let t_fetch = t0.elapsed();
    tracing::info!(
        blocks = blocks.len(),
        elapsed_ms = t_fetch.as_millis(),
        "fetched blocks"
    );

    // 2. Classify and count.
    let classifier = BatchClassifier::new(provider, config)?;
    let scan = tally_analyzer::scan_blocks(&classifier, cancel, &blocks).await?;
    let ranked = scan.counter.top_k(top);
    let t_total = t0.elapsed();

    tracing::info!(
        erc20_txs = scan.erc20_txs,
        addresses = scan.counter.len(),
        failed = scan.stats.failed,
        elapsed_ms = t_total.as_millis(),
        "scan complete"
    );

    // 3. Build report.
    let report = Report::build(&scan, &ranked, t_fetch, t_total);

    // 4. Sink output.
    if let Some(target) = sink {
        let (summary, rows) = report.to_rows();

        match target {
            SinkTarget::Stdout => {
                let mut s = JsonStreamSink::stdout();
                s.write_summary(&summary)?;
                s.write_activity(&rows)?;
                let n = s.finish()?;
                tracing::info!(rows = n, "ndjson sink: wrote to stdout");
            }
            SinkTarget::File(path) => {
                let file = std::fs::File::create(&path)?;
                let mut s = JsonStreamSink::new(file);
                s.write_summary(&summary)?;
                s.write_activity(&rows)?;
                let n = s.finish()?;
                tracing::info!(rows = n, path = %path, "ndjson sink: wrote to file");
            }
        }

        // Still print report to stderr so it's visible.
        eprint!("{}", report.render());
    } else if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
    } else {
        print!("{}", report.render());
    }

    Ok(())
}
