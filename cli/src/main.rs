//! chainpool CLI: discover, probe and exercise node client pools.
//!
//! Usage:
//! ```bash
//! # Print the endpoint registry for a chain
//! chainpool endpoints --chain-id irishub_1 --endpoints http://a:26657,http://b:26657
//!
//! # Health-check every endpoint
//! chainpool probe --config node.json
//!
//! # Start a pool, borrow one client and heartbeat it
//! chainpool borrow --config node.json --max 4 --init 2 --timeout 5000
//! ```

use std::env;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chainpool_core::{NodeClient, NodeSettings, PoolError};
use chainpool_http::{discover, source_for, HttpClientConfig, HttpNodeClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "endpoints" => cmd_endpoints(&args[2..]).await,
        "probe" => cmd_probe(&args[2..]).await,
        "borrow" => cmd_borrow(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainpool {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        match e.downcast_ref::<PoolError>() {
            Some(pool_err) if pool_err.is_fatal() => {
                tracing::error!(error = %pool_err, "cannot start without endpoints, aborting");
            }
            _ => eprintln!("Error: {e:#}"),
        }
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainpool {}", env!("CARGO_PKG_VERSION"));
    println!("Discover, probe and exercise blockchain node client pools\n");
    println!("USAGE:");
    println!("    chainpool <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    endpoints  Discover endpoints and print the registry");
    println!("    probe      Health-check every discovered endpoint");
    println!("    borrow     Start a pool, borrow a client, heartbeat and release it");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --config <FILE>         JSON node settings");
    println!("    --chain-id <ID>         Chain to serve");
    println!("    --endpoints <LIST>      Comma-separated node addresses");
    println!("    --discovery-url <URL>   Node list URL, `{{chain_id}}` is substituted");
    println!("    --max <N>               Maximum live clients");
    println!("    --init <N>              Clients created at startup");
    println!("    --timeout <MS>          Borrow / probe timeout in milliseconds  [default: 5000]");
}

async fn cmd_endpoints(args: &[String]) -> Result<()> {
    let settings = load_settings(args)?;
    let source = source_for(&settings)?;
    let registry = discover(&settings, source.as_ref()).await?;

    println!("Chain {}: {} endpoint(s)\n", settings.chain_id, registry.len());
    for endpoint in registry.iter() {
        println!("  {}  {}", endpoint.id(), endpoint.address());
    }
    Ok(())
}

async fn cmd_probe(args: &[String]) -> Result<()> {
    let settings = load_settings(args)?;
    let timeout = timeout_flag(args)?;
    let source = source_for(&settings)?;
    let registry = discover(&settings, source.as_ref()).await?;

    let config = HttpClientConfig {
        request_timeout: timeout,
        ..Default::default()
    };

    println!("Probing {} endpoint(s)...\n", registry.len());
    let mut healthy = 0usize;
    for endpoint in registry.iter() {
        let client = HttpNodeClient::connect(endpoint.address(), endpoint.id(), &config)?;
        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, client.health()).await;
        let latency = start.elapsed().as_millis();

        match outcome {
            Ok(Ok(())) => {
                healthy += 1;
                println!("  OK    {:>6}ms  {}", latency, endpoint.address());
            }
            Ok(Err(e)) => println!("  FAIL  {:>6}ms  {}  ({e})", latency, endpoint.address()),
            Err(_) => println!("  FAIL  {:>6}ms  {}  (timed out)", latency, endpoint.address()),
        }
    }
    println!("\n{healthy}/{} healthy", registry.len());
    Ok(())
}

async fn cmd_borrow(args: &[String]) -> Result<()> {
    let settings = load_settings(args)?;
    let timeout = timeout_flag(args)?;
    let pool = chainpool_http::init(&settings).await?;

    let result = async {
        let client = pool.get_client_with_timeout(timeout).await?;
        println!("Borrowed client #{} -> {}", client.id(), client.url());

        let start = Instant::now();
        match pool.heart_beat(&client).await {
            Ok(()) => {
                println!("  Heartbeat:  OK ({}ms)", start.elapsed().as_millis());
                pool.release(client).await;
            }
            Err(e) => {
                println!("  Heartbeat:  FAIL ({e})");
                pool.invalidate(client).await;
            }
        }
        Ok::<_, PoolError>(())
    }
    .await;

    let stats = pool.stats();
    println!("\nPool stats:");
    println!("  created:              {}", stats.created);
    println!("  destroyed:            {}", stats.destroyed);
    println!("  borrowed:             {}", stats.borrowed);
    println!("  returned:             {}", stats.returned);
    println!("  validation failures:  {}", stats.validation_failures);
    println!("  idle / active:        {} / {}", stats.idle, stats.active);

    pool.close().await;
    result.map_err(anyhow::Error::from)
}

/// Settings from `--config`, with command-line flags taking precedence.
fn load_settings(args: &[String]) -> Result<NodeSettings> {
    let mut settings = match parse_flag(args, "--config") {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            NodeSettings::from_json(&json)?
        }
        None => NodeSettings::new(String::new(), 4, 1),
    };

    if let Some(chain_id) = parse_flag(args, "--chain-id") {
        settings.chain_id = chain_id;
    }
    if let Some(max) = parse_flag(args, "--max") {
        settings.max_connection_num = max.parse().context("--max must be a number")?;
    }
    if let Some(init) = parse_flag(args, "--init") {
        settings.init_connection_num = init.parse().context("--init must be a number")?;
    }
    if let Some(list) = parse_flag(args, "--endpoints") {
        settings.endpoints = Some(list);
    }
    if let Some(url) = parse_flag(args, "--discovery-url") {
        settings.discovery_url = Some(url);
    }

    if settings.chain_id.is_empty() {
        bail!("--chain-id is required (or set `chain_id` in --config)");
    }
    Ok(settings)
}

fn timeout_flag(args: &[String]) -> Result<Duration> {
    let ms = match parse_flag(args, "--timeout") {
        Some(v) => v.parse().context("--timeout must be milliseconds")?,
        None => 5_000,
    };
    Ok(Duration::from_millis(ms))
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}
