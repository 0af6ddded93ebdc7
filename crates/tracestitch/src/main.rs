mod demo;
mod output;
mod telemetry;

use std::io::Read;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracestitch_core::codec::{BlobCompression, WireCodec};
use tracestitch_core::config::Config;
use tracestitch_core::context::TraceContext;
use tracestitch_core::model::Trace;
use tracestitch_http::{PropagateConfig, PropagateLayer, RespondLayer, TracedClient};

use crate::demo::DemoState;
use crate::output::print_trace_human;
use crate::telemetry::{LogFormat, init_cli_tracing, init_serve_tracing};

#[derive(Parser, Debug)]
#[command(name = "tracestitch")]
#[command(about = "Propagate profiling traces across HTTP calls and inspect the result")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run a traced demo service")]
    Serve {
        #[arg(long)]
        addr: Option<String>,
        #[arg(long, help = "Service name used in step names")]
        name: Option<String>,
        #[arg(long, help = "URL called from every /work request")]
        downstream: Option<String>,
    },
    #[command(about = "Call a URL with a local trace and print the stitched result")]
    Call {
        url: String,
        #[arg(long, help = "Do not bracket the call in its own step")]
        no_step: bool,
    },
    #[command(about = "Decode a trace blob from an argument or stdin")]
    Decode {
        blob: Option<String>,
        #[arg(long)]
        compression: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            addr,
            name,
            downstream,
        } => {
            init_serve_tracing(LogFormat::from_env());
            run_server(addr, name, downstream).await
        }
        Commands::Call { url, no_step } => {
            init_cli_tracing();
            run_call(&url, no_step, cli.json).await
        }
        Commands::Decode { blob, compression } => {
            init_cli_tracing();
            run_decode(blob, compression, cli.json)
        }
    }
}

async fn run_server(
    addr: Option<String>,
    name: Option<String>,
    downstream: Option<String>,
) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = addr {
        cfg.listen_addr = v;
    }
    let name = name.unwrap_or_else(|| "demo".to_string());

    eprintln!("tracestitch serve");
    eprintln!("  listen: {}", cfg.listen_addr);
    eprintln!("  name: {name}");
    eprintln!("  tracing: {}", if cfg.enabled { "on" } else { "off" });
    if let Some(url) = &downstream {
        eprintln!("  downstream: {url}");
    }

    let client = reqwest::Client::builder()
        .timeout(cfg.request_timeout)
        .build()
        .context("build http client")?;
    let state = DemoState {
        name,
        downstream,
        client,
        propagate: PropagateConfig::from_config(&cfg),
    };
    let app = demo::router(state, RespondLayer::from_config(&cfg));

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serve")?;
    Ok(())
}

async fn run_call(url: &str, no_step: bool, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load().context("load config")?;
    let ctx = if cfg.enabled {
        TraceContext::new()
    } else {
        TraceContext::disabled()
    };
    ctx.start(format!("tracestitch call {url}"));

    let mut propagate = PropagateConfig::from_config(&cfg);
    if no_step {
        propagate.add_step = false;
    }
    let layer = PropagateLayer::from_context(&ctx).with_config(propagate);
    let http = reqwest::Client::builder()
        .timeout(cfg.request_timeout)
        .build()
        .context("build http client")?;
    let client = TracedClient::new(http, &layer);

    let result = client.get(url).await;
    let trace = ctx.stop();
    let response = result.with_context(|| format!("GET {url}"))?;
    let status = response.status();

    match trace {
        Some(trace) => print_trace(&trace, json)?,
        None => println!("status={status} (tracing disabled)"),
    }
    if !json {
        let stats = client.stats();
        println!(
            "status={status} merged={} skipped={} failed={}",
            stats.merged(),
            stats.skipped(),
            stats.failures()
        );
    }
    Ok(())
}

fn run_decode(blob: Option<String>, compression: Option<String>, json: bool) -> anyhow::Result<()> {
    let cfg = Config::from_env().unwrap_or_default();
    let compression = match compression {
        Some(name) => BlobCompression::parse(&name)?,
        None => cfg.compression,
    };
    let blob = match blob {
        Some(b) => b,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read blob from stdin")?;
            buf
        }
    };
    let trace = WireCodec::new(compression)
        .decode(&blob)
        .context("decode trace blob")?;
    print_trace(&trace, json)
}

fn print_trace(trace: &Trace, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(trace)?);
    } else {
        print_trace_human(trace);
    }
    Ok(())
}
