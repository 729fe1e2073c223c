//! Faultline CLI
//!
//! - `serve`: HTTP query server over live (or fixture) telemetry
//! - `query`: evaluate one request program and print the JSON response
//! - `check`: validate relationship config, rules and query text offline

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use faultline_query::{parse_request, QueryRequest, RequestContext};

mod server;
mod settings;

use settings::{ListenArgs, SourceArgs};

#[derive(Parser)]
#[command(name = "faultline")]
#[command(
    author,
    version,
    about = "Faultline: root-cause queries over logs, traces and service dependencies"
)]
struct Cli {
    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `POST /query` and `GET /healthz` over HTTP/1.
    Serve(ServeArgs),

    /// Run one request program and print `{"results": [...], "count": n}`.
    Query(QueryArgs),

    /// Validate configuration and rule text without contacting any backend.
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    #[command(flatten)]
    listen: ListenArgs,

    #[command(flatten)]
    sources: SourceArgs,

    /// If set, write a small JSON file once the server is listening.
    ///
    /// Useful for scripts/tests to learn the chosen port when `--listen ...:0`.
    #[arg(long)]
    ready_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    /// Request program text, or `-` to read it from stdin.
    query: String,

    #[command(flatten)]
    sources: SourceArgs,

    /// Pretty-print the JSON response.
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug, Clone)]
struct CheckArgs {
    /// Relationship config to validate.
    #[arg(long, env = "RELATIONSHIP_CONFIG_PATH")]
    relationships: Option<PathBuf>,

    /// Extra base rules file to parse.
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Request program text to split into rules and a query pattern.
    #[arg(long)]
    query: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Serve(args) => cmd_serve(args),
        Commands::Query(args) => cmd_query(args),
        Commands::Check(args) => cmd_check(args),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

fn cmd_serve(args: ServeArgs) -> Result<()> {
    let orchestrator = args.sources.build_orchestrator()?;
    server::cmd_serve(
        server::ServerConfig {
            listen: args.listen.address(),
            ready_file: args.ready_file,
        },
        orchestrator,
    )
}

fn cmd_query(args: QueryArgs) -> Result<()> {
    let text = if args.query == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read query from stdin")?;
        buf
    } else {
        args.query
    };

    let orchestrator = args.sources.build_orchestrator()?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    let response = rt.block_on(async {
        let ctx = RequestContext::new();
        orchestrator.execute(&ctx, &QueryRequest::new(text)).await
    })?;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{rendered}");
    Ok(())
}

fn cmd_check(args: CheckArgs) -> Result<()> {
    if args.relationships.is_none() && args.rules.is_none() && args.query.is_none() {
        return Err(anyhow!(
            "check: pass at least one of --relationships, --rules or --query"
        ));
    }

    if let Some(path) = args.relationships.as_ref() {
        println!("{} {}", "Checking".green().bold(), path.display());
        let config = faultline_ingest::RelationshipConfig::load(path)
            .with_context(|| format!("invalid relationship config {}", path.display()))?;
        println!("  Services: {}", config.relationships.len());
        println!("  calls/2 facts: {}", config.pair_count());
    }

    if let Some(path) = args.rules.as_ref() {
        println!("{} {}", "Checking".green().bold(), path.display());
        let rules = settings::load_base_rules(Some(path))?;
        println!("  Base rules (including built-in): {}", rules.len());
        for clause in rules.clauses() {
            println!("    {}", clause.to_string().cyan());
        }
    }

    if let Some(text) = args.query.as_ref() {
        println!("{} query", "Checking".green().bold());
        let parsed = parse_request(text)?;
        println!("  Request rules: {}", parsed.rules.len());
        println!("  Pattern: {}", parsed.pattern.to_string().yellow());
    }

    println!("{}", "Valid.".green());
    Ok(())
}
