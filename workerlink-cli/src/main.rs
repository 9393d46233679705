//! CLI for talking to the gateway's worker process.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;
use workerlink::{Client, Config, Connector, Operation, Service, Session, TransportKind, Value};

#[derive(Parser)]
#[command(name = "workerlink", version, about = "Request/reply client for the worker process")]
struct Cli {
    #[command(flatten)]
    link: LinkArgs,

    #[command(subcommand)]
    command: Command,
}

/// Connection settings shared by every subcommand.
#[derive(Args)]
struct LinkArgs {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Worker endpoint (tcp://host:port).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Socket type: zmq (default) or tcp.
    #[arg(long, global = true)]
    transport: Option<TransportKind>,

    /// File holding the worker's negotiated port.
    #[arg(long, global = true)]
    port_file: Option<PathBuf>,

    /// Per-attempt reply timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Attempts per request before giving up.
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Log filter (RUST_LOG takes precedence).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Show worker build and runtime information.
    Info,

    /// List tracked network sessions.
    Sessions {
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Ask the worker to reject a request.
    TestError,

    /// Manage report queries.
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Keep a supervised link open until SIGINT or SIGTERM.
    Run(run::RunArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Subcommands for `workerlink query`.
#[derive(Subcommand)]
enum QueryAction {
    /// Create a query and print its id.
    Create {
        /// Query definition (JSON); `-` reads it from stdin.
        body: String,
    },
    /// Print the rows of a query.
    Data {
        /// Query id.
        id: u64,
    },
    /// Release a query.
    Close {
        /// Query id.
        id: u64,
    },
}

/// Output format for list commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.link.log_level);
    if let Err(e) = cli.dispatch().await {
        eprintln!("workerlink: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        if let Command::Completion { shell } = self.command {
            clap_complete::generate(
                shell,
                &mut Self::command(),
                "workerlink",
                &mut std::io::stdout(),
            );
            return Ok(());
        }

        let config = self.link.config()?;
        match config.transport {
            TransportKind::Tcp => {
                let client = Client::connect_tcp(&config)?;
                execute(self.command, client, config).await
            }
            _ => {
                let client = Client::connect(&config)?;
                execute(self.command, client, config).await
            }
        }
    }
}

/// Runs `command` on `client`, which is closed afterwards.
async fn execute<C: Connector>(
    command: Command,
    client: Client<C>,
    config: Config,
) -> Result<()> {
    let value = match command {
        Command::Info => request(&client, &config, Service::Worker, Operation::Info, None).await,
        Command::Sessions { format } => {
            match request(&client, &config, Service::Worker, Operation::Sessions, None).await {
                Ok(Value::Sessions(table)) => {
                    client.close().await;
                    return print_sessions(&table, format);
                }
                other => other,
            }
        }
        Command::TestError => {
            request(&client, &config, Service::Worker, Operation::TestError, None).await
        }
        Command::Query { action } => {
            let (op, data) = match action {
                QueryAction::Create { body } => (Operation::QueryCreate, read_body(body).await?),
                QueryAction::Data { id } => (Operation::QueryData, id.to_string()),
                QueryAction::Close { id } => (Operation::QueryClose, id.to_string()),
            };
            request(&client, &config, Service::Reports, op, Some(data)).await
        }
        Command::Run(args) => return run::run(client, &config, args).await,
        Command::Completion { .. } => unreachable!("handled in dispatch"),
    };
    client.close().await;
    print_value(&value?);
    Ok(())
}

impl LinkArgs {
    /// Config file (or defaults), then environment, then flags.
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        }
        .apply_env()?;

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.parse()?;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(path) = &self.port_file {
            config.port_file = Some(path.clone());
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout_ms = ms;
        }
        if let Some(retries) = self.retries {
            config.request_retries = retries;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Runs a single exchange, naming the request and endpoint on failure.
async fn request<C: Connector>(
    client: &Client<C>,
    config: &Config,
    service: Service,
    operation: Operation,
    data: Option<String>,
) -> Result<Value> {
    client
        .send_request(service, operation, data)
        .await
        .with_context(|| format!("{service:?}/{operation:?} via {}", config.endpoint))
}

async fn read_body(body: String) -> Result<String> {
    if body != "-" {
        return Ok(body);
    }
    let mut buf = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buf)
        .await
        .context("reading query body from stdin")?;
    Ok(buf)
}

fn print_value(value: &Value) {
    match value {
        Value::Info(text) | Value::QueryData(text) | Value::QueryStatus(text) => {
            println!("{text}");
        }
        Value::QueryId(id) => println!("{id}"),
        Value::Sessions(table) => println!("{} sessions", table.len()),
        Value::None => println!("ok"),
    }
}

fn print_sessions(table: &[Session], format: OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(table)?);
        return Ok(());
    }

    if table.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    println!(
        "{:<10} {:<5} {:<28} {:<28} {:>10} {:>10}",
        "ID", "PROTO", "CLIENT", "SERVER", "TX", "RX"
    );
    for s in table {
        println!(
            "{:<10} {:<5} {:<28} {:<28} {:>10} {:>10}",
            s.id,
            proto_name(s.protocol),
            format!("{}:{}", s.client_addr, s.client_port),
            format!("{}:{}", s.server_addr, s.server_port),
            human_size(s.client_bytes),
            human_size(s.server_bytes),
        );
    }
    Ok(())
}

fn proto_name(protocol: u8) -> String {
    match protocol {
        1 => "icmp".into(),
        6 => "tcp".into(),
        17 => "udp".into(),
        n => n.to_string(),
    }
}

/// Formats bytes into a human-readable size string.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}
