//! rsload - Adaptive Pipelining Bulk Loader
//!
//! This is the main entry point for the rsload binary.
//! It parses arguments, connects to the server, and runs the loader over the
//! chosen input.

use anyhow::Context;
use rsload::config::LoaderConfig;
use rsload::connection::Connection;
use rsload::pipeline::{replay, Loader};
use rsload::protocol::{spawn_decoder, ValueReader};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line configuration
struct Config {
    /// Host to connect to
    host: String,
    /// Port to connect to
    port: u16,
    /// Password for AUTH, if any
    password: Option<String>,
    /// Input file; stdin when absent
    input: Option<PathBuf>,
    /// Forward raw statements instead of decoded values
    raw: bool,
    loader: LoaderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: rsload::DEFAULT_HOST.to_string(),
            port: rsload::DEFAULT_PORT,
            password: None,
            input: None,
            raw: false,
            loader: LoaderConfig::default(),
        }
    }
}

/// Returns the value following flag `args[i]`, or exits.
fn flag_value<'a>(args: &'a [String], i: usize) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v,
        None => {
            eprintln!("Error: {} requires a value", args[i]);
            std::process::exit(1);
        }
    }
}

/// Parses a flag value, or exits.
fn parse_flag<T: std::str::FromStr>(args: &[String], i: usize) -> T {
    flag_value(args, i).parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}", args[i]);
        std::process::exit(1);
    })
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = flag_value(&args, i).to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = parse_flag(&args, i);
                    i += 2;
                }
                "--auth" | "-a" => {
                    config.password = Some(flag_value(&args, i).to_string());
                    i += 2;
                }
                "--chunk-max" => {
                    config.loader.sizing.max_chunk_size = parse_flag::<usize>(&args, i).max(1);
                    i += 2;
                }
                "--chunk-target-ms" => {
                    config.loader.sizing.target = Duration::from_millis(parse_flag(&args, i));
                    i += 2;
                }
                "--pause" => {
                    let fraction: f64 = parse_flag(&args, i);
                    if !(0.0..=1.0).contains(&fraction) {
                        eprintln!("Error: --pause must be between 0 and 1");
                        std::process::exit(1);
                    }
                    config.loader.sizing.pause_fraction = fraction;
                    i += 2;
                }
                "--growth" => {
                    let factor: usize = parse_flag(&args, i);
                    config.loader.sizing.growth_factor = (factor > 0).then_some(factor);
                    i += 2;
                }
                "--capacity" => {
                    let capacity: usize = parse_flag(&args, i);
                    config.loader.channel_capacity = (capacity > 0).then_some(capacity);
                    i += 2;
                }
                "--raw" => {
                    config.raw = true;
                    i += 1;
                }
                "--verbose" => {
                    config.loader.verbose = true;
                    i += 1;
                }
                "--chunk-info" => {
                    config.loader.chunk_info = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("rsload version {}", rsload::VERSION);
                    std::process::exit(0);
                }
                "-" => {
                    config.input = None;
                    i += 1;
                }
                arg if !arg.starts_with('-') => {
                    config.input = Some(PathBuf::from(arg));
                    i += 1;
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the server address as a string
    fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
rsload - Adaptive Pipelining Bulk Loader

USAGE:
    rsload [OPTIONS] [FILE]

    Reads RESP-encoded commands from FILE (or stdin when FILE is absent or -)
    and pipelines them into the server.

OPTIONS:
    -h, --host <HOST>            Server host (default: 127.0.0.1)
    -p, --port <PORT>            Server port (default: 6379)
    -a, --auth <PASSWORD>        Send AUTH before loading
        --chunk-max <N>          Maximum statements per chunk (default: 10000)
        --chunk-target-ms <MS>   Target round trip per chunk (default: 250)
        --pause <FRACTION>       Pause after each chunk, as a fraction of its time (default: 0.1)
        --growth <N>             Maximum chunk growth per round trip, 0 = unbounded (default: 2)
        --capacity <N>           Decode channel capacity, 0 = unbounded (default: 1024)
        --raw                    Forward raw statements without decoding them
        --verbose                Log every request and reply
        --chunk-info             Log sizing details after every chunk
    -v, --version                Print version information
        --help                   Print this help message

EXAMPLES:
    rsload dump.resp                     # Load into 127.0.0.1:6379
    rsload -p 6380 -a secret dump.resp   # Authenticate first
    cat dump.resp | rsload --chunk-info  # Read stdin, show the controller
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let default_level = if config.loader.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Connect and authenticate
    let mut conn = Connection::connect(config.server_address())
        .await
        .with_context(|| format!("unable to connect to {}", config.server_address()))?;
    if let Some(password) = &config.password {
        conn.authenticate(password).await?;
    }

    // Open the input
    let input: Box<dyn AsyncRead + Unpin + Send> = match &config.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("unable to open file {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    info!(
        server = %conn.peer_addr(),
        input = %config.input.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".to_string()),
        raw = config.raw,
        "Starting load"
    );

    let loader_config = config.loader;
    let (writer, responses, _decoder) =
        conn.into_parts(loader_config.channel_capacity, loader_config.max_depth);

    let outcome = if config.raw {
        replay(BufReader::new(input), writer, responses, &loader_config).await
    } else {
        let reader = ValueReader::new(input).with_max_depth(loader_config.max_depth);
        let (input, _) = spawn_decoder(reader, loader_config.channel_capacity, "input");
        Loader::new(writer, responses, loader_config).run(input).await
    };

    match outcome {
        Ok(totals) => {
            println!("{}", totals);
            Ok(())
        }
        Err(aborted) => {
            println!("{}", aborted.totals);
            error!(error = %aborted.cause, "Load aborted");
            Err(aborted.into())
        }
    }
}
