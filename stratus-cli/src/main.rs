use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use log::{info, warn};

use stratus_core::wait::{CancelToken, PollConfig};
use stratus_core::{Dispatcher, DispatcherConfig, Response};
use stratus_provider_aws::AwsConnector;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Reconcile one cloud infrastructure event", long_about = None)]
struct Cli {
    /// Event subject, `<type>.<action>.aws`
    #[arg(long)]
    subject: String,

    /// Path to the JSON event body, or `-` for stdin
    #[arg(long, default_value = "-")]
    body: String,

    /// Key for encrypted credentials; credentials are read in clear without it
    #[arg(long, env = "STRATUS_CRYPTO_KEY", hide_env_values = true)]
    crypto_key: Option<String>,

    /// Seconds between two provider probes
    #[arg(long, env = "STRATUS_POLL_INTERVAL_SECS", default_value_t = 2)]
    poll_interval_secs: u64,

    /// Give up waiting on the provider after this many seconds
    #[arg(long, env = "STRATUS_POLL_TIMEOUT_SECS")]
    poll_timeout_secs: Option<u64>,
}

impl Cli {
    fn config(&self) -> DispatcherConfig {
        let mut poll = PollConfig::default().with_interval(Duration::from_secs(self.poll_interval_secs));
        if let Some(timeout) = self.poll_timeout_secs {
            poll = poll.with_deadline(Duration::from_secs(timeout));
        }
        DispatcherConfig {
            crypto_key: self.crypto_key.clone(),
            poll,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Dispatch the event; `Ok(false)` means the event itself errored
async fn run(cli: &Cli) -> Result<bool, String> {
    let body = read_body(&cli.body)?;

    let (handle, token) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning in-flight waits");
            handle.cancel();
        }
    });

    let dispatcher = Dispatcher::new(Arc::new(AwsConnector::new()), &cli.config())
        .map_err(|e| e.to_string())?
        .with_cancel(token);
    let response = dispatcher.dispatch(&cli.subject, &body).await;

    print_response(&response)?;
    Ok(response.is_completed())
}

fn read_body(source: &str) -> Result<Vec<u8>, String> {
    if source == "-" {
        let mut body = Vec::new();
        io::stdin()
            .read_to_end(&mut body)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(body);
    }
    let path = Path::new(source);
    fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

fn print_response(response: &Response) -> Result<(), String> {
    let reply = response.reply_subject();
    if response.is_completed() {
        info!("{} {}", "Completed".green().bold(), reply);
    }
    eprintln!("{}", reply);

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&response.body)
        .and_then(|_| stdout.write_all(b"\n"))
        .map_err(|e| format!("Failed to write response: {}", e))
}
