//! One-shot block exchange client.
//!
//! Sends a single batch of random tokens and reports how many blocks came
//! back. Request failures are logged; only bad arguments change the exit code.

use block_exchange::client::{self, CLIENT_TIMEOUT};
use block_exchange::directory::MAX_HASH_SIZE;
use block_exchange::error::ClientError;
use block_exchange::protocols::exchange::codec;
use block_exchange::protocols::http::{Method, Request, Version};
use bytes::Bytes;
use clap::error::ErrorKind;
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Send one token batch to a block exchange server
#[derive(Parser, Debug)]
#[command(name = "block-exchange-client")]
#[command(version)]
struct Args {
    host: String,

    port: u16,

    /// Request target, e.g. /
    target: String,

    /// HTTP version: 1.0 or 1.1 (default)
    version: Option<String>,

    /// Number of random tokens in the batch
    #[arg(long, default_value_t = 20)]
    tokens: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(&args).await {
        error!(error = %e, "Request failed");
    }
    ExitCode::SUCCESS
}

async fn run(args: &Args) -> Result<(), ClientError> {
    let version = match args.version.as_deref() {
        Some("1.0") => Version::Http10,
        _ => Version::Http11,
    };
    let hashes: Vec<Bytes> = (0..args.tokens).map(|_| random_token()).collect();

    let request = Request::new(Method::Get, args.target.as_str(), version)
        .header("Host", args.host.as_str())
        .header("Content-Type", "text/html")
        .with_body(codec::encode_request(&hashes));

    let addr = client::host_port(&args.host, args.port);
    let response = client::exchange(&addr, &request, CLIENT_TIMEOUT).await?;

    if response.status != 200 {
        info!(
            status = response.status,
            reason = %response.reason,
            body = %String::from_utf8_lossy(&response.body),
            "Server rejected request"
        );
        return Ok(());
    }

    let batch = codec::decode_response(&response.body)?;
    info!(sent = hashes.len(), blocks = batch.len(), "Received blocks");
    Ok(())
}

fn random_token() -> Bytes {
    rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(MAX_HASH_SIZE)
        .collect::<Vec<u8>>()
        .into()
}
