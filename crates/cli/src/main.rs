//! Fanout CLI - Command-line client for the Fanout broker

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tabled::{Table, Tabled};

const DEFAULT_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Fanout pub/sub broker CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Broker base URL
    #[arg(long, env = "FANOUT_URL", default_value = DEFAULT_URL)]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream messages from a queue until interrupted or the queue closes
    Subscribe {
        /// Queue name
        queue: String,

        /// Pretty-print each message
        #[arg(short, long)]
        pretty: bool,
    },

    /// Publish a JSON message to a queue
    Publish {
        /// Queue name
        queue: String,

        /// Message body as a JSON string
        payload: String,
    },

    /// List queues with their current state
    Queues,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct QueueList {
    queues: Vec<QueueRow>,
}

#[derive(Deserialize, Tabled)]
struct QueueRow {
    name: String,
    capacity: usize,
    max_subscribers: usize,
    buffered: usize,
    subscribers: usize,
    closed: bool,
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Turn a non-success response into an error carrying the broker's message
async fn check_status(response: Response, expected: StatusCode) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }

    match response.json::<ErrorBody>().await {
        Ok(body) => bail!("{} ({}): {}", status, body.code, body.message),
        Err(_) => bail!("unexpected status {}", status),
    }
}

/// Splits a byte stream into complete lines
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

fn render_message(line: &[u8], pretty: bool) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_slice(line).context("Received a malformed message")?;
    let rendered = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        value.to_string()
    };
    Ok(rendered)
}

async fn subscribe(client: &Client, base: &str, queue: &str, pretty: bool) -> Result<()> {
    let url = endpoint(base, &format!("/queues/{}/subscriptions", queue));
    let response = client
        .post(&url)
        .send()
        .await
        .context("Failed to connect to broker")?;
    let mut response = check_status(response, StatusCode::OK).await?;

    eprintln!("{}", format!("✓ Subscribed to {}", queue).green().bold());

    let mut lines = LineBuffer::default();
    let mut received = 0usize;
    while let Some(chunk) = response.chunk().await.context("Stream interrupted")? {
        for line in lines.push(&chunk) {
            println!("{}", render_message(&line, pretty)?);
            received += 1;
        }
    }

    eprintln!(
        "{}",
        format!("Stream closed after {} message(s)", received).yellow()
    );
    Ok(())
}

async fn publish(client: &Client, base: &str, queue: &str, payload: &str) -> Result<()> {
    let body: serde_json::Value = serde_json::from_str(payload).context("Invalid JSON payload")?;

    let url = endpoint(base, &format!("/queues/{}/messages", queue));
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .context("Failed to connect to broker")?;
    check_status(response, StatusCode::ACCEPTED).await?;

    println!("{}", format!("✓ Message published to {}", queue).green().bold());
    Ok(())
}

async fn list_queues(client: &Client, base: &str) -> Result<()> {
    let response = client
        .get(endpoint(base, "/queues"))
        .send()
        .await
        .context("Failed to connect to broker")?;
    let list: QueueList = check_status(response, StatusCode::OK)
        .await?
        .json()
        .await
        .context("Failed to parse response")?;

    if list.queues.is_empty() {
        println!("{}", "No queues configured".yellow());
        return Ok(());
    }

    println!("{}", Table::new(list.queues));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match &cli.command {
        Commands::Subscribe { queue, pretty } => subscribe(&client, &cli.url, queue, *pretty).await,
        Commands::Publish { queue, payload } => publish(&client, &cli.url, queue, payload).await,
        Commands::Queues => list_queues(&client, &cli.url).await,
    }
}
