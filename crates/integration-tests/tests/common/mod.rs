//! Shared harness: a real broker server on an ephemeral port

#![allow(dead_code)]

use fanout_api_http::{HttpServer, HttpServerConfig, ServerHandle};
use fanout_core::{shutdown_channel, Broker, QueueConfig, ShutdownSender};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub base: String,
    pub broker: Arc<Broker>,
    pub client: Client,
    pub shutdown: ShutdownSender,
    pub handle: ServerHandle,
}

impl TestServer {
    pub async fn start(queues: &[QueueConfig]) -> Self {
        let broker = Arc::new(Broker::new(queues));
        let (shutdown, token) = shutdown_channel();
        let config = HttpServerConfig {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        };
        let handle = HttpServer::new(config, Arc::clone(&broker))
            .start(token)
            .await
            .expect("server start");

        Self {
            base: format!("http://{}", handle.local_addr),
            broker,
            client: Client::new(),
            shutdown,
            handle,
        }
    }

    pub async fn publish(&self, queue: &str, body: &str) -> StatusCode {
        self.client
            .post(format!("{}/queues/{}/messages", self.base, queue))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("publish")
            .status()
    }

    pub async fn subscribe(&self, queue: &str) -> Response {
        self.client
            .post(format!("{}/queues/{}/subscriptions", self.base, queue))
            .send()
            .await
            .expect("subscribe")
    }

    pub async fn queue_stats(&self, queue: &str) -> Value {
        self.client
            .get(format!("{}/queues/{}", self.base, queue))
            .send()
            .await
            .expect("stats")
            .json()
            .await
            .expect("stats body")
    }

    /// Poll until the queue reports `expected` attached subscribers
    pub async fn wait_for_subscribers(&self, queue: &str, expected: u64) {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                if self.queue_stats(queue).await["subscribers"] == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber count never reached");
    }
}

/// Reads newline-delimited JSON from a streaming response
pub struct LineReader {
    response: Response,
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            pending: Vec::new(),
        }
    }

    /// Next decoded message, or `None` once the server ends the stream
    pub async fn next(&mut self) -> Option<Value> {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = self.pending.drain(..=pos).collect();
                    return Some(serde_json::from_slice(&line).expect("json line"));
                }
                match self.response.chunk().await.expect("chunk") {
                    Some(chunk) => self.pending.extend_from_slice(&chunk),
                    None => return None,
                }
            }
        })
        .await
        .expect("no message within timeout")
    }
}
