//! Subscription Streaming
//!
//! Adapts a queue subscription into an HTTP body stream. The subscriber is
//! detached from its queue when the stream is dropped, which is how a client
//! disconnect turns into `unsubscribe`.

use bytes::{BufMut, Bytes, BytesMut};
use fanout_core::{Message, Queue, Subscription};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Owns a subscription and unsubscribes it on drop
pub struct SubscriptionGuard {
    queue: Arc<Queue>,
    subscription: Subscription,
}

impl SubscriptionGuard {
    pub fn new(queue: Arc<Queue>, subscription: Subscription) -> Self {
        Self {
            queue,
            subscription,
        }
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.subscription.recv().await
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.queue.unsubscribe(self.subscription.id());
        debug!(
            queue = %self.queue.name(),
            subscriber_id = self.subscription.id(),
            "Subscription stream closed"
        );
    }
}

/// Newline-delimited stream of delivered messages
///
/// Ends when the queue removes the subscriber (close or unsubscribe).
pub fn ndjson_stream(
    guard: SubscriptionGuard,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures::stream::unfold(guard, |mut guard| async move {
        let message = guard.recv().await?;
        Some((Ok(encode_line(&message)), guard))
    })
}

/// One message followed by a newline
pub fn encode_line(message: &Message) -> Bytes {
    let mut line = BytesMut::with_capacity(message.len() + 1);
    line.extend_from_slice(message.as_bytes());
    line.put_u8(b'\n');
    line.freeze()
}
