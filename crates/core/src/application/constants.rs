// Queue engine constants (no magic values)

/// Depth of each subscriber's delivery channel.
/// Holds the one in-flight envelope; a delivery completes only when the
/// consumer acknowledges it, so this adds no buffering.
pub const SUBSCRIBER_CHANNEL_DEPTH: usize = 1;

/// First id handed out to a subscriber of a fresh queue
pub const FIRST_SUBSCRIBER_ID: u64 = 1;
