//! The channel user Map/Reduce code pushes emitted pairs onto.
//!
//! `Sink` wraps a bounded `tokio::sync::mpsc` channel with
//! `emit`/`emit_intermediate` as the two names the capability interface
//! exposes (mechanically identical underneath — the name only documents
//! intent at the call site).

use crate::mr::codec::KeyValue;
use tokio::sync::mpsc;

/// Capacity mirrors the original's `make(chan KV, 100)` sizing for the
/// map-phase emit channel.
pub const SINK_CAPACITY: usize = 100;

pub struct Sink {
    tx: mpsc::Sender<KeyValue>,
}

impl Sink {
    pub fn channel() -> (Self, mpsc::Receiver<KeyValue>) {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        (Self { tx }, rx)
    }

    /// Used by Map implementations: emit zero or more intermediate pairs.
    pub fn emit_intermediate(&self, key: impl Into<String>, value: impl Into<String>) {
        self.push(key, value);
    }

    /// Used by Reduce implementations: emit exactly one pair per call.
    pub fn emit(&self, key: impl Into<String>, value: impl Into<String>) {
        self.push(key, value);
    }

    fn push(&self, key: impl Into<String>, value: impl Into<String>) {
        let kv = KeyValue::new(key, value);
        // blocking_send because Map/Reduce transforms run as plain
        // synchronous closures, not async fns — mirrors the original
        // blocking on a full channel rather than dropping emits.
        if self.tx.blocking_send(kv).is_err() {
            // Receiver already dropped (drained and closed); nothing
            // further can observe this emit, so there's nothing to do.
        }
    }
}

impl Clone for Sink {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitted_pairs_are_received_in_order() {
        let (sink, mut rx) = Sink::channel();
        sink.emit_intermediate("a", "1");
        sink.emit_intermediate("b", "2");
        drop(sink);

        let mut received = Vec::new();
        while let Ok(kv) = rx.try_recv() {
            received.push(kv);
        }
        assert_eq!(
            received,
            vec![KeyValue::new("a", "1"), KeyValue::new("b", "2")]
        );
    }
}
