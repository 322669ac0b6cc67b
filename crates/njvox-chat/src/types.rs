use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Tracks one assistant turn that is still streaming, keyed by `session_id`
/// in the orchestrator's registry. Survives a client disconnect so that
/// `recover_message` can replay the partial buffer on reconnect.
pub struct InFlightTurn {
    pub user_message_id: String,
    pub transport_sid: String,
    pub started_at: Instant,
    partial_buffer: Mutex<String>,
    next_sequence: AtomicU64,
}

impl InFlightTurn {
    pub fn new(user_message_id: String, transport_sid: String) -> Self {
        Self {
            user_message_id,
            transport_sid,
            started_at: Instant::now(),
            partial_buffer: Mutex::new(String::new()),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Appends a newly produced segment to the partial buffer and returns
    /// the sequence number assigned to it. Sequence numbers are dense and
    /// strictly increasing within a turn.
    pub fn record_chunk(&self, text: &str) -> u64 {
        let seq = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.partial_buffer.lock().unwrap().push_str(text);
        seq
    }

    pub fn partial_text(&self) -> String {
        self.partial_buffer.lock().unwrap().clone()
    }

    pub fn age(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
