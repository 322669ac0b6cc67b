use njvox_protocol::frames::EventFrame;

/// Where the orchestrator pushes unsolicited events for one connected
/// client. A thin seam over whatever the transport actually is (WS, the
/// dev REPL) — the orchestrator never touches a socket directly.
#[async_trait::async_trait]
pub trait TurnSink: Send + Sync {
    /// Push one event. `Err` means the transport is gone — the caller
    /// stops emitting further events for this turn but keeps consuming
    /// the agent stream so `recover_message` has something to replay.
    async fn emit(&self, event: EventFrame) -> Result<(), SinkClosed>;
}

#[derive(Debug, Clone, Copy)]
pub struct SinkClosed;

impl std::fmt::Display for SinkClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport sink closed")
    }
}

impl std::error::Error for SinkClosed {}
