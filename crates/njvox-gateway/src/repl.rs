//! Dev-only CLI REPL: free-text in, orchestrator turns out, over an
//! in-process transport rather than a socket. Exits on EOF or `quit`.

use std::sync::Arc;

use njvox_chat::{SinkClosed, TurnSink};
use njvox_protocol::frames::EventFrame;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::AppState;

/// Prints every pushed event straight to stdout instead of a socket.
struct StdoutSink;

#[async_trait::async_trait]
impl TurnSink for StdoutSink {
    async fn emit(&self, event: EventFrame) -> Result<(), SinkClosed> {
        match event.event.as_str() {
            "message_chunk" => {
                if let Some(chunk) = event.payload.as_ref().and_then(|p| p.get("chunk")).and_then(|c| c.as_str()) {
                    print!("{chunk}");
                    use std::io::Write;
                    std::io::stdout().flush().ok();
                }
            }
            "message_end" => println!(),
            "error" => {
                if let Some(message) = event.payload.as_ref().and_then(|p| p.get("message")).and_then(|m| m.as_str())
                {
                    eprintln!("[error] {message}");
                }
            }
            "session_created" => {
                if let Some(sid) = event.payload.as_ref().and_then(|p| p.get("session_id")).and_then(|s| s.as_str()) {
                    eprintln!("[session {sid}]");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

pub async fn run(state: Arc<AppState>, user_id: String) -> anyhow::Result<()> {
    let sink = StdoutSink;
    let mut session_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("njvox dev repl — type a message, 'quit' to exit");
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" {
            break;
        }

        state
            .chat
            .handle_turn(&sink, "repl", &user_id, session_id.as_deref(), None, trimmed)
            .await;

        if session_id.is_none() {
            if let Ok(sessions) = state.sessions.list_sessions(&user_id) {
                session_id = sessions.first().map(|s| s.session_id.clone());
            }
        }
    }

    println!("goodbye");
    Ok(())
}
