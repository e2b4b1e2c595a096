//! `chatlink` — line-oriented console client for a single conversation.
//!
//! Binds a live session over WebSocket, prints events as they arrive, and
//! reads outgoing messages line by line from stdin. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/chatlink/config.toml`).
//!
//! ```bash
//! cargo run --bin chatlink -- --ws-url ws://127.0.0.1:8000 \
//!     --api-url http://127.0.0.1:8000 \
//!     --csrf-token "$TOKEN" --user-id 7 --conversation 42
//! ```
//!
//! Console commands: `/read` marks the conversation read, `/retry`
//! restarts connection attempts after the reconnect budget ran out,
//! `/rest <text>` posts a message over HTTP instead of the socket, and
//! `/quit` closes the session cleanly.

use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use url::Url;

use chatlink::config::{CliArgs, ClientConfig};
use chatlink::fallback::FallbackSender;
use chatlink::session::{SessionBinding, SessionEvent, SessionHandle};
use chatlink::transport::ws::WsConnector;
use chatlink_proto::id::{ConversationId, UserId};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    init_logging(&cli.log_level);

    let Some(conversation) = cli.conversation else {
        eprintln!("Error: --conversation is required");
        return ExitCode::FAILURE;
    };
    let Some(ws_url) = config.ws_url.clone() else {
        eprintln!("Error: no WebSocket URL configured (--ws-url or [server] ws_url)");
        return ExitCode::FAILURE;
    };
    let Some(csrf_token) = config.csrf_token.clone() else {
        eprintln!("Error: no CSRF token configured (--csrf-token or [server] csrf_token)");
        return ExitCode::FAILURE;
    };
    let Some(user_id) = config.user_id else {
        eprintln!("Error: no user id configured (--user-id or [server] user_id)");
        return ExitCode::FAILURE;
    };
    let ws_base = match Url::parse(&ws_url) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("Error: invalid WebSocket URL {ws_url}: {e}");
            return ExitCode::FAILURE;
        }
    };

    // The REST path is optional; without it /rest is unavailable.
    let fallback = match config.api_url.as_deref().map(Url::parse) {
        Some(Ok(u)) => Some(FallbackSender::new(u, csrf_token.clone())),
        Some(Err(e)) => {
            eprintln!("Warning: invalid API URL, REST fallback disabled: {e}");
            None
        }
        None => None,
    };

    tracing::info!(conversation, "chatlink starting");

    let conversation = ConversationId::new(conversation);
    let mut binding = SessionBinding::new(conversation, UserId::new(user_id));
    binding.reconnect = config.reconnect;
    binding.typing_debounce = config.typing_debounce;
    binding.peer_typing_safety = config.peer_typing_safety;
    binding.event_buffer = config.event_buffer;

    let connector = WsConnector::new(ws_base, csrf_token);
    let (session, events) = SessionHandle::bind(connector, binding);

    run_console(&session, events, fallback.as_ref(), conversation).await;

    tracing::info!("chatlink exiting");
    ExitCode::SUCCESS
}

/// Initialize logging to stderr, keeping stdout for conversation output.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}

/// Main console loop: multiplex stdin lines against session events.
async fn run_console(
    session: &SessionHandle,
    mut events: mpsc::Receiver<SessionEvent>,
    fallback: Option<&FallbackSender>,
    conversation: ConversationId,
) {
    let mut lines = stdin_lines();

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    handle_line(session, fallback, conversation, line.trim()).await;
                }
                None => {
                    // stdin closed, shut down and drain remaining events.
                    let _ = session.shutdown().await;
                    while let Some(event) = events.recv().await {
                        print_event(&event);
                    }
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }
}

/// Dispatch one console line: a slash command or a message to send.
async fn handle_line(
    session: &SessionHandle,
    fallback: Option<&FallbackSender>,
    conversation: ConversationId,
    line: &str,
) {
    if line.is_empty() {
        return;
    }

    if line == "/quit" {
        if session.shutdown().await.is_err() {
            eprintln!("session already closed");
        }
    } else if line == "/read" {
        if session.mark_read().await.is_err() {
            eprintln!("session already closed");
        }
    } else if line == "/retry" {
        if session.retry_connect().await.is_err() {
            eprintln!("session already closed");
        }
    } else if let Some(content) = line.strip_prefix("/rest ") {
        let Some(sender) = fallback else {
            eprintln!("no API URL configured, /rest unavailable");
            return;
        };
        match sender.send_message(conversation, content, None).await {
            Ok(stored) => {
                // Fold the stored message in so the channel echo dedups.
                session.record_stored(&stored);
                println!("[rest] stored as message {:?}", stored.id);
            }
            Err(e) => eprintln!("[rest] send failed: {e}"),
        }
    } else {
        // The console only sees whole lines, so the keystroke and the
        // send land together: the burst opens and closes in one step.
        let _ = session.keystroke().await;
        match session.send_message(line).await {
            Ok(tag) => tracing::debug!(%tag, "message handed to session"),
            Err(e) => eprintln!("send failed: {e}"),
        }
    }
}

/// Print one session event in a compact console form.
fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => println!("* channel {state}"),
        SessionEvent::Reconnecting {
            attempt,
            max_attempts,
            delay,
        } => println!(
            "* reconnecting in {delay:?} (attempt {attempt}/{max_attempts})"
        ),
        SessionEvent::ReconnectFailed => {
            println!("* reconnect budget exhausted; /retry to try again");
        }
        SessionEvent::MessageConfirmed { tag } => println!("* delivered ({tag})"),
        SessionEvent::MessageReceived { message } => {
            println!("<{}> {}", message.sender_id, message.content);
            if let Some(url) = &message.file_url {
                println!("    attachment: {url}");
            }
        }
        SessionEvent::MessageQueued { .. } => {
            println!("* offline, message queued for next connection");
        }
        SessionEvent::PeerTyping { is_typing } => {
            if *is_typing {
                println!("* peer is typing...");
            }
        }
        SessionEvent::MessagesRead => println!("* peer read your messages"),
        SessionEvent::UserStatus {
            user_id,
            online,
            last_seen,
        } => {
            if *online {
                println!("* user {user_id} is online");
            } else {
                let seen = last_seen.as_deref().unwrap_or("unknown");
                println!("* user {user_id} went offline (last seen {seen})");
            }
        }
        SessionEvent::Notification {
            conversation_id,
            message,
        } => println!(
            "* new message in conversation {conversation_id} from {}",
            message.sender_id
        ),
    }
}

/// Feed stdin lines into an async channel.
///
/// Blocking reads happen on a plain thread so the runtime never stalls on
/// console input. The channel closes when stdin reaches EOF.
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
