//! `peerchat`: line-oriented conversation demo.
//!
//! Talks to a simulated peer over an in-process loopback contact. Every
//! stdin line is sent; the peer acknowledges after a configurable delay and
//! optionally echoes it back, answering the last message it has seen.
//!
//! ```bash
//! cargo run --bin peerchat -- --peer-name bob
//!
//! # Debug logging to a file
//! PEERCHAT_LOG=debug cargo run --bin peerchat -- --log-file /tmp/peerchat.log
//! ```

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use peerchat::config::{CliArgs, ClientConfig};
use peerchat::contact::loopback::LoopbackContact;
use peerchat::contact::{Contact, ContactEvent, PeerId};
use peerchat::conversation::{Association, Conversation, ConversationEvent, MessageView};
use peerchat::dispatch::{self, ConversationHandle};
use peerchat_proto::message::{OutgoingMessage, SendOutcome, Timestamp};
use peerchat_proto::presence::PresenceStatus;

type DemoHandle = ConversationHandle<LoopbackContact>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(peer = %config.peer_name, "peerchat starting");

    let (peer, me) = LoopbackContact::create_pair(
        PeerId::new(config.local_name.clone()),
        PeerId::new(config.peer_name.clone()),
    );

    let (mut conversation, events) = Conversation::new(config.conversation.clone());
    let contact_events = match conversation.set_contact(Some(peer.clone())) {
        Association::Attached(events) => Some(events),
        Association::Unchanged | Association::Detached => None,
    };
    let (handle, task) = dispatch::spawn(conversation, contact_events, config.channel_capacity);

    if config.echo {
        tokio::spawn(run_echo_peer(me, config.ack_delay));
    }
    tokio::spawn(print_changes(
        events,
        handle.clone(),
        config.timestamp_format.clone(),
    ));

    println!(
        "chatting with {} (commands: /clear /read /online /offline /fail /dump /quit)",
        config.peer_name
    );
    run_input(&handle, &peer, &config).await?;

    handle.shutdown().await?;
    let conversation = task.await?;
    tracing::info!(messages = conversation.len(), "peerchat stopped");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// Logs go to `file_path` through a non-blocking writer when given, to
/// stderr otherwise. `RUST_LOG` overrides `level`. The returned guard must
/// be held until exit so buffered lines are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(log_path) = file_path else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Read stdin line by line until EOF or `/quit`.
async fn run_input(
    handle: &DemoHandle,
    peer: &LoopbackContact,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut fail_next = false;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/clear" => handle.clear().await?,
            "/read" => handle.reset_unread_count().await?,
            "/online" => peer.set_presence(PresenceStatus::Online),
            "/offline" => peer.set_presence(PresenceStatus::Offline),
            "/fail" => {
                fail_next = true;
                println!("next message will fail");
            }
            "/dump" => {
                let snapshot = handle.snapshot().await?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            _ => {
                if handle.send_message(line).await?.is_some() {
                    let outcome = SendOutcome::from_success(!std::mem::take(&mut fail_next));
                    tokio::spawn(acknowledge(peer.clone(), config.ack_delay, outcome));
                }
            }
        }
    }
    Ok(())
}

/// Resolve the oldest in-flight message after `delay`.
async fn acknowledge(peer: LoopbackContact, delay: Duration, outcome: SendOutcome) {
    tokio::time::sleep(delay).await;
    if let Some(submitted) = peer.complete_next(outcome) {
        tracing::debug!(correlation_id = %submitted.correlation_id, ?outcome, "peer acknowledged");
    }
}

/// Simulated peer: answers every message it receives.
async fn run_echo_peer(me: LoopbackContact, delay: Duration) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = me.subscribe(tx);
    let connection = me.connection();

    while let Some(event) = rx.recv().await {
        let ContactEvent::IncomingMessage(message) = event else {
            continue;
        };
        me.submit_message(
            &connection,
            OutgoingMessage {
                text: format!("echo: {}", message.text),
                timestamp: Timestamp::now(),
                last_received_id: Some(message.message_id),
            },
        );
        tokio::time::sleep(delay).await;
        me.complete_next(SendOutcome::Delivered);
    }
}

/// Print rows as the conversation reports them changed.
async fn print_changes(
    mut events: mpsc::UnboundedReceiver<ConversationEvent>,
    handle: DemoHandle,
    timestamp_format: String,
) {
    while let Some(event) = events.recv().await {
        let rows = match event {
            ConversationEvent::RowsInserted { first, count } => first..first + count,
            ConversationEvent::RowChanged { row } => row..row + 1,
            ConversationEvent::SectionsChanged { count } => 0..count,
            ConversationEvent::RowsRemoved { count, .. } => {
                println!("-- cleared {count} messages");
                continue;
            }
            ConversationEvent::UnreadCountChanged(unread) => {
                println!("-- unread: {unread}");
                continue;
            }
            ConversationEvent::Reset | ConversationEvent::ContactChanged(_) => continue,
        };

        let Ok(snapshot) = handle.snapshot().await else {
            break;
        };
        for view in snapshot.rows.iter().filter(|v| rows.contains(&v.row)) {
            println!("{}", format_row(view, &timestamp_format));
        }
    }
}

/// One display line: `[row] time direction text (status) section`.
fn format_row(view: &MessageView, timestamp_format: &str) -> String {
    let time = i64::try_from(view.timestamp.as_millis())
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format(timestamp_format)
                .to_string()
        })
        .unwrap_or_default();
    let direction = if view.is_outgoing { '>' } else { '<' };

    let mut line = format!(
        "[{}] {time} {direction} {} ({} {})",
        view.row,
        view.text,
        view.status.symbol(),
        view.status
    );
    if !view.section.label().is_empty() {
        line.push_str(" [");
        line.push_str(view.section.label());
        line.push(']');
    }
    line
}
