//! The headless session loop.
//!
//! One `tokio::select!` over socket events, the timer deadline, file-read
//! completions and stdin commands drives a single [`Client`]. A session ends
//! on `quit` or when the transport asks for a reload; the binary then
//! reconnects and starts a fresh session with empty state.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use colored::*;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::UserCommand;
use crate::client::Client;
use crate::config::ClientConfig;
use crate::dom::MemoryDocument;
use crate::error::Result;
use crate::transport::{Socket, WireEvent, WsSocket};
use crate::upload::file_meta;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Connection lost or the server asked for it: start over.
    Reload,
    /// The user quit or stdin closed.
    Quit,
}

/// Outcome of one background file read.
#[derive(Debug)]
pub struct FileRead {
    pub batch: Uuid,
    pub index: usize,
    pub outcome: std::result::Result<Vec<u8>, String>,
}

/// Idle wake-up when no timer is armed.
const IDLE_WAKE: Duration = Duration::from_secs(3600);

/// Connect, run until the session ends.
pub async fn run_session(
    config: &ClientConfig,
    commands: &mut mpsc::UnboundedReceiver<UserCommand>,
    assume_yes: bool,
) -> Result<SessionEnd> {
    let (socket, mut wire) = WsSocket::connect(&config.server_url).await?;
    let doc = MemoryDocument::with_layout(
        &config.layout,
        config.viewport_height_px,
        config.row_height_px,
    );
    let mut client = Client::new(config.clone(), doc, socket);
    let (reads_tx, mut reads) = mpsc::unbounded_channel::<FileRead>();

    let started = client.start(Instant::now());
    if let Err(e) = started {
        warn!(error = %e, "session start failed");
        return Ok(SessionEnd::Reload);
    }
    eprintln!("{}", format!("connected to {}", config.server_url).bright_green());

    loop {
        if client.reload_requested() {
            info!(reason = ?client.transport().reload_reason(), "session ending for reload");
            return Ok(SessionEnd::Reload);
        }
        let deadline = client
            .next_deadline()
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + IDLE_WAKE);

        let step = tokio::select! {
            event = wire.recv() => match event {
                Some(WireEvent::Text(text)) => client.handle_text(&text, Instant::now()),
                Some(WireEvent::Binary(bytes)) => {
                    client.handle_binary(&bytes);
                    Ok(())
                }
                Some(WireEvent::Closed) | None => {
                    client.transport_mut().request_reload("connection closed");
                    Ok(())
                }
            },
            _ = tokio::time::sleep_until(deadline) => client.fire_due(Instant::now()),
            Some(read) = reads.recv() => client.file_read(read.batch, read.index, read.outcome),
            command = commands.recv() => match command {
                Some(UserCommand::Quit) | None => return Ok(SessionEnd::Quit),
                Some(command) => apply_command(&mut client, command, &reads_tx, assume_yes),
            },
        };

        match step {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "session lost");
                return Ok(SessionEnd::Reload);
            }
            Err(e) => eprintln!("{} {}", "error:".bright_red(), e),
        }
    }
}

/// Apply one stdin command. File reads for uploads are spawned and report
/// back through `reads`.
pub fn apply_command<S: Socket>(
    client: &mut Client<MemoryDocument, S>,
    command: UserCommand,
    reads: &mpsc::UnboundedSender<FileRead>,
    assume_yes: bool,
) -> Result<()> {
    match command {
        UserCommand::ScrollTop => client.scroll_to(0.0),
        UserCommand::ScrollBottom => client.scroll_to_bottom(),
        UserCommand::ScrollTo(top) => client.scroll_to(top),
        UserCommand::Type(text) => {
            match client.drafts().active().map(|s| s.scope.clone()) {
                Some(scope) => client.doc_mut().type_into(&scope, &text)?,
                None => eprintln!("{}", "no draft open".yellow()),
            }
            Ok(())
        }
        UserCommand::New => client.new_message(),
        UserCommand::Edit(id) => client.edit_message(id),
        UserCommand::Send => client.send_message().map(drop),
        UserCommand::Save => client.save_draft().map(drop),
        UserCommand::Reply(parent) => client.compose_reply(parent),
        UserCommand::SendReply { to_sender_only } => client.send_reply(to_sender_only).map(drop),
        UserCommand::Stash(id) => client.stash(id, Instant::now()),
        UserCommand::Pin(id) => client.pin(id),
        UserCommand::Unpin(id) => client.unpin(id),
        UserCommand::Delete {
            message_id,
            confirmed,
        } => {
            let mut confirm = |prompt: &str| answer(prompt, assume_yes || confirmed);
            client.delete_message(message_id, &mut confirm).map(drop)
        }
        UserCommand::DeleteDraft { confirmed } => {
            let mut confirm = |prompt: &str| answer(prompt, assume_yes || confirmed);
            client.delete_draft(&mut confirm).map(drop)
        }
        UserCommand::Upload {
            partition_id,
            paths,
        } => start_upload(client, partition_id, paths, reads),
        UserCommand::Filter(filter) => client.open_feed(filter),
        UserCommand::Show => {
            print_document(client);
            Ok(())
        }
        UserCommand::Quit => Ok(()),
    }
}

fn answer(prompt: &str, yes: bool) -> bool {
    if !yes {
        eprintln!("{} {}", prompt.yellow(), "(repeat with -y to confirm)".dimmed());
    }
    yes
}

/// Record metadata in call order, then read every file in the background.
fn start_upload<S: Socket>(
    client: &mut Client<MemoryDocument, S>,
    partition_id: u64,
    paths: Vec<PathBuf>,
    reads: &mpsc::UnboundedSender<FileRead>,
) -> Result<()> {
    let files = paths
        .iter()
        .map(|p| file_meta(p))
        .collect::<Result<Vec<_>>>()?;
    let Some(batch) = client.upload(partition_id, files) else {
        return Ok(());
    };
    for (index, path) in paths.into_iter().enumerate() {
        let reads = reads.clone();
        tokio::spawn(async move {
            let outcome = tokio::fs::read(&path).await.map_err(|e| e.to_string());
            let _ = reads.send(FileRead {
                batch,
                index,
                outcome,
            });
        });
    }
    Ok(())
}

fn print_document<S: Socket>(client: &Client<MemoryDocument, S>) {
    let layout = &client.config().layout;
    for container in [&layout.banner, &layout.filter, &layout.teaser, &layout.content, &layout.dialog] {
        let outline = client.doc().outline(container);
        if !outline.trim().is_empty() {
            println!("{}", outline.trim_end());
        }
    }
    println!(
        "{} older={:?} newer={:?} live={}",
        "feed".bright_yellow(),
        client.stream().older_state(),
        client.stream().newer_state(),
        client.stream().live_accept()
    );
}
