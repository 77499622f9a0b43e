//! Line-oriented chat over stdin/stdout.

use std::collections::HashMap;
use std::error::Error;

use chrono::Local;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::config::SessionConfig;
use crate::core::error::SendError;
use crate::core::message::{EntryId, MessageEntry, MessageStatus, Origin};
use crate::core::session::{Session, SessionEvent};
use crate::core::transcript::TranscriptSnapshot;

pub async fn run_chat(config: SessionConfig, context: Option<Value>) -> Result<(), Box<dyn Error>> {
    eprintln!("Connecting to {} (Ctrl+D to quit)", config.endpoint);
    let (session, mut events) = Session::start(config, context);

    let mut printer = TranscriptPrinter::default();
    let _subscription = session.subscribe(move |snapshot| {
        for line in printer.render(&snapshot) {
            println!("{line}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let outcome = loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match session.send(line).await {
                    Ok(_) | Err(SendError::EmptyMessage) => {}
                    Err(err) => eprintln!("⚠️  {err}"),
                },
                Ok(None) => break Ok(()),
                Err(err) => {
                    stdin_open = false;
                    eprintln!("⚠️  Stopped reading input: {err}");
                }
            },
            event = events.recv() => match event {
                Some(SessionEvent::Fatal(reason)) => {
                    break Err(format!("Connection lost: {reason}"));
                }
                Some(event) => {
                    if let Some(message) = describe_event(&event) {
                        eprintln!("{message}");
                    }
                }
                None => break Ok(()),
            },
        }
    };

    session.stop().await;
    outcome.map_err(Into::into)
}

fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Connected => Some("🔌 Connected".to_string()),
        SessionEvent::Disconnected(reason) => Some(format!("🔌 Disconnected ({reason})")),
        SessionEvent::Fatal(reason) => Some(format!("❌ Connection lost: {reason}")),
        SessionEvent::Bootstrapped { summary: Some(summary) } => Some(format!("📝 {summary}")),
        SessionEvent::Bootstrapped { summary: None } => None,
        SessionEvent::BootstrapFailed(message) => Some(format!("⚠️  Bootstrap failed: {message}")),
        SessionEvent::Error(message) => Some(format!("⚠️  {message}")),
    }
}

/// Turns successive snapshots into printable lines: one per new entry and
/// one per status change of an entry already shown.
#[derive(Debug, Default)]
struct TranscriptPrinter {
    shown: HashMap<EntryId, MessageStatus>,
}

impl TranscriptPrinter {
    fn render(&mut self, snapshot: &TranscriptSnapshot) -> Vec<String> {
        let mut lines = Vec::new();
        for entry in snapshot.iter() {
            match self.shown.insert(entry.id.clone(), entry.status) {
                None => lines.push(format_entry(entry)),
                Some(previous) if previous != entry.status => {
                    if entry.status == MessageStatus::Failed {
                        lines.push(format!(
                            "    ✗ #{} was not delivered; send it again to retry",
                            entry.sequence
                        ));
                    }
                }
                Some(_) => {}
            }
        }
        lines
    }
}

fn format_entry(entry: &MessageEntry) -> String {
    let time = entry.created_at.with_timezone(&Local).format("%H:%M:%S");
    match entry.origin {
        Origin::Local => {
            let marker = match entry.status {
                MessageStatus::Failed => " ✗",
                MessageStatus::Pending | MessageStatus::Confirmed => "",
            };
            format!("[{time}] #{} you{marker}: {}", entry.sequence, entry.text)
        }
        Origin::Remote => format!("[{time}] #{} them: {}", entry.sequence, entry.text),
    }
}
