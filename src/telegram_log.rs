//! Forwards warnings and errors to an operator chat.
//!
//! INFO events carry user ids and contacts and stay in the local logs.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_MESSAGE_CHARS: usize = 4000;
const MAX_BATCH: usize = 20;

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramLogLayer {
    /// Must be called from within a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut pending: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    line = rx.recv() => match line {
                        Some(line) => {
                            pending.push(line);
                            if pending.len() >= MAX_BATCH {
                                flush(&bot, chat_id, &mut pending).await;
                            }
                        }
                        None => {
                            flush(&bot, chat_id, &mut pending).await;
                            break;
                        }
                    },
                    _ = interval.tick() => flush(&bot, chat_id, &mut pending).await,
                }
            }
        });

        Self { tx }
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, pending: &mut Vec<String>) {
    if pending.is_empty() {
        return;
    }
    let text = truncate(&pending.join("\n"), MAX_MESSAGE_CHARS);
    pending.clear();
    // Logging here would feed the layer its own failure.
    if let Err(e) = bot.send_message(chat_id, text).await {
        eprintln!("Failed to forward logs to Telegram: {e}");
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{} = {:?}", field.name(), value));
        }
    }
}

impl MessageVisitor {
    fn render(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} ({})", self.message, self.fields.join(", "))
        }
    }
}

fn format_line(level: Level, target: &str, message: String) -> String {
    let prefix = if level == Level::ERROR { "❌" } else { "⚠️" };
    format!("{prefix} [{target}] {message}")
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format_line(level, event.metadata().target(), visitor.render());

        if self.tx.send(line).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
