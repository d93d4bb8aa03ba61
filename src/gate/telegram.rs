//! Telegram delivery of router replies using teloxide.

use std::path::{Path, PathBuf};

use teloxide::prelude::*;
use teloxide::types::{ButtonRequest, InputFile, KeyboardButton, KeyboardMarkup};
use tracing::{info, warn};

use crate::gate::reply::{self, Button, Keyboard, Reply};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    /// Base directory for relative file paths.
    files_dir: Option<PathBuf>,
}

impl TelegramClient {
    pub fn new(bot: Bot, files_dir: Option<PathBuf>) -> Self {
        Self { bot, files_dir }
    }

    /// Send a reply to `chat_id`.
    pub async fn deliver(&self, chat_id: i64, reply: &Reply) -> Result<(), String> {
        match reply {
            Reply::Text { text, keyboard } => self.send_message(chat_id, text, keyboard.as_ref()).await,
            Reply::Document { path } => {
                let resolved = resolve_path(self.files_dir.as_deref(), path);
                if let Err(e) = self.send_document(chat_id, &resolved).await {
                    // The usage is already counted; tell the user rather than stay silent.
                    self.send_message(chat_id, reply::FILE_UNAVAILABLE, None).await?;
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }

        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    pub async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), String> {
        info!("📎 Sending {} to chat {}", path.display(), chat_id);

        self.bot
            .send_document(ChatId(chat_id), InputFile::file(path.to_path_buf()))
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to send document {}: {e}", path.display());
                warn!("{}", msg);
                msg
            })
    }
}

/// Convert a reply keyboard to its Bot API form.
pub fn to_markup(keyboard: &Keyboard) -> KeyboardMarkup {
    let rows = keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| match button {
                Button::Text(label) => KeyboardButton::new(label.clone()),
                Button::RequestContact(label) => {
                    KeyboardButton::new(label.clone()).request(ButtonRequest::Contact)
                }
            })
            .collect::<Vec<_>>()
    });
    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Relative paths are taken from `files_dir` when one is configured.
pub fn resolve_path(files_dir: Option<&Path>, path: &str) -> PathBuf {
    let path = Path::new(path);
    match files_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
