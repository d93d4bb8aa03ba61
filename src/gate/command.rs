//! Inbound events and their parsed command form.

use crate::gate::reply::labels;

/// An incoming update, reduced to what routing needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub user_id: i64,
    pub chat_id: i64,
    pub text: Option<String>,
    /// Phone number of a shared contact.
    pub contact: Option<String>,
}

#[cfg(test)]
impl Inbound {
    pub fn text(user_id: i64, text: &str) -> Self {
        Self {
            user_id,
            chat_id: user_id,
            text: Some(text.to_string()),
            contact: None,
        }
    }

    pub fn contact(user_id: i64, phone: &str) -> Self {
        Self {
            user_id,
            chat_id: user_id,
            text: None,
            contact: Some(phone.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    ConfirmSubscription,
    ShowStatistics,
    PromptAddKeyword,
    ShowInfo,
    ContactShared(String),
    FreeText(String),
}

impl Command {
    /// Button labels and `/start` match exactly; a shared contact wins over
    /// any other text; everything else is free text.
    pub fn parse(event: &Inbound) -> Self {
        let text = event.text.as_deref().unwrap_or("");
        match text {
            "/start" => return Self::Start,
            labels::CONFIRM_SUBSCRIPTION => return Self::ConfirmSubscription,
            labels::STATISTICS => return Self::ShowStatistics,
            labels::ADD_KEYWORD => return Self::PromptAddKeyword,
            labels::INFO => return Self::ShowInfo,
            _ => {}
        }

        if let Some(ref phone) = event.contact {
            return Self::ContactShared(phone.clone());
        }
        Self::FreeText(text.to_string())
    }
}

/// Split admin input into `(keyword, file path)` on the first whitespace.
///
/// Both parts must be non-empty; the path keeps its inner spaces.
pub fn split_registration(text: &str) -> Option<(&str, &str)> {
    let (keyword, path) = text.split_once(char::is_whitespace)?;
    let path = path.trim();
    if keyword.is_empty() || path.is_empty() {
        return None;
    }
    Some((keyword, path))
}
