//! Outgoing replies, reply keyboards and user-facing texts.

use crate::gate::database::KeywordUsage;

/// Exact button labels. Incoming text equal to one of these is a command.
pub mod labels {
    pub const CONFIRM_SUBSCRIPTION: &str = "I subscribed!";
    pub const STATISTICS: &str = "Statistics";
    pub const ADD_KEYWORD: &str = "Add keyword";
    pub const INFO: &str = "Info";
    pub const SHARE_CONTACT: &str = "Share contact";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Text(String),
    /// Asks the client to share the user's phone number.
    RequestContact(String),
}

#[cfg(test)]
impl Button {
    pub fn label(&self) -> &str {
        match self {
            Button::Text(label) | Button::RequestContact(label) => label,
        }
    }
}

/// A reply keyboard as rows of buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn confirm_subscription() -> Self {
        Self {
            rows: vec![vec![Button::Text(labels::CONFIRM_SUBSCRIPTION.into())]],
        }
    }

    pub fn user() -> Self {
        Self {
            rows: vec![
                vec![Button::RequestContact(labels::SHARE_CONTACT.into())],
                vec![Button::Text(labels::INFO.into())],
            ],
        }
    }

    pub fn admin() -> Self {
        Self {
            rows: vec![
                vec![
                    Button::RequestContact(labels::SHARE_CONTACT.into()),
                    Button::Text(labels::INFO.into()),
                ],
                vec![
                    Button::Text(labels::STATISTICS.into()),
                    Button::Text(labels::ADD_KEYWORD.into()),
                ],
            ],
        }
    }

    #[cfg(test)]
    pub fn has_button(&self, label: &str) -> bool {
        self.rows.iter().flatten().any(|b| b.label() == label)
    }
}

/// What the bot sends back for one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text {
        text: String,
        keyboard: Option<Keyboard>,
    },
    Document {
        path: String,
    },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Reply::Text {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Text body, if this is a text reply.
    #[cfg(test)]
    pub fn body(&self) -> Option<&str> {
        match self {
            Reply::Text { text, .. } => Some(text),
            Reply::Document { .. } => None,
        }
    }

    #[cfg(test)]
    pub fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            Reply::Text { keyboard, .. } => keyboard.as_ref(),
            Reply::Document { .. } => None,
        }
    }
}

pub const PERMISSION_DENIED: &str = "You don't have permission to use this command.";
pub const CHECK_FAILED: &str = "Could not check your subscription, please try again later.";
pub const INVALID_KEYWORD: &str = "Invalid keyword, please try again.";
pub const COUNTER_ERROR: &str = "Could not register the keyword usage, please try again.";
pub const CONTACT_ERROR: &str = "Could not save your contact, please try again.";
pub const STATISTICS_ERROR: &str = "Could not load statistics, please try again later.";
pub const STORE_ERROR: &str = "Something went wrong, please try again later.";
pub const FILE_UNAVAILABLE: &str = "The file is not available right now, please try again later.";
pub const DEFAULT_INFO: &str = "More information will be added soon.";
pub const ADD_KEYWORD_FORMAT: &str =
    "Send the keyword and the file path in the format: keyword path/to/file";
pub const SUBSCRIPTION_CONFIRMED: &str = "Subscription confirmed! Enter your keyword.";
pub const ALREADY_SUBSCRIBED: &str = "You are already subscribed to the channel. Enter your keyword.";

pub fn subscribe_prompt(channel_link: &str) -> String {
    format!(
        "Please subscribe to the channel {channel_link} and press '{}'.",
        labels::CONFIRM_SUBSCRIPTION
    )
}

pub fn contact_thanks(channel_link: &str) -> String {
    format!("Thank you! {}", subscribe_prompt(channel_link))
}

pub fn format_error() -> String {
    format!("Wrong format. {ADD_KEYWORD_FORMAT}")
}

pub fn keyword_exists(file_path: &str) -> String {
    format!("This keyword already exists: {file_path}")
}

pub fn keyword_added(keyword: &str, file_path: &str) -> String {
    format!("File {file_path} added for keyword {keyword}.")
}

pub fn statistics(subscribed_users: u64, total_redemptions: u64, usage: &[KeywordUsage]) -> String {
    let mut out = format!(
        "Subscribed users: {subscribed_users}\nTotal redemptions: {total_redemptions}\n"
    );
    if usage.is_empty() {
        out.push_str("No keywords registered yet.");
    }
    for entry in usage {
        out.push_str(&format!("Keyword: {} used {} time(s)\n", entry.keyword, entry.count));
    }
    out.trim_end().to_string()
}
