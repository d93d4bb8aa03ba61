//! Conversation router: turns one inbound event into one reply.

use std::sync::Arc;

use tracing::{Level, debug, info, warn};

use crate::gate::access::AccessPolicy;
use crate::gate::command::{Command, Inbound, split_registration};
use crate::gate::database::{Database, StoreError};
use crate::gate::membership::MembershipOracle;
use crate::gate::reply::{self, Keyboard, Reply};
use crate::gate::session::SessionState;

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Link shown in subscribe prompts, e.g. `https://t.me/news`.
    pub channel_link: String,
    pub info_text: String,
    /// Opt-in: only channel members may redeem known keywords.
    pub require_subscription: bool,
}

pub struct Router<O> {
    policy: AccessPolicy<O>,
    store: Arc<Database>,
    config: RouterConfig,
}

impl<O: MembershipOracle> Router<O> {
    pub fn new(oracle: O, store: Arc<Database>, config: RouterConfig) -> Self {
        Self {
            policy: AccessPolicy::new(oracle, store.clone()),
            store,
            config,
        }
    }

    pub async fn handle(&self, event: &Inbound) -> Reply {
        let command = Command::parse(event);
        let user_id = event.user_id;

        if tracing::enabled!(Level::DEBUG) {
            let state = self.session_state(user_id);
            debug!("User {} ({:?}) → {}", user_id, state, command_kind(&command));
        }

        match command {
            Command::Start => self.start(user_id),
            Command::ConfirmSubscription => self.confirm_subscription(user_id).await,
            Command::ShowStatistics => self.statistics(user_id).await,
            Command::PromptAddKeyword => {
                if self.policy.is_admin(user_id).await {
                    Reply::text(reply::ADD_KEYWORD_FORMAT)
                } else {
                    Reply::text(reply::PERMISSION_DENIED)
                }
            }
            Command::ShowInfo => Reply::text(self.config.info_text.clone()),
            Command::ContactShared(phone) => self.register_contact(user_id, &phone).await,
            Command::FreeText(text) => {
                if text.contains(char::is_whitespace) && self.policy.is_admin(user_id).await {
                    self.register_keyword(&text)
                } else {
                    self.redeem(user_id, &text).await
                }
            }
        }
    }

    /// Conversation state of the user, as recorded in the store.
    pub fn session_state(&self, user_id: i64) -> SessionState {
        match self.store.user(user_id) {
            Ok(record) => SessionState::derive(record.as_ref()),
            Err(e) => {
                warn!("Failed to load user {}: {e}", user_id);
                SessionState::Unknown
            }
        }
    }

    fn subscribe_prompt(&self) -> Reply {
        Reply::with_keyboard(
            reply::subscribe_prompt(&self.config.channel_link),
            Keyboard::confirm_subscription(),
        )
    }

    fn start(&self, user_id: i64) -> Reply {
        if let Err(e) = self.store.ensure_user(user_id) {
            warn!("Failed to create user {}: {e}", user_id);
        }
        self.subscribe_prompt()
    }

    async fn confirm_subscription(&self, user_id: i64) -> Reply {
        match self.policy.is_subscribed(user_id).await {
            Err(_) => Reply::text(reply::CHECK_FAILED),
            Ok(false) => self.subscribe_prompt(),
            Ok(true) => {
                let keyboard = if self.policy.is_admin(user_id).await {
                    Keyboard::admin()
                } else {
                    Keyboard::user()
                };
                Reply::with_keyboard(reply::SUBSCRIPTION_CONFIRMED, keyboard)
            }
        }
    }

    async fn statistics(&self, user_id: i64) -> Reply {
        if !self.policy.is_admin(user_id).await {
            return Reply::text(reply::PERMISSION_DENIED);
        }

        let stats = (|| -> Result<_, StoreError> {
            let usage = self.store.list_all()?;
            let total = self.store.total_redemptions()?;
            let subscribed = self.store.subscribed_user_count()?;
            Ok(reply::statistics(subscribed, total, &usage))
        })();

        match stats {
            Ok(text) => Reply::text(text),
            Err(e) => {
                warn!("Failed to load statistics: {e}");
                Reply::text(reply::STATISTICS_ERROR)
            }
        }
    }

    async fn register_contact(&self, user_id: i64, phone: &str) -> Reply {
        if let Err(e) = self.store.save_contact(user_id, phone) {
            warn!("Failed to save contact for user {}: {e}", user_id);
            return Reply::text(reply::CONTACT_ERROR);
        }

        match self.policy.is_subscribed(user_id).await {
            Err(_) => Reply::text(reply::CHECK_FAILED),
            Ok(true) => Reply::text(reply::ALREADY_SUBSCRIBED),
            Ok(false) => Reply::with_keyboard(
                reply::contact_thanks(&self.config.channel_link),
                Keyboard::confirm_subscription(),
            ),
        }
    }

    fn register_keyword(&self, text: &str) -> Reply {
        let Some((keyword, file_path)) = split_registration(text) else {
            return Reply::text(reply::format_error());
        };

        match self.store.exists(keyword) {
            Ok((true, existing)) => return Reply::text(reply::keyword_exists(&existing)),
            Ok((false, _)) => {}
            Err(e) => {
                warn!("Failed to check keyword {}: {e}", keyword);
                return Reply::text(reply::STORE_ERROR);
            }
        }

        // A concurrent registration can still win between the check and the insert.
        match self.store.add(keyword, file_path) {
            Ok(()) => Reply::text(reply::keyword_added(keyword, file_path)),
            Err(StoreError::AlreadyExists { file_path: existing, .. }) => {
                Reply::text(reply::keyword_exists(&existing))
            }
            Err(e) => {
                warn!("Failed to add keyword {}: {e}", keyword);
                Reply::text(reply::STORE_ERROR)
            }
        }
    }

    async fn redeem(&self, user_id: i64, keyword: &str) -> Reply {
        let path = match self.store.lookup(keyword) {
            Ok(Some(path)) => path,
            Ok(None) => return Reply::text(reply::INVALID_KEYWORD),
            Err(e) => {
                warn!("Failed to look up keyword: {e}");
                return Reply::text(reply::STORE_ERROR);
            }
        };

        if self.config.require_subscription {
            match self.policy.is_subscribed(user_id).await {
                Ok(true) => {}
                Ok(false) => return self.subscribe_prompt(),
                Err(_) => return Reply::text(reply::CHECK_FAILED),
            }
        }

        // Count first: a redemption that is never delivered is not counted.
        if let Err(e) = self.store.increment_count(keyword) {
            warn!("Failed to increment usage of {}: {e}", keyword);
            return Reply::text(reply::COUNTER_ERROR);
        }

        info!("📄 User {} redeemed {} → {}", user_id, keyword, path);
        Reply::Document { path }
    }
}

/// Command name without its payload, for logs.
fn command_kind(command: &Command) -> &'static str {
    match command {
        Command::Start => "start",
        Command::ConfirmSubscription => "confirm_subscription",
        Command::ShowStatistics => "statistics",
        Command::PromptAddKeyword => "add_keyword",
        Command::ShowInfo => "info",
        Command::ContactShared(_) => "contact",
        Command::FreeText(_) => "text",
    }
}
