//! Conversation scenarios for the keyword gate.
//!
//! Run with: cargo test gate

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::command::Inbound;
use super::database::Database;
use super::membership::{MemberStatus, MembershipOracle, OracleError};
use super::reply::{self, Keyboard, Reply, labels};
use super::router::{Router, RouterConfig};
use super::session::{Capability, SessionState};

const ADMIN: i64 = 1;
const USER: i64 = 2;
const STRANGER: i64 = 3;

/// Scripted oracle. Unknown users have left the channel; `None` simulates a
/// network failure.
#[derive(Clone, Default)]
pub struct FakeOracle {
    statuses: Arc<Mutex<HashMap<i64, Option<MemberStatus>>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, user_id: i64, status: MemberStatus) -> Self {
        self.set(user_id, status);
        self
    }

    pub fn failing(self, user_id: i64) -> Self {
        self.statuses.lock().unwrap().insert(user_id, None);
        self
    }

    pub fn set(&self, user_id: i64, status: MemberStatus) {
        self.statuses.lock().unwrap().insert(user_id, Some(status));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MembershipOracle for FakeOracle {
    async fn status(&self, user_id: i64) -> Result<MemberStatus, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().get(&user_id) {
            Some(Some(status)) => Ok(*status),
            Some(None) => Err(OracleError::Timeout),
            None => Ok(MemberStatus::Left),
        }
    }
}

struct Harness {
    router: Router<FakeOracle>,
    store: Arc<Database>,
    oracle: FakeOracle,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(false)
    }

    /// Known keywords are only delivered to channel members.
    fn members_only() -> Self {
        Self::with_config(true)
    }

    fn with_config(require_subscription: bool) -> Self {
        let oracle = FakeOracle::new()
            .with(ADMIN, MemberStatus::Administrator)
            .with(USER, MemberStatus::Member);
        let store = Arc::new(Database::open_in_memory().unwrap());
        let config = RouterConfig {
            channel_link: "https://t.me/news".to_string(),
            info_text: reply::DEFAULT_INFO.to_string(),
            require_subscription,
        };
        let router = Router::new(oracle.clone(), store.clone(), config);
        Self { router, store, oracle }
    }

    async fn send(&self, user_id: i64, text: &str) -> Reply {
        self.router.handle(&Inbound::text(user_id, text)).await
    }

    async fn share_contact(&self, user_id: i64, phone: &str) -> Reply {
        self.router.handle(&Inbound::contact(user_id, phone)).await
    }

    fn count(&self, keyword: &str) -> Option<u64> {
        self.store
            .list_all()
            .unwrap()
            .into_iter()
            .find(|u| u.keyword == keyword)
            .map(|u| u.count)
    }
}

fn body(reply: &Reply) -> &str {
    reply.body().expect("expected a text reply")
}

// =============================================================================
// START AND SUBSCRIPTION
// =============================================================================

mod start_and_subscription {
    use super::*;

    #[tokio::test]
    async fn test_start_creates_user_and_prompts() {
        let h = Harness::new();
        assert!(h.store.user(STRANGER).unwrap().is_none());

        let reply = h.send(STRANGER, "/start").await;

        assert!(h.store.user(STRANGER).unwrap().is_some());
        assert!(body(&reply).contains("https://t.me/news"));
        assert_eq!(reply.keyboard(), Some(&Keyboard::confirm_subscription()));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let h = Harness::new();
        h.share_contact(USER, "+100").await;
        h.send(USER, "/start").await;
        assert_eq!(h.store.user(USER).unwrap().unwrap().contact.as_deref(), Some("+100"));
    }

    #[tokio::test]
    async fn test_confirm_subscription_user_keyboard() {
        let h = Harness::new();
        h.send(USER, "/start").await;
        let reply = h.send(USER, labels::CONFIRM_SUBSCRIPTION).await;
        assert_eq!(body(&reply), reply::SUBSCRIPTION_CONFIRMED);
        assert_eq!(reply.keyboard(), Some(&Keyboard::user()));
        assert!(h.store.user(USER).unwrap().unwrap().subscribed);
    }

    #[tokio::test]
    async fn test_confirm_subscription_admin_keyboard() {
        let h = Harness::new();
        let reply = h.send(ADMIN, labels::CONFIRM_SUBSCRIPTION).await;
        assert_eq!(reply.keyboard(), Some(&Keyboard::admin()));
    }

    #[tokio::test]
    async fn test_confirm_subscription_not_subscribed_repeats_prompt() {
        let h = Harness::new();
        let reply = h.send(STRANGER, labels::CONFIRM_SUBSCRIPTION).await;
        assert_eq!(body(&reply), reply::subscribe_prompt("https://t.me/news"));
        assert_eq!(reply.keyboard(), Some(&Keyboard::confirm_subscription()));
    }

    #[tokio::test]
    async fn test_confirm_subscription_oracle_failure() {
        let h = Harness::new();
        h.oracle.statuses.lock().unwrap().insert(USER, None);
        let reply = h.send(USER, labels::CONFIRM_SUBSCRIPTION).await;
        assert_eq!(body(&reply), reply::CHECK_FAILED);
    }

    #[tokio::test]
    async fn test_checks_without_start_create_no_user() {
        let h = Harness::new();
        h.send(USER, labels::CONFIRM_SUBSCRIPTION).await;
        h.send(ADMIN, labels::STATISTICS).await;
        h.send(ADMIN, "secret docs/report.pdf").await;

        assert!(h.store.user(USER).unwrap().is_none());
        assert!(h.store.user(ADMIN).unwrap().is_none());
        assert_eq!(h.store.subscribed_user_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_session_state_follows_conversation() {
        let h = Harness::new();
        assert_eq!(h.router.session_state(ADMIN), SessionState::Unknown);

        h.send(ADMIN, "/start").await;
        assert_eq!(h.router.session_state(ADMIN), SessionState::ContactPending);

        h.share_contact(ADMIN, "+100").await;
        assert_eq!(h.router.session_state(ADMIN), SessionState::Active(Capability::User));

        h.send(ADMIN, labels::ADD_KEYWORD).await;
        assert_eq!(h.router.session_state(ADMIN), SessionState::Active(Capability::Admin));

        h.send(STRANGER, "/start").await;
        h.share_contact(STRANGER, "+300").await;
        assert_eq!(h.router.session_state(STRANGER), SessionState::SubscriptionPending);
    }

    #[tokio::test]
    async fn test_info_is_static() {
        let h = Harness::new();
        let reply = h.send(STRANGER, labels::INFO).await;
        assert_eq!(body(&reply), reply::DEFAULT_INFO);
        assert_eq!(h.oracle.calls(), 0);
    }
}

// =============================================================================
// CONTACT REGISTRATION
// =============================================================================

mod contact_registration {
    use super::*;

    #[tokio::test]
    async fn test_contact_subscribed_user() {
        let h = Harness::new();
        let reply = h.share_contact(USER, "+100").await;
        assert_eq!(body(&reply), reply::ALREADY_SUBSCRIBED);
        assert_eq!(h.store.user(USER).unwrap().unwrap().contact.as_deref(), Some("+100"));
    }

    #[tokio::test]
    async fn test_contact_unsubscribed_user() {
        let h = Harness::new();
        let reply = h.share_contact(STRANGER, "+300").await;
        assert!(body(&reply).contains("https://t.me/news"));
        assert_eq!(reply.keyboard(), Some(&Keyboard::confirm_subscription()));
        assert_eq!(h.store.user(STRANGER).unwrap().unwrap().contact.as_deref(), Some("+300"));
    }

    #[tokio::test]
    async fn test_contact_is_not_overwritten() {
        let h = Harness::new();
        h.share_contact(USER, "+100").await;
        h.share_contact(USER, "+999").await;
        assert_eq!(h.store.user(USER).unwrap().unwrap().contact.as_deref(), Some("+100"));
    }

    #[tokio::test]
    async fn test_contact_saved_even_if_check_fails() {
        let h = Harness::new();
        h.oracle.statuses.lock().unwrap().insert(USER, None);
        let reply = h.share_contact(USER, "+100").await;
        assert_eq!(body(&reply), reply::CHECK_FAILED);
        assert_eq!(h.store.user(USER).unwrap().unwrap().contact.as_deref(), Some("+100"));
    }
}

// =============================================================================
// ADMIN COMMANDS
// =============================================================================

mod admin_commands {
    use super::*;

    #[tokio::test]
    async fn test_statistics_denied_for_users() {
        let h = Harness::new();
        let reply = h.send(USER, labels::STATISTICS).await;
        assert_eq!(body(&reply), reply::PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_statistics_denied_on_oracle_failure() {
        let h = Harness::new();
        h.oracle.statuses.lock().unwrap().insert(ADMIN, None);
        let reply = h.send(ADMIN, labels::STATISTICS).await;
        assert_eq!(body(&reply), reply::PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_statistics_for_admin() {
        let h = Harness::new();
        h.send(ADMIN, "alpha a.pdf").await;
        h.send(ADMIN, "beta b.pdf").await;
        h.send(USER, "/start").await;
        h.send(USER, labels::CONFIRM_SUBSCRIPTION).await;
        h.send(STRANGER, "/start").await;
        h.send(USER, "alpha").await;
        h.send(USER, "alpha").await;

        let reply = h.send(ADMIN, labels::STATISTICS).await;
        let text = body(&reply);
        assert!(text.contains("Subscribed users: 1"), "{text}");
        assert!(text.contains("Total redemptions: 2"), "{text}");
        assert!(text.contains("Keyword: alpha used 2 time(s)"), "{text}");
        assert!(text.contains("Keyword: beta used 0 time(s)"), "{text}");
    }

    #[tokio::test]
    async fn test_add_keyword_prompt() {
        let h = Harness::new();
        let reply = h.send(ADMIN, labels::ADD_KEYWORD).await;
        assert_eq!(body(&reply), reply::ADD_KEYWORD_FORMAT);
        assert!(h.store.list_all().unwrap().is_empty());

        let reply = h.send(USER, labels::ADD_KEYWORD).await;
        assert_eq!(body(&reply), reply::PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let h = Harness::new();
        let reply = h.send(ADMIN, "secret docs/report.pdf").await;
        assert_eq!(body(&reply), reply::keyword_added("secret", "docs/report.pdf"));
        assert_eq!(h.store.lookup("secret").unwrap().as_deref(), Some("docs/report.pdf"));
        assert_eq!(h.count("secret"), Some(0));

        let reply = h.send(ADMIN, "secret docs/report.pdf").await;
        assert_eq!(body(&reply), reply::keyword_exists("docs/report.pdf"));
        assert_eq!(h.count("secret"), Some(0));
    }

    #[tokio::test]
    async fn test_duplicate_with_other_path_keeps_original() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        let reply = h.send(ADMIN, "secret other.pdf").await;
        assert!(body(&reply).contains("docs/report.pdf"));
        assert_eq!(h.store.lookup("secret").unwrap().as_deref(), Some("docs/report.pdf"));
    }

    #[tokio::test]
    async fn test_register_path_with_spaces() {
        let h = Harness::new();
        h.send(ADMIN, "report my docs/annual report.pdf").await;
        assert_eq!(
            h.store.lookup("report").unwrap().as_deref(),
            Some("my docs/annual report.pdf")
        );
    }

    #[tokio::test]
    async fn test_register_format_error() {
        let h = Harness::new();
        let reply = h.send(ADMIN, "secret ").await;
        assert_eq!(body(&reply), reply::format_error());
        assert!(h.store.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_text_with_space_is_a_keyword() {
        let h = Harness::new();
        let reply = h.send(USER, "secret docs/report.pdf").await;
        assert_eq!(body(&reply), reply::INVALID_KEYWORD);
        assert!(h.store.list_all().unwrap().is_empty());
    }
}

// =============================================================================
// REDEMPTION
// =============================================================================

mod redemption {
    use super::*;

    #[tokio::test]
    async fn test_unknown_user_flow() {
        let h = Harness::new();
        let reply = h.send(STRANGER, "/start").await;
        assert!(reply.keyboard().is_some());
        assert!(h.store.user(STRANGER).unwrap().is_some());

        let reply = h.send(STRANGER, "secret").await;
        assert_eq!(body(&reply), reply::INVALID_KEYWORD);
    }

    #[tokio::test]
    async fn test_subscriber_redeems_keyword() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;

        let reply = h.send(USER, "secret").await;
        assert_eq!(reply, Reply::Document { path: "docs/report.pdf".to_string() });
        assert_eq!(h.count("secret"), Some(1));
    }

    #[tokio::test]
    async fn test_unknown_keyword_leaves_counts() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        let calls_before = h.oracle.calls();

        let reply = h.send(USER, "foobar").await;
        assert_eq!(body(&reply), reply::INVALID_KEYWORD);
        assert_eq!(h.count("secret"), Some(0));
        assert_eq!(h.store.list_all().unwrap().len(), 1);
        assert_eq!(h.oracle.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_each_redemption_counts() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        for _ in 0..3 {
            h.send(USER, "secret").await;
        }
        assert_eq!(h.count("secret"), Some(3));
    }

    #[tokio::test]
    async fn test_redemption_needs_no_subscription() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        let calls_before = h.oracle.calls();

        let reply = h.send(STRANGER, "secret").await;
        assert_eq!(reply, Reply::Document { path: "docs/report.pdf".to_string() });
        assert_eq!(h.oracle.calls(), calls_before);
        assert_eq!(h.count("secret"), Some(1));
    }

    #[tokio::test]
    async fn test_redemption_survives_oracle_outage() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        h.oracle.statuses.lock().unwrap().insert(USER, None);

        let reply = h.send(USER, "secret").await;
        assert!(matches!(reply, Reply::Document { .. }));
        assert_eq!(h.count("secret"), Some(1));
    }

    #[tokio::test]
    async fn test_members_only_delivers_to_subscribers() {
        let h = Harness::members_only();
        h.send(ADMIN, "secret docs/report.pdf").await;

        let reply = h.send(USER, "secret").await;
        assert!(matches!(reply, Reply::Document { .. }));
        assert_eq!(h.count("secret"), Some(1));
    }

    #[tokio::test]
    async fn test_members_only_prompts_unsubscribed_user() {
        let h = Harness::members_only();
        h.send(ADMIN, "secret docs/report.pdf").await;

        let reply = h.send(STRANGER, "secret").await;
        assert_eq!(reply.keyboard(), Some(&Keyboard::confirm_subscription()));
        assert_eq!(h.count("secret"), Some(0));
    }

    #[tokio::test]
    async fn test_members_only_oracle_failure_blocks_delivery() {
        let h = Harness::members_only();
        h.send(ADMIN, "secret docs/report.pdf").await;
        h.oracle.statuses.lock().unwrap().insert(USER, None);

        let reply = h.send(USER, "secret").await;
        assert_eq!(body(&reply), reply::CHECK_FAILED);
        assert_eq!(h.count("secret"), Some(0));
    }

    #[tokio::test]
    async fn test_members_only_unknown_keyword_skips_oracle() {
        let h = Harness::members_only();
        let reply = h.send(STRANGER, "secret").await;
        assert_eq!(body(&reply), reply::INVALID_KEYWORD);
        assert_eq!(h.oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_keywords_are_case_sensitive() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        let reply = h.send(USER, "Secret").await;
        assert_eq!(body(&reply), reply::INVALID_KEYWORD);
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_sum_exactly() {
        let h = Arc::new(Harness::new());
        h.send(ADMIN, "secret docs/report.pdf").await;

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { h.send(USER, "secret").await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(task.await.unwrap(), Reply::Document { .. }));
        }
        assert_eq!(h.count("secret"), Some(20));
    }
}

// =============================================================================
// STORE FAILURES
// =============================================================================

mod store_failures {
    use super::*;

    const FREEZE_COUNTS: &str = "
        CREATE TRIGGER freeze_counts BEFORE UPDATE ON files
        BEGIN SELECT RAISE(ABORT, 'files are read-only'); END;";

    const FREEZE_USERS: &str = "
        CREATE TRIGGER freeze_user_inserts BEFORE INSERT ON users
        BEGIN SELECT RAISE(ABORT, 'users are read-only'); END;
        CREATE TRIGGER freeze_user_updates BEFORE UPDATE ON users
        BEGIN SELECT RAISE(ABORT, 'users are read-only'); END;";

    #[tokio::test]
    async fn test_counter_failure_withholds_file() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        h.store.execute_raw(FREEZE_COUNTS).unwrap();

        let reply = h.send(USER, "secret").await;
        assert_eq!(body(&reply), reply::COUNTER_ERROR);
        assert_eq!(h.count("secret"), Some(0));
    }

    #[tokio::test]
    async fn test_contact_failure() {
        let h = Harness::new();
        h.store.execute_raw(FREEZE_USERS).unwrap();
        let calls_before = h.oracle.calls();

        let reply = h.share_contact(USER, "+100").await;
        assert_eq!(body(&reply), reply::CONTACT_ERROR);
        assert!(h.store.user(USER).unwrap().is_none());
        assert_eq!(h.oracle.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_statistics_failure() {
        let h = Harness::new();
        h.send(ADMIN, "alpha a.pdf").await;
        h.store.execute_raw("DROP TABLE files").unwrap();

        let reply = h.send(ADMIN, labels::STATISTICS).await;
        assert_eq!(body(&reply), reply::STATISTICS_ERROR);
    }

    #[tokio::test]
    async fn test_registration_insert_failure() {
        let h = Harness::new();
        h.store
            .execute_raw(
                "CREATE TRIGGER freeze_inserts BEFORE INSERT ON files
                 BEGIN SELECT RAISE(ABORT, 'files are read-only'); END;",
            )
            .unwrap();

        let reply = h.send(ADMIN, "secret docs/report.pdf").await;
        assert_eq!(body(&reply), reply::STORE_ERROR);
        assert_eq!(h.store.lookup("secret").unwrap(), None);
    }

    #[tokio::test]
    async fn test_lost_keyword_table() {
        let h = Harness::new();
        h.send(ADMIN, "secret docs/report.pdf").await;
        h.store.execute_raw("DROP TABLE files").unwrap();

        let reply = h.send(ADMIN, "other docs/other.pdf").await;
        assert_eq!(body(&reply), reply::STORE_ERROR);

        let reply = h.send(USER, "secret").await;
        assert_eq!(body(&reply), reply::STORE_ERROR);
    }

    #[tokio::test]
    async fn test_lost_user_table_reads_as_unknown() {
        let h = Harness::new();
        h.send(USER, "/start").await;
        h.store.execute_raw("DROP TABLE users").unwrap();

        assert_eq!(h.router.session_state(USER), SessionState::Unknown);
        let reply = h.send(USER, "/start").await;
        assert_eq!(reply.keyboard(), Some(&Keyboard::confirm_subscription()));
    }
}
