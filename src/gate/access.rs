//! Admin and subscription checks derived from channel membership.
//!
//! The two checks fail in opposite directions. An oracle outage never grants
//! admin rights (`is_admin` degrades to `false`), while a failed subscription
//! check is reported to the caller so the user can be asked to retry instead
//! of being told they are not subscribed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::gate::database::Database;
use crate::gate::membership::{MembershipOracle, OracleError};

pub struct AccessPolicy<O> {
    oracle: O,
    store: Arc<Database>,
}

impl<O: MembershipOracle> AccessPolicy<O> {
    pub fn new(oracle: O, store: Arc<Database>) -> Self {
        Self { oracle, store }
    }

    /// Whether the user administers the channel. Observed admins are persisted
    /// on their existing record.
    pub async fn is_admin(&self, user_id: i64) -> bool {
        let status = match self.oracle.status(user_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Admin check for user {} failed, treating as non-admin: {e}", user_id);
                return false;
            }
        };

        if !status.is_admin() {
            return false;
        }

        if let Err(e) = self.store.set_admin(user_id) {
            warn!("Failed to persist admin flag for user {}: {e}", user_id);
        }
        info!("🛡️ User {} is a channel admin ({:?})", user_id, status);
        true
    }

    /// Whether the user is subscribed to the channel. The answer is persisted
    /// to the user's record, if there is one; oracle failures are returned,
    /// not swallowed.
    pub async fn is_subscribed(&self, user_id: i64) -> Result<bool, OracleError> {
        let status = self.oracle.status(user_id).await.map_err(|e| {
            warn!("Subscription check for user {} failed: {e}", user_id);
            e
        })?;

        let subscribed = status.is_subscribed();
        if let Err(e) = self.store.set_subscribed(user_id, subscribed) {
            warn!("Failed to persist subscription flag for user {}: {e}", user_id);
        }
        info!("Subscription of user {}: {:?} → {}", user_id, status, subscribed);
        Ok(subscribed)
    }
}
