//! Per-user conversation state, derived from the stored user record.
//!
//! Nothing is kept in memory between turns; the state is recomputed from the
//! database whenever it is asked for.

use crate::gate::database::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No user record yet.
    Unknown,
    ContactPending,
    SubscriptionPending,
    Active(Capability),
}

impl SessionState {
    pub fn derive(record: Option<&UserRecord>) -> Self {
        let Some(user) = record else {
            return Self::Unknown;
        };
        if user.contact.is_none() {
            return Self::ContactPending;
        }
        if !user.subscribed {
            return Self::SubscriptionPending;
        }
        if user.admin {
            Self::Active(Capability::Admin)
        } else {
            Self::Active(Capability::User)
        }
    }
}
