//! Identity-based admission: blacklist, superusers and group admins.

use std::sync::Arc;

use tracing::{debug, error};

use super::Verdict;
use crate::collaborators::GroupRoleAuthority;
use crate::model::PostDestination;

/// Silently rejects listed users.
#[derive(Debug, Clone)]
pub struct BlacklistInterceptor {
    blacklist: Vec<String>,
}

impl BlacklistInterceptor {
    /// Entries are either bare user ids or `adapter:user_id`.
    #[must_use]
    pub fn new(blacklist: Vec<String>) -> Self {
        Self { blacklist }
    }

    #[must_use]
    pub fn check(&self, dest: &PostDestination) -> Verdict {
        if dest.user_listed_in(&self.blacklist) {
            debug!(user = ?dest.identifier(), "Rejected blacklisted user");
            Verdict::Deny(None)
        } else {
            Verdict::Allow
        }
    }
}

/// Admits only listed users.
#[derive(Debug, Clone)]
pub struct SuperuserInterceptor {
    superusers: Vec<String>,
}

impl SuperuserInterceptor {
    pub const DENIED: &'static str = "Only superusers may use this command.";

    #[must_use]
    pub fn new(superusers: Vec<String>) -> Self {
        Self { superusers }
    }

    #[must_use]
    pub fn check(&self, dest: &PostDestination) -> Verdict {
        if dest.user_listed_in(&self.superusers) {
            Verdict::Allow
        } else {
            Verdict::Deny(Some(Self::DENIED.to_string()))
        }
    }
}

/// Admits direct conversations, and group posts by the group's admins.
pub struct GroupAdminInterceptor {
    authority: Arc<dyn GroupRoleAuthority>,
}

impl GroupAdminInterceptor {
    pub const DENIED: &'static str = "Only group admins may use this command.";

    #[must_use]
    pub fn new(authority: Arc<dyn GroupRoleAuthority>) -> Self {
        Self { authority }
    }

    pub async fn check(&self, dest: &PostDestination) -> Verdict {
        if dest.group_id().is_none() {
            return Verdict::Allow;
        }
        match self.authority.is_group_admin(dest).await {
            Ok(true) => Verdict::Allow,
            Ok(false) => Verdict::Deny(Some(Self::DENIED.to_string())),
            Err(e) => {
                error!(
                    group_id = dest.group_id(),
                    error = %e,
                    "Failed to look up group role"
                );
                Verdict::Deny(Some(Self::DENIED.to_string()))
            }
        }
    }
}
