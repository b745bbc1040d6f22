//! Admission checks run before a command executes.
//!
//! Interceptors form a tree: leaves inspect the destination, and
//! [`Interceptor::All`] / [`Interceptor::Any`] combine children with
//! short-circuit AND / OR.

pub mod cooldown;
pub mod permission;

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

pub use self::cooldown::CooldownInterceptor;
pub use self::permission::{BlacklistInterceptor, GroupAdminInterceptor, SuperuserInterceptor};
use crate::model::PostDestination;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Rejected, with an optional message for the user.
    Deny(Option<String>),
}

impl Verdict {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Clone)]
pub enum Interceptor {
    /// Always passes.
    Allow,
    /// Passes when every child passes; reports the first denial.
    All(Vec<Interceptor>),
    /// Passes when some child passes; reports the last denial.
    Any(Vec<Interceptor>),
    Cooldown(Arc<CooldownInterceptor>),
    Blacklist(Arc<BlacklistInterceptor>),
    Superuser(Arc<SuperuserInterceptor>),
    GroupAdmin(Arc<GroupAdminInterceptor>),
}

impl Interceptor {
    /// Evaluate the tree for `dest`.
    pub fn check<'a>(&'a self, dest: &'a PostDestination) -> BoxFuture<'a, Verdict> {
        async move {
            match self {
                Self::Allow => Verdict::Allow,
                Self::All(children) => {
                    for child in children {
                        let verdict = child.check(dest).await;
                        if !verdict.is_allowed() {
                            return verdict;
                        }
                    }
                    Verdict::Allow
                }
                Self::Any(children) => {
                    let mut last = Verdict::Deny(None);
                    for child in children {
                        let verdict = child.check(dest).await;
                        if verdict.is_allowed() {
                            return verdict;
                        }
                        last = verdict;
                    }
                    last
                }
                Self::Cooldown(cooldown) => cooldown.check(dest),
                Self::Blacklist(blacklist) => blacklist.check(dest),
                Self::Superuser(superuser) => superuser.check(dest),
                Self::GroupAdmin(admin) => admin.check(dest).await,
            }
        }
        .boxed()
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => f.write_str("Allow"),
            Self::All(children) => f.debug_tuple("All").field(children).finish(),
            Self::Any(children) => f.debug_tuple("Any").field(children).finish(),
            Self::Cooldown(_) => f.write_str("Cooldown"),
            Self::Blacklist(_) => f.write_str("Blacklist"),
            Self::Superuser(_) => f.write_str("Superuser"),
            Self::GroupAdmin(_) => f.write_str("GroupAdmin"),
        }
    }
}
