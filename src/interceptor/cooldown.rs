//! Per-user rate limiting of queries.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::Verdict;
use crate::model::{PostDestination, UserIdentifier};

/// Rejects a user's query if their previous admitted query was less than
/// `cooldown` ago.
#[derive(Debug)]
pub struct CooldownInterceptor {
    cooldown: Duration,
    exempt: Vec<String>,
    last_query: Mutex<HashMap<UserIdentifier, Instant>>,
}

impl CooldownInterceptor {
    /// `exempt` entries are either bare user ids or `adapter:user_id`.
    #[must_use]
    pub fn new(cooldown: Duration, exempt: Vec<String>) -> Self {
        Self {
            cooldown,
            exempt,
            last_query: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn check(&self, dest: &PostDestination) -> Verdict {
        if self.cooldown.is_zero() {
            return Verdict::Allow;
        }
        let Some(user) = dest.identifier() else {
            return Verdict::Allow;
        };
        if dest.user_listed_in(&self.exempt) {
            return Verdict::Allow;
        }

        let now = Instant::now();
        let mut last_query = self
            .last_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match last_query.get(&user) {
            Some(last) if now.duration_since(*last) < self.cooldown => {
                let remaining = self.cooldown - now.duration_since(*last);
                let secs = remaining.as_secs_f64().ceil() as u64;
                debug!(user = %user, remaining_secs = secs, "Query rejected by cooldown");
                Verdict::Deny(Some(format!(
                    "You are querying too fast, please wait {secs} more seconds."
                )))
            }
            _ => {
                last_query.insert(user, now);
                Verdict::Allow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest() -> PostDestination {
        PostDestination::user("onebot", "42")
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_window() {
        let interceptor = CooldownInterceptor::new(Duration::from_secs(60), vec![]);

        assert_eq!(interceptor.check(&dest()), Verdict::Allow);

        tokio::time::advance(Duration::from_millis(10_500)).await;
        assert_eq!(
            interceptor.check(&dest()),
            Verdict::Deny(Some(
                "You are querying too fast, please wait 50 more seconds.".to_string()
            ))
        );

        tokio::time::advance(Duration::from_millis(49_500)).await;
        assert_eq!(interceptor.check(&dest()), Verdict::Allow);

        // The admitted query restarted the clock.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!interceptor.check(&dest()).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_query_does_not_restart_clock() {
        let interceptor = CooldownInterceptor::new(Duration::from_secs(10), vec![]);
        assert!(interceptor.check(&dest()).is_allowed());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!interceptor.check(&dest()).is_allowed());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(interceptor.check(&dest()).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_tracked_per_adapter() {
        let interceptor = CooldownInterceptor::new(Duration::from_secs(60), vec![]);
        assert!(interceptor.check(&PostDestination::user("onebot", "42")).is_allowed());
        assert!(interceptor.check(&PostDestination::user("telegram", "42")).is_allowed());
        assert!(!interceptor.check(&PostDestination::user("onebot", "42")).is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_without_cooldown_user_or_for_exempt() {
        let disabled = CooldownInterceptor::new(Duration::ZERO, vec![]);
        assert!(disabled.check(&dest()).is_allowed());
        assert!(disabled.check(&dest()).is_allowed());

        let interceptor = CooldownInterceptor::new(Duration::from_secs(60), vec!["onebot:42".into()]);
        assert!(interceptor.check(&dest()).is_allowed());
        assert!(interceptor.check(&dest()).is_allowed());

        let group_only = PostDestination::group("onebot", None, "100");
        assert!(interceptor.check(&group_only).is_allowed());
        assert!(interceptor.check(&group_only).is_allowed());
    }
}
