//! Subscription reconciliation.
//!
//! Computes the minimal set of subscribe/unsubscribe operations between
//! the live subscription set and the server-reported preference map.
//! Applying a plan is at-least-once safe: the session layer tolerates
//! subscribing to a channel it already holds and unsubscribing from one
//! it does not.

use std::collections::BTreeSet;

use beacon_client::PreferenceMap;

/// Category keys currently subscribed on the live session.
pub type SubscriptionSet = BTreeSet<String>;

/// Minimal operations that bring the live subscriptions in line with a
/// desired preference map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub subscribe: Vec<String>,
    pub unsubscribe: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscribe.len() + self.unsubscribe.len()
    }
}

/// Diff `current` against `desired`.
///
/// Keys whose state is unchanged produce no operation: running `plan`
/// again after applying its output yields an empty plan. No key is
/// emitted twice within one call.
pub fn plan(current: &SubscriptionSet, desired: &PreferenceMap) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for (key, enabled) in desired {
        if *enabled && !current.contains(key) {
            plan.subscribe.push(key.clone());
        }
    }
    for key in current {
        if !desired.get(key).copied().unwrap_or(false) {
            plan.unsubscribe.push(key.clone());
        }
    }

    plan
}

/// Single-key restriction of [`plan`], used by the toggle fast path.
pub fn plan_toggle(current: &SubscriptionSet, key: &str, enabled: bool) -> ReconcilePlan {
    let mut desired = PreferenceMap::new();
    desired.insert(key.to_string(), enabled);

    let mut current_one = SubscriptionSet::new();
    if current.contains(key) {
        current_one.insert(key.to_string());
    }

    plan(&current_one, &desired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(entries: &[(&str, bool)]) -> PreferenceMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn subs(keys: &[&str]) -> SubscriptionSet {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn subscribes_enabled_keys_not_yet_held() {
        let plan = plan(&subs(&[]), &prefs(&[("email", false), ("push", true)]));
        assert_eq!(plan.subscribe, vec!["push"]);
        assert!(plan.unsubscribe.is_empty());
    }

    #[test]
    fn unsubscribes_disabled_and_removed_keys() {
        let plan = plan(&subs(&["push", "sms"]), &prefs(&[("push", false)]));
        assert!(plan.subscribe.is_empty());
        assert_eq!(plan.unsubscribe, vec!["push", "sms"]);
    }

    #[test]
    fn unchanged_state_yields_no_ops() {
        let desired = prefs(&[("email", false), ("push", true)]);
        let plan = plan(&subs(&["push"]), &desired);
        assert!(plan.is_empty());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let desired = prefs(&[("email", true), ("push", true), ("sms", false)]);
        let first = plan(&subs(&["sms"]), &desired);

        let mut applied = subs(&["sms"]);
        for key in &first.subscribe {
            applied.insert(key.clone());
        }
        for key in &first.unsubscribe {
            applied.remove(key);
        }

        assert!(plan(&applied, &desired).is_empty());
    }

    #[test]
    fn toggle_restricts_to_one_key() {
        let current = subs(&["push", "email"]);

        let off = plan_toggle(&current, "push", false);
        assert_eq!(off.unsubscribe, vec!["push"]);
        assert!(off.subscribe.is_empty());

        let on = plan_toggle(&current, "sms", true);
        assert_eq!(on.subscribe, vec!["sms"]);
        assert!(on.unsubscribe.is_empty());

        // Already in the desired state: nothing to do.
        assert!(plan_toggle(&current, "push", true).is_empty());
        assert!(plan_toggle(&current, "sms", false).is_empty());
    }
}
