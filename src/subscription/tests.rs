use super::*;

const T: i64 = 1_700_000_000_000;

fn subscription(channel: &str, expires_at: i64) -> Subscription {
    Subscription {
        channel_id: channel.to_string(),
        resource_id: "res-1".to_string(),
        expires_at_epoch_millis: expires_at,
        renew_margin_millis: RENEW_MARGIN_MILLIS,
    }
}

fn scheduler_expiring_at(expires_at: i64) -> SubscriptionScheduler {
    SubscriptionScheduler::new(Some(SubscriptionState::new(subscription("chan-1", expires_at))))
}

#[test]
fn test_constants_match_24h_convention() {
    assert_eq!(LIFETIME_MILLIS, 86_400_000);
    assert_eq!(RENEW_MARGIN_MILLIS, 4_320_000);
    assert_eq!(
        (LIFETIME_MILLIS as f64 * RENEW_MARGIN_RATIO) as i64,
        RENEW_MARGIN_MILLIS
    );

    let policy = RenewalPolicy::default();
    assert_eq!(policy.lifetime_millis, LIFETIME_MILLIS);
    assert_eq!(policy.renew_margin_millis, RENEW_MARGIN_MILLIS);
    assert!(policy.renew_margin_millis < policy.lifetime_millis);
}

#[test]
fn test_renewal_window_boundaries() {
    let s = scheduler_expiring_at(T);

    assert_eq!(s.check_and_renew(T - 4_320_001), RenewalDecision::NoAction);
    assert_eq!(s.check_and_renew(T - 4_320_000), RenewalDecision::RenewNow);
    assert_eq!(s.check_and_renew(T - 1), RenewalDecision::RenewNow);
    assert_eq!(s.check_and_renew(T), RenewalDecision::Expired);
    assert_eq!(s.check_and_renew(T + 1), RenewalDecision::Expired);
}

#[test]
fn test_phase_transitions() {
    let s = scheduler_expiring_at(T);
    assert_eq!(s.phase(T - 5_000_000), SubscriptionPhase::Active);
    assert_eq!(s.phase(T - 4_320_000), SubscriptionPhase::RenewalDue);
    assert_eq!(s.phase(T + 1), SubscriptionPhase::Expired);

    let empty = SubscriptionScheduler::default();
    assert_eq!(empty.phase(T), SubscriptionPhase::Unregistered);
    assert_eq!(empty.check_and_renew(T), RenewalDecision::Expired);
}

#[test]
fn test_invalidated_subscription_is_expired_before_deadline() {
    let mut s = scheduler_expiring_at(T);
    s.mark_invalid();

    assert_eq!(s.phase(T - LIFETIME_MILLIS), SubscriptionPhase::Expired);
    assert_eq!(s.check_and_renew(T - LIFETIME_MILLIS), RenewalDecision::Expired);
}

#[test]
fn test_on_renewed_returns_superseded_subscription() {
    let mut s = scheduler_expiring_at(T);
    let replacement = subscription("chan-2", T + LIFETIME_MILLIS);

    let old = s.on_renewed(replacement.clone());
    assert_eq!(old.map(|o| o.channel_id), Some("chan-1".to_string()));
    assert_eq!(s.current(), Some(&replacement));
    assert_eq!(s.check_and_renew(T), RenewalDecision::NoAction);
}

#[test]
fn test_on_renewed_is_idempotent() {
    let mut s = scheduler_expiring_at(T);
    let replacement = subscription("chan-2", T + LIFETIME_MILLIS);

    let first = s.on_renewed(replacement.clone());
    let after_first = s.clone();
    let second = s.on_renewed(replacement);

    assert!(first.is_some());
    assert!(second.is_none(), "second call must not ask for another deletion");
    assert_eq!(s, after_first);
}

#[test]
fn test_on_renewed_from_unregistered() {
    let mut s = SubscriptionScheduler::default();
    assert!(s.on_renewed(subscription("chan-1", T)).is_none());
    assert!(s.matches_channel("chan-1"));
}

#[test]
fn test_on_renewed_clears_invalidation() {
    let mut s = scheduler_expiring_at(T);
    s.mark_invalid();
    s.on_renewed(subscription("chan-2", T + LIFETIME_MILLIS));
    assert!(!s.state().unwrap().invalidated);
}

#[test]
fn test_clear_and_channel_matching() {
    let mut s = scheduler_expiring_at(T);
    assert!(s.matches_channel("chan-1"));
    assert!(!s.matches_channel("chan-0"));

    let cleared = s.clear();
    assert_eq!(cleared.map(|c| c.channel_id), Some("chan-1".to_string()));
    assert!(!s.matches_channel("chan-1"));
    assert_eq!(s.phase(T), SubscriptionPhase::Unregistered);
}

#[test]
fn test_policy_from_ratio() {
    let policy = RenewalPolicy::from_ratio(LIFETIME_MILLIS, RENEW_MARGIN_RATIO).unwrap();
    assert_eq!(policy, RenewalPolicy::default());

    assert!(RenewalPolicy::from_ratio(LIFETIME_MILLIS, 0.0).is_none());
    assert!(RenewalPolicy::from_ratio(LIFETIME_MILLIS, 1.0).is_none());
    assert!(RenewalPolicy::from_ratio(0, 0.05).is_none());
}

#[test]
fn test_policy_margin_for_shortened_lifetime() {
    let policy = RenewalPolicy::default();

    // Full lifetime granted: the fixed margin applies
    assert_eq!(policy.margin_for(LIFETIME_MILLIS), RENEW_MARGIN_MILLIS);

    // One hour granted (shorter than the 72 minute margin): 5% of an hour
    assert_eq!(policy.margin_for(3_600_000), 180_000);
}

#[test]
fn test_policy_apply_keeps_renew_before_expiry() {
    let policy = RenewalPolicy::default();
    let created_at = T;

    let full = policy.apply(
        Subscription::new("c".into(), "r".into(), created_at + LIFETIME_MILLIS),
        created_at,
    );
    assert_eq!(full.renew_margin_millis, RENEW_MARGIN_MILLIS);
    assert_eq!(full.renew_at(), created_at + LIFETIME_MILLIS - RENEW_MARGIN_MILLIS);

    let short = policy.apply(
        Subscription::new("c".into(), "r".into(), created_at + 60_000),
        created_at,
    );
    assert!(short.renew_at() < short.expires_at_epoch_millis);
    assert!(short.renew_at() > created_at);
}

#[test]
fn test_tiny_grant_still_renews_before_expiry() {
    let policy = RenewalPolicy::default();

    for granted in 2..=20 {
        let margin = policy.margin_for(granted);
        assert!(margin >= 1 && margin < granted, "granted {} -> margin {}", granted, margin);

        let sub = policy.apply(Subscription::new("c".into(), "r".into(), T + granted), T);
        assert!(sub.renew_at() < sub.expires_at_epoch_millis);
    }

    // No room for a window at all
    assert_eq!(policy.margin_for(1), 0);
    assert_eq!(policy.margin_for(0), 0);
    assert_eq!(policy.margin_for(-5), 0);
}
