use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::dispatch::{MemoryTransport, PushCall};
use crate::testing::{seed, FlakyStore};

struct Harness {
    store: Arc<FlakyStore>,
    push: Arc<MemoryTransport>,
    rel: Relationships,
}

async fn harness() -> Harness {
    let store = Arc::new(FlakyStore::temporary());
    seed(&*store, "a", "Ada", "tok-a").await;
    seed(&*store, "b", "Bob", "tok-b").await;
    seed(&*store, "c", "Cy", "").await;
    let push = Arc::new(MemoryTransport::default());
    let rel = Relationships::new(
        store.clone(),
        Dispatch::new(push.clone()),
        CommitPolicy { attempts: 3, backoff: Duration::ZERO },
    );
    Harness { store, push, rel }
}

fn id(s: &str) -> UserId {
    UserId::new(s)
}

fn invalid(result: Result<Transition, FriendError>) -> &'static str {
    match result {
        Err(FriendError::InvalidTransition(reason)) => reason,
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[tokio::test]
async fn send_creates_mirrored_pending_entries() {
    let h = harness().await;
    let t = h.rel.send(&id("a"), &id("b")).await.unwrap();
    assert_eq!(t, Transition::Requested);
    assert_eq!(t.code(), 200);

    let a = h.store.record("a").await;
    let b = h.store.record("b").await;
    assert!(a.has_request_to(&id("b")));
    assert!(b.has_request_from(&id("a")));
    assert!(!a.is_friend(&id("b")) && !b.is_friend(&id("a")));

    let sent = h.push.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, Target::Token("tok-b".into()));
    assert_eq!(sent[0].1.title, "Ada sent you a friend request");
    assert_eq!(sent[0].1.link.as_deref(), Some("/requests?from=/profile/friends"));
}

#[tokio::test]
async fn duplicate_send_is_rejected() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    assert_eq!(invalid(h.rel.send(&id("a"), &id("b")).await), REQUEST_ALREADY_SENT);
}

#[tokio::test]
async fn send_to_a_friend_is_rejected() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    h.rel.accept(&id("b"), &id("a")).await.unwrap();
    assert_eq!(invalid(h.rel.send(&id("a"), &id("b")).await), FRIEND_ALREADY_ADDED);
    assert_eq!(invalid(h.rel.send(&id("b"), &id("a")).await), FRIEND_ALREADY_ADDED);
}

#[tokio::test]
async fn reciprocal_send_auto_accepts() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    let t = h.rel.send(&id("b"), &id("a")).await.unwrap();
    assert_eq!(t, Transition::AutoAccepted);
    assert_eq!(reply(Ok(t)), (210, "Ok".to_string()));

    let a = h.store.record("a").await;
    let b = h.store.record("b").await;
    assert!(a.is_friend(&id("b")) && b.is_friend(&id("a")));
    for record in [&a, &b] {
        assert!(record.incoming_requests.is_empty());
        assert!(record.outgoing_requests.is_empty());
    }

    let calls = h.push.calls();
    assert!(calls.contains(&PushCall::Subscribe { token: "tok-a".into(), topic: "b".into() }));
    assert!(calls.contains(&PushCall::Subscribe { token: "tok-b".into(), topic: "a".into() }));
    let accepted = h.push.sent().pop().unwrap();
    assert_eq!(accepted.0, Target::Token("tok-a".into()));
    assert_eq!(accepted.1.title, "Bob accepted your friend request");
    assert_eq!(accepted.1.link.as_deref(), Some("/profile/inspect/b?from=/"));
}

#[tokio::test]
async fn accept_is_only_valid_once() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    assert_eq!(h.rel.accept(&id("b"), &id("a")).await.unwrap(), Transition::Accepted);
    assert_eq!(invalid(h.rel.accept(&id("b"), &id("a")).await), NO_FRIEND_REQUEST);
}

#[tokio::test]
async fn failed_strip_still_reports_no_request() {
    let h = harness().await;
    h.store.fail_updates("b", 1);
    assert_eq!(invalid(h.rel.accept(&id("b"), &id("a")).await), NO_FRIEND_REQUEST);
    assert!(h.store.record("b").await.friends.is_empty());
}

#[tokio::test]
async fn decline_clears_both_sides_without_notifying() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    let before = h.push.calls().len();
    assert_eq!(h.rel.decline(&id("b"), &id("a")).await.unwrap(), Transition::Declined);
    assert_eq!(h.push.calls().len(), before);

    assert!(h.store.record("a").await.outgoing_requests.is_empty());
    assert!(h.store.record("b").await.incoming_requests.is_empty());
    assert_eq!(invalid(h.rel.decline(&id("b"), &id("a")).await), NO_FRIEND_REQUEST);
    // the sender cannot decline their own request
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    assert_eq!(invalid(h.rel.decline(&id("a"), &id("b")).await), NO_FRIEND_REQUEST);
}

#[tokio::test]
async fn remove_twice_fails_the_second_time() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    h.rel.accept(&id("b"), &id("a")).await.unwrap();

    assert_eq!(h.rel.remove(&id("a"), &id("b")).await.unwrap(), Transition::Removed);
    assert_eq!(invalid(h.rel.remove(&id("a"), &id("b")).await), NOT_FRIENDS);
    assert!(h.store.record("a").await.friends.is_empty());
    assert!(h.store.record("b").await.friends.is_empty());

    let calls = h.push.calls();
    assert!(calls.contains(&PushCall::Unsubscribe { token: "tok-b".into(), topic: "a".into() }));
    assert!(calls.contains(&PushCall::Unsubscribe { token: "tok-a".into(), topic: "b".into() }));
}

#[tokio::test]
async fn revoke_withdraws_a_pending_request() {
    let h = harness().await;
    assert_eq!(invalid(h.rel.revoke(&id("a"), &id("b")).await), NO_REQUEST_SENT);
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    assert_eq!(h.rel.revoke(&id("a"), &id("b")).await.unwrap(), Transition::Revoked);
    assert!(h.store.record("a").await.outgoing_requests.is_empty());
    assert!(h.store.record("b").await.incoming_requests.is_empty());
    assert_eq!(invalid(h.rel.accept(&id("b"), &id("a")).await), NO_FRIEND_REQUEST);
}

#[tokio::test]
async fn missing_users_and_self_requests() {
    let h = harness().await;
    assert_eq!(
        reply(h.rel.send(&id("ghost"), &id("b")).await),
        (404, "user doesn't exist".to_string())
    );
    assert_eq!(
        reply(h.rel.accept(&id("a"), &id("ghost")).await),
        (404, "friend doesn't exist".to_string())
    );
    assert_eq!(invalid(h.rel.send(&id("a"), &id("a")).await), SELF_REQUEST);
}

#[tokio::test]
async fn corrupt_record_is_an_internal_error() {
    let h = harness().await;
    h.store.corrupt("b");
    assert_eq!(
        reply(h.rel.send(&id("a"), &id("b")).await),
        (500, "Internal Server Error".to_string())
    );
}

#[tokio::test]
async fn missing_token_skips_the_notification() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("c")).await.unwrap();
    assert!(h.push.sent().is_empty());
}

#[tokio::test]
async fn flaky_second_write_is_retried() {
    let h = harness().await;
    // send writes the counterpart first, then the sender
    h.store.fail_updates("a", 2);
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    assert!(h.store.record("a").await.has_request_to(&id("b")));
}

#[tokio::test]
async fn interrupted_accept_heals_on_next_load() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    // b accepts; the write to a's record keeps failing
    h.store.fail_updates("a", 3);
    assert_eq!(reply(h.rel.accept(&id("b"), &id("a")).await).0, 500);
    assert!(h.store.record("b").await.is_friend(&id("a")));
    assert!(!h.store.record("a").await.is_friend(&id("b")));

    assert!(h.push.calls().iter().all(|call| !matches!(call, PushCall::Subscribe { .. })));

    assert_eq!(h.rel.reconcile(&id("a"), &id("b")).await.unwrap(), Phase::Friends);
    let a = h.store.record("a").await;
    assert!(a.is_friend(&id("b")));
    assert!(a.outgoing_requests.is_empty());

    let calls = h.push.calls();
    assert!(calls.contains(&PushCall::Subscribe { token: "tok-a".into(), topic: "b".into() }));
    assert!(calls.contains(&PushCall::Subscribe { token: "tok-b".into(), topic: "a".into() }));

    // a healthy pair is left alone
    let before = h.push.calls().len();
    assert_eq!(h.rel.reconcile(&id("a"), &id("b")).await.unwrap(), Phase::Friends);
    assert_eq!(h.push.calls().len(), before);
}

#[tokio::test]
async fn interrupted_remove_heals_on_next_operation() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    h.rel.accept(&id("b"), &id("a")).await.unwrap();
    h.store.fail_updates("b", 3);
    assert!(h.rel.remove(&id("a"), &id("b")).await.is_err());
    assert!(h.store.record("b").await.is_friend(&id("a")));

    assert!(h.push.calls().iter().all(|call| !matches!(call, PushCall::Unsubscribe { .. })));

    // b still thinks they are friends; loading the pair drops the stale entry
    assert_eq!(invalid(h.rel.remove(&id("b"), &id("a")).await), NOT_FRIENDS);
    assert!(h.store.record("b").await.friends.is_empty());

    let calls = h.push.calls();
    assert!(calls.contains(&PushCall::Unsubscribe { token: "tok-b".into(), topic: "a".into() }));
    assert!(calls.contains(&PushCall::Unsubscribe { token: "tok-a".into(), topic: "b".into() }));
}

#[tokio::test]
async fn racing_sends_resolve_to_friends() {
    let h = harness().await;
    // both requests landed before either side saw the other's
    for (from, to) in [("a", "b"), ("b", "a")] {
        h.store
            .update(&id(from), &[FieldUpdate::SetUnion(SetField::OutgoingRequests, id(to))])
            .await
            .unwrap();
        h.store
            .update(&id(to), &[FieldUpdate::SetUnion(SetField::IncomingRequests, id(from))])
            .await
            .unwrap();
    }
    assert_eq!(invalid(h.rel.send(&id("a"), &id("b")).await), FRIEND_ALREADY_ADDED);
    assert!(h.store.record("a").await.is_friend(&id("b")));
    assert!(h.store.record("b").await.is_friend(&id("a")));

    let calls = h.push.calls();
    assert!(calls.contains(&PushCall::Subscribe { token: "tok-a".into(), topic: "b".into() }));
    assert!(calls.contains(&PushCall::Subscribe { token: "tok-b".into(), topic: "a".into() }));
}

#[tokio::test]
async fn dangling_request_half_is_stripped_before_send() {
    let h = harness().await;
    h.store
        .update(&id("a"), &[FieldUpdate::SetUnion(SetField::OutgoingRequests, id("b"))])
        .await
        .unwrap();
    assert_eq!(h.rel.send(&id("a"), &id("b")).await.unwrap(), Transition::Requested);
    assert!(h.store.record("b").await.has_request_from(&id("a")));
}

#[tokio::test]
async fn device_registration_subscribes_to_friends() {
    let h = harness().await;
    h.rel.send(&id("a"), &id("b")).await.unwrap();
    h.rel.accept(&id("b"), &id("a")).await.unwrap();
    h.rel.send(&id("c"), &id("a")).await.unwrap();
    h.rel.accept(&id("a"), &id("c")).await.unwrap();

    h.rel.register_device(&id("a"), "new-phone").await.unwrap();
    assert_eq!(h.store.record("a").await.fcm_token, "new-phone");
    let calls = h.push.calls();
    for topic in ["b", "c"] {
        assert!(calls.contains(&PushCall::Subscribe { token: "new-phone".into(), topic: topic.into() }));
    }
    assert!(matches!(
        h.rel.register_device(&id("ghost"), "t").await,
        Err(FriendError::NotFound(_))
    ));
}
