use std::sync::Arc;
use std::time::{Duration, Instant};

use tello::{HANDSHAKE_COMMAND, SessionState, TelloError};
use tello_test_support::FakeReply;
use tello_test_support::fixtures::{SHORT_TIMEOUT, connected_fake_session};

#[tokio::test]
async fn accepted_and_rejected_replies() {
    let (session, transport) = connected_fake_session(SHORT_TIMEOUT).await;
    transport.push_reply(FakeReply::Respond("ok".into()));
    transport.push_reply(FakeReply::Respond("error Not joystick".into()));

    let takeoff = session.send_command("takeoff").await.unwrap();
    assert!(takeoff.accepted);
    assert_eq!(takeoff.raw_response, "ok");

    let rejected = session.send_command("takeoff").await.unwrap();
    assert!(!rejected.accepted);
    assert_eq!(rejected.raw_response, "error Not joystick");

    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn each_command_consumes_exactly_one_reply() {
    let (session, transport) = connected_fake_session(SHORT_TIMEOUT).await;
    for reply in ["ok", "error Motor stop", "ok"] {
        transport.push_reply(FakeReply::Respond(reply.into()));
    }

    let mut replies = Vec::new();
    for command in ["takeoff", "flip f", "land"] {
        replies.push(session.send_command(command).await.unwrap().raw_response);
    }

    assert_eq!(replies, ["ok", "error Motor stop", "ok"]);
    assert_eq!(
        transport.stats().sent_texts(),
        ["command", "takeoff", "flip f", "land"]
    );
}

#[tokio::test]
async fn second_command_waits_for_first_reply() {
    let (session, transport) = connected_fake_session(Duration::from_secs(2)).await;

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_command("up 150").await })
    };
    assert!(transport.wait_for_sent(2, Duration::from_secs(1)).await);

    let second = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_command("land").await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.sent_count(), 2, "land went out before up 150 resolved");

    let pending = session.pending_command().expect("up 150 should be pending");
    assert_eq!(pending.payload, b"up 150");

    let released_at = Instant::now();
    transport.deliver("ok");
    let first = first.await.unwrap().unwrap();
    assert!(first.accepted);

    assert!(transport.wait_for_sent(3, Duration::from_secs(1)).await);
    transport.deliver("error Not joystick");
    let second = second.await.unwrap().unwrap();
    assert_eq!(second.raw_response, "error Not joystick");

    let sent = transport.stats().sent;
    assert_eq!(sent[2].text(), "land");
    assert!(sent[2].at >= released_at);
}

#[tokio::test]
async fn timeout_frees_the_correlation_slot() {
    let (session, transport) = connected_fake_session(SHORT_TIMEOUT).await;
    transport.push_reply(FakeReply::Silent);
    transport.push_reply(FakeReply::Respond("ok".into()));

    let err = session.send_command("flip r").await.unwrap_err();
    assert!(matches!(err, TelloError::Timeout(_)));

    assert!(session.pending_command().is_none());

    let next = session.send_command("land").await.unwrap();
    assert!(next.accepted);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn late_reply_is_not_attributed_to_next_command() {
    let (session, transport) = connected_fake_session(SHORT_TIMEOUT).await;
    transport.push_reply(FakeReply::RespondAfter(
        "error late".into(),
        SHORT_TIMEOUT * 2,
    ));
    transport.push_reply(FakeReply::Respond("ok".into()));

    let err = session.send_command("flip f").await.unwrap_err();
    assert!(err.is_timeout());

    // Let the late reply land while nothing is pending.
    tokio::time::sleep(SHORT_TIMEOUT * 2).await;

    let next = session.send_command("land").await.unwrap();
    assert_eq!(next.raw_response, "ok");
}

#[tokio::test]
async fn per_call_timeout_overrides_default() {
    let (session, transport) = connected_fake_session(Duration::from_secs(30)).await;
    transport.push_reply(FakeReply::Silent);

    let started = Instant::now();
    let err = session
        .send_command_with_timeout("go 200 0 200 100", Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn close_fails_pending_command_promptly() {
    let (session, transport) = connected_fake_session(Duration::from_secs(30)).await;
    transport.push_reply(FakeReply::Silent);

    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_command("takeoff").await })
    };
    assert!(transport.wait_for_sent(2, Duration::from_secs(1)).await);

    session.close();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("pending command should resolve after close")
        .unwrap();
    assert!(matches!(result, Err(TelloError::ConnectionClosed)));
}

#[tokio::test]
async fn handshake_is_the_first_datagram() {
    let (_session, transport) = connected_fake_session(SHORT_TIMEOUT).await;

    let sent = transport.stats().sent;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload, HANDSHAKE_COMMAND);
}
