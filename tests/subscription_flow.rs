//! Subscription-change semantics: admission gating, the single pending
//! slot, server verdicts, interruption and carry-over across reconnects.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use alpaca_stream_client::{CryptoClient, StocksClient, StreamError};
use common::*;

#[tokio::test]
async fn subscribe_before_connect_fails_stocks() {
    let client = StocksClient::builder("iex").build();

    assert_eq!(
        client.subscribe_to_trades(|_| {}, ["ALPACA"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_quotes(|_| {}, ["ALPACA"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_bars(|_| {}, ["ALPACA"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_daily_bars(|_| {}, ["ALPACA"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_statuses(|_| {}, ["ALPACA"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_trades().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_quotes().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_bars().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_daily_bars().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_statuses().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
}

#[tokio::test]
async fn subscribe_before_connect_fails_crypto() {
    let client = CryptoClient::builder().build();

    assert_eq!(
        client.subscribe_to_trades(|_| {}, ["BTCUSD"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_quotes(|_| {}, ["BTCUSD"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_bars(|_| {}, ["BTCUSD"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.subscribe_to_daily_bars(|_| {}, ["BTCUSD"]).await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_trades().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_quotes().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_bars().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
    assert_eq!(
        client.unsubscribe_from_daily_bars().await,
        Err(StreamError::SubscriptionChangeBeforeConnect)
    );
}

#[tokio::test]
async fn second_change_fails_while_one_is_pending() {
    let handle = MockConnHandle::new();
    write_initial_flow(&handle);

    let client = std::sync::Arc::new(
        StocksClient::builder("iex")
            .credentials("testkey", "testsecret")
            .conn_creator(handle.creator())
            .build(),
    );
    client
        .connect(CancellationToken::new())
        .await
        .expect("handshake should succeed");
    expect_auth(&handle, "testkey", "testsecret").await;

    // An empty delta succeeds immediately, without wire traffic.
    client
        .subscribe_to_trades(|_| {}, Vec::<String>::new())
        .await
        .expect("empty delta should be a no-op");

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["ALPACA"]).await })
    };
    let sub = expect_subscribe(&handle).await;
    assert_eq!(str_list(&sub, "trades"), vec!["ALPACA".to_string()]);

    // The slot is taken until the server answers.
    assert_eq!(
        client.subscribe_to_quotes(|_| {}, ["ALPACA"]).await,
        Err(StreamError::SubscriptionChangeAlreadyInProgress)
    );

    handle.push(sub_ack_frame(&AckSets {
        trades: &["ALPACA"],
        ..Default::default()
    }));
    pending
        .await
        .unwrap()
        .expect("acknowledged change should succeed");
    assert!(client.subscriptions().await.trades.contains("ALPACA"));
}

#[tokio::test]
async fn server_errors_map_to_typed_failures_and_leave_session_alive() {
    let handle = MockConnHandle::new();
    write_initial_flow(&handle);

    let client = std::sync::Arc::new(
        CryptoClient::builder()
            .credentials("testkey", "testsecret")
            .conn_creator(handle.creator())
            .build(),
    );
    client
        .connect(CancellationToken::new())
        .await
        .expect("handshake should succeed");
    expect_auth(&handle, "testkey", "testsecret").await;

    // Symbol limit exceeded.
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["PACOIN"]).await })
    };
    let sub = expect_subscribe(&handle).await;
    assert_eq!(str_list(&sub, "trades"), vec!["PACOIN".to_string()]);
    handle.push(error_frame(405, "symbol limit exceeded"));
    assert_eq!(
        pending.await.unwrap(),
        Err(StreamError::SymbolLimitExceeded)
    );

    // Slow client.
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["PACOIN"]).await })
    };
    let sub = expect_subscribe(&handle).await;
    assert_eq!(str_list(&sub, "trades"), vec!["PACOIN".to_string()]);
    handle.push(error_frame(407, "slow client"));
    assert_eq!(pending.await.unwrap(), Err(StreamError::SlowClient));

    // The session survived both failures.
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["PACOIN"]).await })
    };
    expect_subscribe(&handle).await;
    handle.push(sub_ack_frame(&AckSets {
        trades: &["PACOIN"],
        ..Default::default()
    }));
    pending
        .await
        .unwrap()
        .expect("change should succeed after earlier rejections");
}

#[tokio::test]
async fn irrecoverable_error_during_change_terminates_client() {
    let handle = MockConnHandle::new();
    write_initial_flow(&handle);

    let client = std::sync::Arc::new(
        CryptoClient::builder()
            .credentials("testkey", "testsecret")
            .reconnect_settings(1, Duration::ZERO)
            .conn_creator(handle.creator())
            .build(),
    );
    client
        .connect(CancellationToken::new())
        .await
        .expect("handshake should succeed");
    expect_auth(&handle, "testkey", "testsecret").await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["PACOIN"]).await })
    };
    expect_subscribe(&handle).await;

    handle.push(error_frame(406, "connection limit exceeded"));

    assert_eq!(
        client.terminated().await,
        Some(StreamError::ConnectionLimitExceeded)
    );
    // The in-flight change fails with the mapped server error.
    assert_eq!(
        pending.await.unwrap(),
        Err(StreamError::ConnectionLimitExceeded)
    );
}

#[tokio::test]
async fn cancellation_interrupts_pending_change_then_rejects_new_ones() {
    let handle = MockConnHandle::new();
    write_initial_flow(&handle);

    let client = std::sync::Arc::new(
        CryptoClient::builder()
            .credentials("testkey", "testsecret")
            .conn_creator(handle.creator())
            .build(),
    );
    let cancel = CancellationToken::new();
    client
        .connect(cancel.clone())
        .await
        .expect("handshake should succeed");
    expect_auth(&handle, "testkey", "testsecret").await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["PACOIN"]).await })
    };
    let sub = expect_subscribe(&handle).await;
    assert_eq!(str_list(&sub, "trades"), vec!["PACOIN".to_string()]);

    cancel.cancel();

    assert_eq!(
        pending.await.unwrap(),
        Err(StreamError::SubscriptionChangeInterrupted)
    );

    assert_eq!(client.terminated().await, Some(StreamError::Cancelled));
    assert_eq!(
        client.subscribe_to_quotes(|_| {}, ["BTCUSD", "ETCUSD"]).await,
        Err(StreamError::SubscriptionChangeAfterTerminated)
    );
}

#[tokio::test]
async fn reconnect_replays_auth_then_carried_subscription() {
    let script = ConnScript::new();
    let conn1 = MockConnHandle::new();
    write_initial_flow(&conn1);
    script.push_conn(&conn1);

    let client = std::sync::Arc::new(
        StocksClient::builder("iex")
            .credentials("testkey", "testsecret")
            .reconnect_settings(20, Duration::from_millis(10))
            .conn_creator(script.creator())
            .build(),
    );
    client
        .connect(CancellationToken::new())
        .await
        .expect("handshake should succeed");
    expect_auth(&conn1, "testkey", "testsecret").await;

    // Subscribe; the frame reaches the wire but the server never answers.
    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.subscribe_to_trades(|_| {}, ["AL", "PACA"]).await })
    };
    let sub = expect_subscribe(&conn1).await;
    assert_eq!(
        sorted(str_list(&sub, "trades")),
        vec!["AL".to_string(), "PACA".to_string()]
    );

    // The connection drops; the in-flight change is interrupted but its
    // intent must survive into the next handshake.
    let conn2 = MockConnHandle::new();
    write_initial_flow(&conn2);
    script.push_conn(&conn2);
    conn1.close();

    assert_eq!(
        pending.await.unwrap(),
        Err(StreamError::SubscriptionChangeInterrupted)
    );

    // Replay: auth first, then exactly the carried subscription.
    expect_auth(&conn2, "testkey", "testsecret").await;
    let sub = expect_subscribe(&conn2).await;
    assert_eq!(
        sorted(str_list(&sub, "trades")),
        vec!["AL".to_string(), "PACA".to_string()]
    );

    conn2.push(sub_ack_frame(&AckSets {
        trades: &["AL", "PACA"],
        ..Default::default()
    }));

    // The commit is visible once the acknowledgement is processed.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if client.subscriptions().await.trades.contains("AL") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("acknowledged subscription should commit");
}

#[tokio::test]
async fn change_requested_while_disconnected_completes_after_reconnect() {
    let script = ConnScript::new();
    let conn1 = MockConnHandle::new();
    write_initial_flow_with_sub(
        &conn1,
        &AckSets {
            trades: &["AL", "PACA"],
            ..Default::default()
        },
    );
    script.push_conn(&conn1);

    let client = std::sync::Arc::new(
        StocksClient::builder("iex")
            .credentials("testkey", "testsecret")
            .reconnect_settings(20, Duration::from_millis(10))
            .with_trades(|_| {}, ["AL", "PACA"])
            .conn_creator(script.creator())
            .build(),
    );
    client
        .connect(CancellationToken::new())
        .await
        .expect("handshake should succeed");
    expect_auth(&conn1, "testkey", "testsecret").await;
    expect_subscribe(&conn1).await;

    // Drop the connection and let the client notice before asking for
    // a change while it is down.
    conn1.close();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.unsubscribe_from_trades().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conn2 = MockConnHandle::new();
    write_initial_flow_with_sub(
        &conn2,
        &AckSets {
            trades: &["AL", "PACA"],
            ..Default::default()
        },
    );
    script.push_conn(&conn2);

    // Replay: auth, committed set, then the queued unsubscribe.
    expect_auth(&conn2, "testkey", "testsecret").await;
    let sub = expect_subscribe(&conn2).await;
    assert_eq!(
        sorted(str_list(&sub, "trades")),
        vec!["AL".to_string(), "PACA".to_string()]
    );
    let unsub = conn2.expect_write().await;
    assert_eq!(str_field(&unsub, "action").as_deref(), Some("unsubscribe"));
    assert_eq!(
        sorted(str_list(&unsub, "trades")),
        vec!["AL".to_string(), "PACA".to_string()]
    );

    conn2.push(sub_ack_frame(&AckSets::default()));
    pending
        .await
        .unwrap()
        .expect("queued change should complete after reconnect");
    assert!(client.subscriptions().await.trades.is_empty());
}
