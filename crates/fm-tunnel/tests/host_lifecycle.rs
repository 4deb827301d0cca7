//! Connect/disconnect lifecycle against an in-process SSH stand-in

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::*;
use fm_core::config::ForwardConfig;
use fm_core::error::HostError;
use fm_core::HostStatus;
use fm_tunnel::Host;

#[tokio::test]
async fn test_connect_relay_disconnect() {
    let ssh = ssh_endpoint().await;
    let echo = echo_server().await;
    let key = key_file();
    let local = free_port();

    let connector = Arc::new(FakeConnector::default());
    let host = Host::new(
        host_config(ssh, &key).with_forward(forward_config("echo", local, echo)),
        Arc::new(settings()),
        connector.clone(),
    );

    assert_eq!(connect(&host).await, HostStatus::Connected);
    assert_eq!(host.status_and_link(), (HostStatus::Connected, true));
    let forward = host.forwards()[0].clone();
    assert!(forward.is_listening());

    let mut client = TcpStream::connect(("127.0.0.1", local)).await.unwrap();
    client.write_all(b"over the tunnel").await.unwrap();
    let mut buf = [0u8; 15];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"over the tunnel");
    assert_eq!(connector.last_session().channels.load(Ordering::SeqCst), 1);

    assert_eq!(disconnect(&host).await, HostStatus::Disconnected);
    assert_eq!(host.status_and_link(), (HostStatus::Disconnected, false));
    assert!(!forward.is_listening());
    assert_eq!(forward.session_count(), 0);
    assert_eq!(connector.last_session().closes.load(Ordering::SeqCst), 1);

    // The relay was cancelled, so the client sees the connection end
    let n = client.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
    assert!(TcpStream::connect(("127.0.0.1", local)).await.is_err());
}

#[tokio::test]
async fn test_missing_key_fails_then_cools_down() {
    let ssh = ssh_endpoint().await;
    let local = free_port();

    let mut config = host_config(ssh, &key_file());
    config.privkey = "/nonexistent/fwdmng/id_ed25519".into();
    let host = Host::new(
        config.with_forward(forward_config("web", local, 80)),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );
    let mut status = host.subscribe();

    assert_eq!(connect(&host).await, HostStatus::Failure);
    assert_eq!(host.status_and_link(), (HostStatus::Failure, false));
    assert!(!host.forwards()[0].is_listening());

    // Only a settled host may connect again
    assert!(matches!(
        host.connect(|_| {}),
        Err(HostError::InvalidTransition { status: HostStatus::Failure, .. })
    ));

    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == HostStatus::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(!host.forwards()[0].is_listening());
}

#[tokio::test]
async fn test_rejected_handshake_fails() {
    let ssh = ssh_endpoint().await;
    let key = key_file();
    let host = Host::new(
        host_config(ssh, &key),
        Arc::new(settings()),
        Arc::new(FakeConnector::rejecting()),
    );

    assert_eq!(connect(&host).await, HostStatus::Failure);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails() {
    let key = key_file();
    let host = Host::new(
        host_config(free_port(), &key),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );

    assert_eq!(connect(&host).await, HostStatus::Failure);
}

#[tokio::test]
async fn test_disabled_forward_never_listens() {
    let ssh = ssh_endpoint().await;
    let key = key_file();
    let host = Host::new(
        host_config(ssh, &key).with_forward(ForwardConfig::new("off", ":0", "127.0.0.1:80")),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );

    assert_eq!(connect(&host).await, HostStatus::Connected);
    assert!(!host.forwards()[0].is_listening());
    disconnect(&host).await;
}

#[tokio::test]
async fn test_status_transitions_are_legal() {
    let ssh = ssh_endpoint().await;
    let key = key_file();
    let host = Host::new(
        host_config(ssh, &key),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );
    let mut transitions = host.transitions();

    connect(&host).await;
    assert!(matches!(
        host.connect(|_| {}),
        Err(HostError::InvalidTransition { operation: "connect", .. })
    ));
    disconnect(&host).await;

    // Same host, now pointing at a key that is gone
    let mut broken = host.to_config();
    broken.privkey = "/nonexistent/fwdmng/key".into();
    host.update_target(broken);
    assert_eq!(connect(&host).await, HostStatus::Failure);
    eventually(|| host.status() == HostStatus::Disconnected).await;

    let mut seen = Vec::new();
    while let Ok(change) = transitions.try_recv() {
        assert!(
            change.from.can_transition_to(change.to),
            "{} -> {}",
            change.from,
            change.to
        );
        seen.push((change.from, change.to));
    }

    use HostStatus::*;
    assert_eq!(
        seen,
        vec![
            (Disconnected, Connecting),
            (Connecting, Connected),
            (Connected, Disconnecting),
            (Disconnecting, Disconnected),
            (Disconnected, Connecting),
            (Connecting, Failure),
            (Failure, Disconnected),
        ]
    );
}

#[tokio::test]
async fn test_reconnect_reuses_ports() {
    let ssh = ssh_endpoint().await;
    let echo = echo_server().await;
    let key = key_file();
    let local = free_port();
    let connector = Arc::new(FakeConnector::default());
    let host = Host::new(
        host_config(ssh, &key).with_forward(forward_config("echo", local, echo)),
        Arc::new(settings()),
        connector.clone(),
    );

    for _ in 0..2 {
        assert_eq!(connect(&host).await, HostStatus::Connected);
        assert!(host.forwards()[0].is_listening());
        assert_eq!(disconnect(&host).await, HostStatus::Disconnected);
    }
    assert_eq!(connector.sessions.lock().len(), 2);
}

#[tokio::test]
async fn test_keepalive_runs_only_while_connected() {
    let ssh = ssh_endpoint().await;
    let key = key_file();
    let connector = Arc::new(FakeConnector::default());
    let host = Host::new(host_config(ssh, &key), Arc::new(settings()), connector.clone());

    connect(&host).await;
    let session = connector.last_session();
    eventually(|| session.keepalives.load(Ordering::SeqCst) >= 1).await;

    disconnect(&host).await;
    let after = session.keepalives.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.keepalives.load(Ordering::SeqCst), after);
}

#[tokio::test]
async fn test_forward_added_while_connected_listens() {
    let ssh = ssh_endpoint().await;
    let echo = echo_server().await;
    let key = key_file();
    let host = Host::new(
        host_config(ssh, &key),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );
    connect(&host).await;

    let local = free_port();
    let forward = host.add_forward(forward_config("late", local, echo)).await;
    assert!(forward.is_listening());

    let mut client = TcpStream::connect(("127.0.0.1", local)).await.unwrap();
    client.write_all(b"hi").await.unwrap();
    let mut buf = [0u8; 2];
    client.read_exact(&mut buf).await.unwrap();

    disconnect(&host).await;
    assert!(!forward.is_listening());
}

#[tokio::test]
async fn test_edit_local_restarts_listener() {
    let ssh = ssh_endpoint().await;
    let echo = echo_server().await;
    let key = key_file();
    let first = free_port();
    let host = Host::new(
        host_config(ssh, &key).with_forward(forward_config("echo", first, echo)),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );
    connect(&host).await;
    let forward = host.forwards()[0].clone();

    // Remote-only edit keeps the listener where it is
    let other_echo = echo_server().await;
    host.edit_forward(forward.id(), forward_config("echo", first, other_echo))
        .await
        .unwrap();
    assert_eq!(forward.local_addr().map(|a| a.port()), Some(first));

    let second = free_port();
    host.edit_forward(forward.id(), forward_config("echo", second, other_echo))
        .await
        .unwrap();
    assert_eq!(forward.local_addr().map(|a| a.port()), Some(second));
    assert!(TcpStream::connect(("127.0.0.1", first)).await.is_err());

    // Disabling the port leaves it stopped
    host.edit_forward(forward.id(), ForwardConfig::new("echo", ":0", "127.0.0.1:1"))
        .await
        .unwrap();
    assert!(!forward.is_listening());

    disconnect(&host).await;
}

#[tokio::test]
async fn test_edit_while_disconnected_does_not_listen() {
    let key = key_file();
    let host = Host::new(
        host_config(free_port(), &key).with_forward(forward_config("echo", free_port(), 80)),
        Arc::new(settings()),
        Arc::new(FakeConnector::default()),
    );
    let forward = host.forwards()[0].clone();

    host.edit_forward(forward.id(), forward_config("echo", free_port(), 80))
        .await
        .unwrap();
    assert!(!forward.is_listening());
}
