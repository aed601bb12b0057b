//! Integration tests for the connection registry actor.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.
//! We test the panic-free behavior of production code through assertions.

use std::net::SocketAddr;

use lanchat_core::{ClientInfo, ConnectionId};
use lanchatd::registry::{spawn_registry, Member, RegistryError};
use lanchatd::server::PeerWriter;
use tokio_util::sync::CancellationToken;

fn addr(id: u64) -> SocketAddr {
    format!("192.168.0.{}:{}", id % 250 + 1, 40000 + id).parse().unwrap()
}

fn create_member(id: u64) -> Member {
    Member::new(
        ClientInfo::new(ConnectionId::new(id), addr(id)),
        PeerWriter::new(tokio::io::sink()),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn test_register_and_remove() {
    let registry = spawn_registry(10);

    registry.register(create_member(1)).await.unwrap();
    assert_eq!(registry.len().await, 1);

    let removed = registry.remove(ConnectionId::new(1)).await;
    assert_eq!(removed.map(|m| m.id()), Some(ConnectionId::new(1)));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let registry = spawn_registry(10);
    registry.register(create_member(1)).await.unwrap();

    assert!(registry.remove(ConnectionId::new(1)).await.is_some());
    assert!(registry.remove(ConnectionId::new(1)).await.is_none());
    assert!(registry.remove(ConnectionId::new(1)).await.is_none());
}

#[tokio::test]
async fn test_remove_unknown_is_noop() {
    let registry = spawn_registry(10);
    registry.register(create_member(1)).await.unwrap();

    assert!(registry.remove(ConnectionId::new(99)).await.is_none());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_duplicate_registration_fails() {
    let registry = spawn_registry(10);
    registry.register(create_member(1)).await.unwrap();

    let result = registry.register(create_member(1)).await;
    assert_eq!(
        result,
        Err(RegistryError::AlreadyRegistered(ConnectionId::new(1)))
    );
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_capacity_limit() {
    let registry = spawn_registry(2);
    registry.register(create_member(1)).await.unwrap();
    registry.register(create_member(2)).await.unwrap();

    let result = registry.register(create_member(3)).await;
    assert_eq!(result, Err(RegistryError::RegistryFull { max: 2 }));

    // Space frees up after a removal
    registry.remove(ConnectionId::new(1)).await;
    registry.register(create_member(3)).await.unwrap();
    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn test_snapshot_is_point_in_time() {
    let registry = spawn_registry(10);
    for id in 1..=3 {
        registry.register(create_member(id)).await.unwrap();
    }

    let snapshot = registry.snapshot().await;
    registry.remove(ConnectionId::new(2)).await;
    registry.register(create_member(4)).await.unwrap();

    let ids: Vec<u64> = snapshot.iter().map(|m| m.id().as_u64()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let ids: Vec<u64> = registry
        .snapshot()
        .await
        .iter()
        .map(|m| m.id().as_u64())
        .collect();
    assert_eq!(ids, vec![1, 3, 4]);
}

#[tokio::test]
async fn test_set_username_shows_in_list() {
    let registry = spawn_registry(10);
    registry.register(create_member(1)).await.unwrap();
    registry.register(create_member(2)).await.unwrap();

    assert!(registry.set_username(ConnectionId::new(2), "alice").await);
    assert!(!registry.set_username(ConnectionId::new(9), "ghost").await);

    let clients = registry.list().await;
    assert_eq!(clients.len(), 2);
    assert_eq!(clients[0].username, None);
    assert_eq!(clients[1].username.as_deref(), Some("alice"));
    assert_eq!(clients[1].addr, addr(2));
}

#[tokio::test]
async fn test_clear_returns_all_members() {
    let registry = spawn_registry(10);
    for id in 1..=4 {
        registry.register(create_member(id)).await.unwrap();
    }

    let cleared = registry.clear().await;
    assert_eq!(cleared.len(), 4);
    assert!(registry.is_empty().await);
    assert!(registry.clear().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration() {
    let registry = spawn_registry(100);

    let mut handles = Vec::new();
    for id in 1..=50 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.register(create_member(id)).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry.len().await, 50);
    assert_eq!(registry.list().await.len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_remove_has_single_winner() {
    let registry = spawn_registry(10);
    registry.register(create_member(1)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.remove(ConnectionId::new(1)).await.is_some()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert!(registry.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_operations() {
    let registry = spawn_registry(100);

    let mut handles = Vec::new();
    for id in 1..=40u64 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.register(create_member(id)).await.unwrap();
            let _ = registry.snapshot().await;
            if id % 2 == 0 {
                registry.remove(ConnectionId::new(id)).await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let remaining = registry.snapshot().await;
    assert_eq!(remaining.len(), 20);
    assert!(remaining.iter().all(|m| m.id().as_u64() % 2 == 1));
}
