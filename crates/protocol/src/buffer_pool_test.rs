//! Tests for the bounded buffer pool

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::time::timeout;

use crate::buffer_pool::{BufferPool, PoolMetricsSnapshot};

#[test]
fn test_new_pool() {
    let pool = BufferPool::new(10, 1024);

    assert_eq!(pool.capacity(), 10);
    assert_eq!(pool.available(), 10);
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(pool.buffer_capacity(), 1024);
}

#[test]
#[should_panic(expected = "at least one buffer")]
fn test_zero_sized_pool_rejected() {
    let _ = BufferPool::new(0, 1024);
}

#[tokio::test]
async fn test_acquire_returns_empty_buffer_with_capacity() {
    let pool = BufferPool::new(5, 4096);

    let buf = pool.acquire().await.unwrap();
    assert!(buf.is_empty());
    assert!(buf.capacity() >= 4096);
    assert_eq!(pool.available(), 4);
    assert_eq!(pool.in_flight(), 1);
}

#[tokio::test]
async fn test_release_returns_buffer_to_pool() {
    let pool = BufferPool::new(5, 1024);

    let buf = pool.acquire().await.unwrap();
    pool.release(buf);

    assert_eq!(pool.available(), 5);
    let snapshot = pool.metrics().snapshot();
    assert_eq!(snapshot.acquires, 1);
    assert_eq!(snapshot.releases, 1);
}

#[tokio::test]
async fn test_release_clears_buffer() {
    let pool = BufferPool::new(1, 1024);

    let mut buf = pool.acquire().await.unwrap();
    buf.extend_from_slice(b"hello world");
    pool.release(buf);

    let buf = pool.acquire().await.unwrap();
    assert!(buf.is_empty());
}

#[tokio::test]
async fn test_exhausted_pool_does_not_hand_out_more() {
    let pool = BufferPool::new(2, 64);

    let _b1 = pool.acquire().await.unwrap();
    let _b2 = pool.acquire().await.unwrap();
    assert_eq!(pool.in_flight(), 2);

    let third = timeout(Duration::from_millis(20), pool.acquire()).await;
    assert!(third.is_err());
    assert_eq!(pool.in_flight(), 2);
}

#[tokio::test]
async fn test_acquire_waits_until_release() {
    let pool = Arc::new(BufferPool::new(1, 64));

    let held = pool.acquire().await.unwrap();

    // Nothing left - a second acquire must not complete
    let blocked = timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(blocked.is_err(), "acquire should wait while the pool is empty");

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::task::yield_now().await;

    pool.release(held);

    let buf = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should wake after release")
        .unwrap()
        .unwrap();
    assert!(buf.capacity() >= 64);
    assert!(pool.metrics().snapshot().waits >= 1);
}

#[tokio::test]
async fn test_release_replaces_shrunk_buffer() {
    let pool = BufferPool::new(1, 1024);

    let buf = pool.acquire().await.unwrap();
    drop(buf);
    pool.release(BytesMut::with_capacity(16));

    let buf = pool.acquire().await.unwrap();
    assert!(buf.capacity() >= 1024);
    assert_eq!(pool.metrics().snapshot().replacements, 1);
}

#[test]
fn test_release_into_full_pool_drops_surplus() {
    let pool = BufferPool::new(2, 1024);

    pool.release(BytesMut::with_capacity(1024));

    let snapshot = pool.metrics().snapshot();
    assert_eq!(snapshot.drops, 1);
    assert_eq!(snapshot.releases, 0);
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn test_in_flight_never_exceeds_pool_size() {
    const POOL_SIZE: usize = 4;
    let pool = Arc::new(BufferPool::new(POOL_SIZE, 128));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let pool = Arc::clone(&pool);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            for _ in 0..20 {
                let buf = pool.acquire().await.unwrap();
                peak.fetch_max(pool.in_flight(), std::sync::atomic::Ordering::Relaxed);
                tokio::task::yield_now().await;
                pool.release(buf);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(std::sync::atomic::Ordering::Relaxed) <= POOL_SIZE);
    assert_eq!(pool.available(), POOL_SIZE);
    let snapshot = pool.metrics().snapshot();
    assert_eq!(snapshot.acquires, 32 * 20);
    assert_eq!(snapshot.releases, 32 * 20);
    assert_eq!(snapshot.drops, 0);
}

#[test]
fn test_wait_rate() {
    let snapshot = PoolMetricsSnapshot {
        acquires: 4,
        waits: 1,
        ..Default::default()
    };
    assert!((snapshot.wait_rate() - 0.25).abs() < f64::EPSILON);
    assert_eq!(PoolMetricsSnapshot::default().wait_rate(), 0.0);
}
