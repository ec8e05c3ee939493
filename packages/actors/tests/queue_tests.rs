#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{EnqueueError, JobQueue};
use queue_core::JobId;
use tokio_util::sync::CancellationToken;

fn queue(capacity: usize) -> JobQueue {
    JobQueue::new(NonZeroUsize::new(capacity).unwrap())
}

#[tokio::test]
async fn test_full_queue_hands_payload_back() {
    let queue = queue(2);
    queue.enqueue(common::payload(1)).unwrap();
    queue.enqueue(common::payload(2)).unwrap();
    assert!(queue.is_full());
    assert_eq!(queue.size(), 2);

    let third = common::payload(3);
    let third_id = third.id;
    let err = queue.enqueue(third).unwrap_err();
    assert!(matches!(err, EnqueueError::Full(_)));
    assert_eq!(err.into_payload().id, third_id);
    assert_eq!(queue.size(), 2);
}

#[tokio::test]
async fn test_dequeue_is_fifo_and_frees_slots() {
    let queue = queue(3);
    let ids: Vec<JobId> = (0..3)
        .map(|i| {
            let payload = common::payload(i);
            let id = payload.id;
            queue.enqueue(payload).unwrap();
            id
        })
        .collect();

    let cancel = CancellationToken::new();
    for (n, expected) in ids.iter().enumerate() {
        let payload = queue.dequeue(&cancel).await.unwrap();
        assert_eq!(payload.id, *expected);
        assert_eq!(queue.size(), 2 - n);
    }
    queue.enqueue(common::payload(9)).unwrap();
    assert_eq!(queue.size(), 1);
}

#[tokio::test]
async fn test_cancel_wakes_idle_consumer() {
    let queue = Arc::new(queue(1));
    let cancel = CancellationToken::new();

    let waiter = tokio::spawn({
        let queue = queue.clone();
        let cancel = cancel.clone();
        async move { queue.dequeue(&cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let got = tokio::time::timeout(Duration::from_millis(200), waiter)
        .await
        .expect("dequeue returned promptly")
        .unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn test_cancel_wins_over_ready_item() {
    let queue = queue(1);
    queue.enqueue(common::payload(1)).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(queue.dequeue(&cancel).await.is_none());
    assert_eq!(queue.size(), 1);
}

#[tokio::test]
async fn test_close_rejects_and_drain_keeps_order() {
    let queue = queue(4);
    let first = common::payload(1);
    let second = common::payload(2);
    let expected = vec![first.id, second.id];
    queue.enqueue(first).unwrap();
    queue.enqueue(second).unwrap();

    queue.close().await;
    assert!(queue.is_closed());
    assert!(matches!(
        queue.enqueue(common::payload(3)),
        Err(EnqueueError::Closed(_))
    ));

    let drained: Vec<JobId> = queue.drain().await.into_iter().map(|p| p.id).collect();
    assert_eq!(drained, expected);
    assert_eq!(queue.size(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumers_see_each_item_once() {
    const ITEMS: u64 = 500;

    let queue = Arc::new(queue(16));
    let cancel = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let cancel = cancel.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let mut local = Vec::new();
                while let Some(payload) = queue.dequeue(&cancel).await {
                    local.push(payload.id);
                    seen.lock().unwrap().push(payload.id);
                }
                local
            })
        })
        .collect();

    let mut sent = Vec::new();
    for i in 0..ITEMS {
        let mut payload = common::payload(i);
        sent.push(payload.id);
        loop {
            match queue.enqueue(payload) {
                Ok(()) => break,
                Err(EnqueueError::Full(back)) => {
                    payload = back;
                    tokio::task::yield_now().await;
                }
                Err(e) => panic!("unexpected: {e}"),
            }
        }
        assert!(queue.size() <= queue.capacity());
    }

    common::wait_until(|| seen.lock().unwrap().len() == ITEMS as usize).await;
    cancel.cancel();

    let sent_order: std::collections::HashMap<JobId, usize> =
        sent.iter().enumerate().map(|(n, id)| (*id, n)).collect();
    for consumer in consumers {
        // Each consumer sees its share in enqueue order.
        let local = consumer.await.unwrap();
        let positions: Vec<usize> = local.iter().map(|id| sent_order[id]).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    let seen = seen.lock().unwrap();
    let unique: HashSet<JobId> = seen.iter().copied().collect();
    assert_eq!(unique.len(), ITEMS as usize);
    assert_eq!(queue.size(), 0);
}
