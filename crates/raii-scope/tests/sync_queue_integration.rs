//! Integration tests for the serial queue
//!
//! Covers mutual exclusion under concurrent producers, drain barriers,
//! worker shutdown and the process-wide unobserved failure hook.

mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fixtures::init_tracing;
use parking_lot::Mutex;
use raii_scope::{
    set_unobserved_failure_hook, take_unobserved_failure_hook, QueueConfig, QueueError, SerialQueue,
};

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("job {0} failed")]
    Failed(usize),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Validates that units submitted from many tasks never overlap.
///
/// # Test Steps
/// 1. Spawn 8 producers that each enqueue 25 units
/// 2. Each unit bumps an "active" gauge, yields, then drops it
/// 3. Verify the gauge never exceeded 1 and every unit ran
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_never_overlap() -> Result<()> {
    init_tracing();
    let queue = SerialQueue::new(QueueConfig::new("producers"))?;
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let ran = Arc::new(AtomicUsize::new(0));

    let mut producers = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        let (active, max_active, ran) = (active.clone(), max_active.clone(), ran.clone());
        producers.push(tokio::spawn(async move {
            let mut pending = Vec::new();
            for _ in 0..25 {
                let (active, max_active, ran) = (active.clone(), max_active.clone(), ran.clone());
                pending.push(queue.enqueue("gauge", move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, JobError>(())
                }));
            }
            for unit in pending {
                unit.await?;
            }
            Ok::<_, JobError>(())
        }));
    }

    for producer in producers {
        producer.await??;
    }

    assert_eq!(ran.load(Ordering::SeqCst), 200);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    let metrics = queue.metrics();
    assert_eq!(metrics.total_enqueued, 200);
    assert_eq!(metrics.total_completed, 200);
    Ok(())
}

/// Validates that results keep their submission identity when units finish
/// at different speeds, and that failures in between do not disturb them.
#[tokio::test(flavor = "multi_thread")]
async fn test_mixed_outcomes_resolve_their_own_pending() -> Result<()> {
    let queue = SerialQueue::new(QueueConfig::new("mixed"))?;
    let order = Arc::new(Mutex::new(Vec::new()));

    let pending: Vec<_> = (0..6_usize)
        .map(|i| {
            let order = Arc::clone(&order);
            queue.enqueue("job", move || async move {
                tokio::time::sleep(Duration::from_millis((6 - i as u64) * 2)).await;
                order.lock().push(i);
                if i % 3 == 2 {
                    Err(JobError::Failed(i))
                } else {
                    Ok(i * 10)
                }
            })
        })
        .collect();

    let mut results = Vec::new();
    for unit in pending {
        results.push(unit.await.map_err(|e| e.to_string()));
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(
        results,
        vec![
            Ok(0),
            Ok(10),
            Err("job 2 failed".to_string()),
            Ok(30),
            Ok(40),
            Err("job 5 failed".to_string()),
        ]
    );
    assert!((queue.metrics().failure_rate() - 2.0 / 6.0).abs() < 1e-9);
    Ok(())
}

/// Validates that units already queued still run after every queue handle
/// is dropped, and that the worker then stops.
#[tokio::test(flavor = "multi_thread")]
async fn test_queued_units_drain_after_handles_drop() -> Result<()> {
    let queue = SerialQueue::new(QueueConfig::new("draining"))?;
    let observer = queue.clone();

    let unit = queue.enqueue("late", || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, JobError>("done")
    });
    drop(queue);
    assert!(!observer.is_closed());
    drop(observer);

    assert_eq!(unit.await?, "done");
    Ok(())
}

/// Validates the process-wide hook for failures no caller awaited.
///
/// # Test Steps
/// 1. Install a global hook that records failures from this queue label
/// 2. Drop the `Pending` of a failing unit
/// 3. Verify the hook saw the failure once, then remove the hook
#[tokio::test(flavor = "multi_thread")]
async fn test_global_unobserved_hook() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        set_unobserved_failure_hook(move |failure| {
            if failure.queue == "global-hook" {
                seen.lock().push(format!("{}: {}", failure.operation, failure.error));
            }
        });
    }

    let queue = SerialQueue::new(QueueConfig::new("global-hook"))?;
    drop(queue.enqueue("flush", || async { Err::<(), _>(JobError::Failed(9)) }));
    queue.idle().await;

    assert!(take_unobserved_failure_hook().is_some());
    assert_eq!(*seen.lock(), vec!["flush: job 9 failed"]);
    assert_eq!(queue.metrics().total_unobserved, 1);
    Ok(())
}
