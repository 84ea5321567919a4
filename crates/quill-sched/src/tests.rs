//! Tests for the lane executor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::Lane;

#[tokio::test]
async fn test_submit_returns_outcome() {
    let lane = Lane::new("test");
    let handle = lane.submit(async { 21 * 2 }).unwrap();
    assert_eq!(handle.outcome().await.unwrap(), 42);
}

#[tokio::test]
async fn test_tasks_run_serially_in_order() {
    let lane = Lane::new("serial");
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3 {
        let log = log.clone();
        handles.push(
            lane.submit(async move {
                log.lock().unwrap().push(format!("start-{i}"));
                // Yield so an overlapping runner would interleave here.
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().unwrap().push(format!("end-{i}"));
            })
            .unwrap(),
        );
    }
    for handle in handles {
        handle.outcome().await.unwrap();
    }

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec!["start-0", "end-0", "start-1", "end-1", "start-2", "end-2"],
        "tasks must not overlap or reorder"
    );
}

#[tokio::test]
async fn test_panicking_task_does_not_kill_lane() {
    let lane = Lane::new("panicky");
    let bad = lane
        .submit(async {
            panic!("task blew up");
        })
        .unwrap();
    // The panicking task never sends its result.
    assert!(bad.outcome().await.is_err());

    // The lane keeps accepting and running tasks.
    let good = lane.submit(async { "still alive" }).unwrap();
    assert_eq!(good.outcome().await.unwrap(), "still alive");
}

#[tokio::test]
async fn test_submit_after_shutdown_is_rejected() {
    let lane = Lane::new("closed");
    lane.shutdown();
    assert!(lane.is_shutdown());
    assert!(lane.submit(async {}).is_err());
    assert!(lane.schedule(Duration::from_millis(1), async {}).is_err());
}

#[tokio::test]
async fn test_shutdown_drains_queued_tasks() {
    let lane = Lane::new("draining");
    let ran = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let ran = ran.clone();
        handles.push(
            lane.submit(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap(),
        );
    }

    lane.shutdown();
    assert!(lane.await_termination(Duration::from_secs(5)).await);
    assert_eq!(ran.load(Ordering::SeqCst), 3, "queued tasks run before exit");
    for handle in handles {
        handle.outcome().await.unwrap();
    }
}

#[tokio::test]
async fn test_shutdown_now_cancels_in_flight_task() {
    let lane = Lane::new("forced");
    let finished = Arc::new(AtomicUsize::new(0));
    let marker = finished.clone();
    let handle = lane
        .submit(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            marker.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    // Let the task reach its sleep before pulling the plug.
    tokio::time::sleep(Duration::from_millis(20)).await;
    lane.shutdown_now();

    assert!(lane.await_termination(Duration::from_secs(5)).await);
    assert!(handle.outcome().await.is_err(), "cancelled task has no outcome");
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_await_termination_times_out_while_busy() {
    let lane = Lane::new("busy");
    let _handle = lane
        .submit(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
        })
        .unwrap();
    lane.shutdown();

    assert!(
        !lane.await_termination(Duration::from_millis(30)).await,
        "termination must not be reported while a task is in flight"
    );
    assert!(lane.await_termination(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_schedule_runs_after_delay() {
    let lane = Lane::new("delayed");
    let ran = Arc::new(AtomicUsize::new(0));
    let marker = ran.clone();
    lane.schedule(Duration::from_millis(30), async move {
        marker.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 0, "not yet due");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fixed_rate_repeats_until_shutdown() {
    let lane = Lane::new("periodic");
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    lane.schedule_at_fixed_rate(Duration::ZERO, Duration::from_millis(25), move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    let before = ticks.load(Ordering::SeqCst);
    assert!(before >= 3, "expected several runs, got {before}");

    lane.shutdown();
    assert!(lane.await_termination(Duration::from_secs(5)).await);
    let at_shutdown = ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        ticks.load(Ordering::SeqCst),
        at_shutdown,
        "no runs after shutdown"
    );
}

#[tokio::test]
async fn test_fixed_rate_never_overlaps_itself() {
    let lane = Lane::new("slow-periodic");
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let flight = in_flight.clone();
    let peak = max_seen.clone();
    lane.schedule_at_fixed_rate(Duration::ZERO, Duration::from_millis(10), move || {
        let flight = flight.clone();
        let peak = peak.clone();
        async move {
            let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            // Runs three periods long; ticks keep firing meanwhile.
            tokio::time::sleep(Duration::from_millis(35)).await;
            flight.fetch_sub(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    lane.shutdown();
    assert!(lane.await_termination(Duration::from_secs(5)).await);
    assert_eq!(max_seen.load(Ordering::SeqCst), 1, "runs overlapped");
}

#[tokio::test]
async fn test_shutdown_from_inside_a_lane_task() {
    // The auditor shuts its lane down from within a lane task; the queue
    // behind that task must still drain.
    let lane = Lane::new("self-shutdown");
    let ran = Arc::new(AtomicUsize::new(0));

    // Hold the worker on a gate so everything below is enqueued before the
    // shutdown task gets a chance to run.
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
    lane.submit(async move {
        let _ = gate_rx.await;
    })
    .unwrap();

    let inner = lane.clone();
    lane.submit(async move {
        inner.shutdown();
    })
    .unwrap();
    let marker = ran.clone();
    lane.submit(async move {
        marker.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    gate_tx.send(()).unwrap();

    assert!(lane.await_termination(Duration::from_secs(5)).await);
    assert!(lane.is_shutdown());
    assert_eq!(ran.load(Ordering::SeqCst), 1, "queued task still ran");
}

#[tokio::test]
async fn test_ready_handle_resolves_immediately() {
    let handle = crate::TaskHandle::ready(Err::<(), &str>("already failed"));
    assert_eq!(handle.outcome().await.unwrap(), Err("already failed"));
}
