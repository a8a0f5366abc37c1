//! Integration tests for the runtime primitives.
//!
//! These exercise the serial queue, the listener fan-out and peer death
//! notification together, the way the server wires them: a peer's death
//! recipient posts work onto a queue, and that work notifies a subject.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use wms_core::runtime::task_queue::TaskQueue;
use wms_core::{PeerHandle, SerialTaskQueue, Subject};

#[test]
fn test_serial_queue_runs_tasks_in_submission_order_from_many_threads() {
    // Arrange
    let queue = SerialTaskQueue::spawn("test-order").expect("queue must spawn");
    let seen = Arc::new(Mutex::new(Vec::new()));

    // Act: one producer thread, so submission order is well defined.
    let producer = {
        let queue = Arc::clone(&queue);
        let seen = Arc::clone(&seen);
        std::thread::spawn(move || {
            for i in 0..100u32 {
                let seen = Arc::clone(&seen);
                queue.post(Box::new(move || seen.lock().push(i)));
            }
        })
    };
    producer.join().expect("producer must not panic");
    let dyn_queue: Arc<dyn TaskQueue> = queue.clone();
    dyn_queue
        .run_sync(Duration::from_secs(5), || ())
        .expect("barrier must complete");

    // Assert
    assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    queue.shutdown();
}

#[test]
fn test_run_sync_returns_value_and_times_out() {
    let queue = SerialTaskQueue::spawn("test-sync").expect("queue must spawn");
    let dyn_queue: Arc<dyn TaskQueue> = queue.clone();

    assert_eq!(dyn_queue.run_sync(Duration::from_secs(5), || 6 * 7), Some(42));

    // A task that blocks the worker longer than the caller is willing to wait.
    let (release_tx, release_rx) = mpsc::channel::<()>();
    dyn_queue.post(Box::new(move || {
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
    }));
    assert_eq!(dyn_queue.run_sync(Duration::from_millis(20), || 1), None);

    release_tx.send(()).expect("worker still waiting");
    queue.shutdown();
}

#[test]
fn test_peer_death_posts_cleanup_that_notifies_listeners() {
    // Arrange
    let queue = SerialTaskQueue::spawn("test-death").expect("queue must spawn");
    let subject: Arc<Subject<String>> = Arc::new(Subject::new());
    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        subject.subscribe(Arc::new(move |name: &String| received.lock().push(name.clone())));
    }
    let peer = PeerHandle::new("client-a");
    {
        let queue = Arc::clone(&queue);
        let subject = Arc::clone(&subject);
        let name = peer.name().to_string();
        peer.add_death_recipient(move || {
            queue.post(Box::new(move || {
                subject.notify(&name);
            }));
        });
    }

    // Act
    assert_eq!(peer.notify_died(), 1);
    let dyn_queue: Arc<dyn TaskQueue> = queue.clone();
    dyn_queue.run_sync(Duration::from_secs(5), || ());

    // Assert
    assert_eq!(*received.lock(), vec!["client-a".to_string()]);
    assert!(!peer.is_alive());
    assert!(peer.add_death_recipient(|| {}).is_none());
    queue.shutdown();
}

#[test]
fn test_delayed_tasks_run_after_immediate_ones() {
    let queue = SerialTaskQueue::spawn("test-delay").expect("queue must spawn");
    let order = Arc::new(Mutex::new(Vec::new()));
    let fired = Arc::new(AtomicUsize::new(0));

    {
        let order = Arc::clone(&order);
        let fired = Arc::clone(&fired);
        queue.post_delayed(
            Box::new(move || {
                order.lock().push("delayed");
                fired.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(30),
        );
    }
    {
        let order = Arc::clone(&order);
        queue.post(Box::new(move || order.lock().push("immediate")));
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while fired.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(*order.lock(), vec!["immediate", "delayed"]);
    queue.shutdown();
}
