//! Event loop lifecycle driven from multiple threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strand_core::{Event, EventLoop, Task, WaitStatus};

fn counting_event(count: &Arc<AtomicUsize>) -> Event {
    let count = count.clone();
    Event::slot(move || {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn stop_from_another_thread_ends_run() {
    let event_loop = EventLoop::new();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        event_loop.post_event(counting_event(&count));
    }

    let handle = EventLoop::launch_in_thread(event_loop.clone());
    event_loop.stop();
    event_loop.wait();
    handle.join().unwrap();

    assert!(!event_loop.is_started());
    assert!(!event_loop.is_running());
}

#[test]
fn post_stop_event_drains_prior_events_only() {
    let event_loop = EventLoop::new();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        event_loop.post_event(counting_event(&count));
    }

    let handle = EventLoop::launch_in_thread(event_loop.clone());

    event_loop.post_stop_event();
    event_loop.wait();
    handle.join().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);

    // A stopped loop cannot be driven again without a new run; starting
    // and stopping leaves the late events queued.
    event_loop.start();
    event_loop.post_event(counting_event(&count));
    event_loop.post_event(counting_event(&count));
    event_loop.stop();
    event_loop.wait();
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn wait_blocks_until_a_posted_stop() {
    let event_loop = EventLoop::new();
    let count = Arc::new(AtomicUsize::new(0));

    let handle = EventLoop::launch_in_thread(event_loop.clone());

    event_loop.post_event(counting_event(&count));
    event_loop.post_event(counting_event(&count));
    event_loop.post_stop_event();
    event_loop.wait();

    assert_eq!(count.load(Ordering::SeqCst), 2);
    handle.join().unwrap();
}

#[test]
fn task_posted_from_owner_thread_runs_inline() {
    let event_loop = EventLoop::new();
    event_loop.start();

    let work = Arc::new(AtomicUsize::new(0));
    let work_clone = work.clone();
    let task = Task::new(move || {
        for _ in 0..1000 {
            work_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    // The calling thread owns the loop, so the task is invoked during the
    // post itself, before any event processing.
    event_loop.post_task(task.clone());
    assert_eq!(work.load(Ordering::SeqCst), 1000);
    assert_eq!(task.wait(), WaitStatus::Finished);

    event_loop.stop();
}

#[test]
fn task_posted_across_threads_completes_on_the_loop() {
    let event_loop = EventLoop::new();
    let handle = EventLoop::launch_in_thread(event_loop.clone());

    let work = Arc::new(AtomicUsize::new(0));
    let work_clone = work.clone();
    let task = Task::new(move || {
        for _ in 0..1000 {
            work_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    event_loop.post_task(task.clone());
    let status = task.wait();
    assert!(matches!(status, WaitStatus::Ready | WaitStatus::Finished));
    assert_eq!(work.load(Ordering::SeqCst), 1000);

    EventLoop::remove_from_thread(&event_loop, handle, true);
}

#[test]
fn loop_restarts_in_a_new_thread() {
    let event_loop = EventLoop::new();
    let count = Arc::new(AtomicUsize::new(0));

    let first = EventLoop::launch_in_thread(event_loop.clone());
    event_loop.post_event(counting_event(&count));
    EventLoop::remove_from_thread(&event_loop, first, true);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let second = EventLoop::launch_in_thread(event_loop.clone());
    event_loop.post_event(counting_event(&count));
    event_loop.post_event(counting_event(&count));
    EventLoop::remove_from_thread(&event_loop, second, true);
    assert_eq!(count.load(Ordering::SeqCst), 3);
}
