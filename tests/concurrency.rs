use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use lae::threaded::Worker;
use lae::{
    CancelToken, Executor, ExecutorConfig, LaeError, LockedMatrix, LockedVector, Orientation,
    Result,
};

const BLOCKED: Duration = Duration::from_millis(100);
const PATIENCE: Duration = Duration::from_secs(5);

// ============================================================
// Locked Vector
// ============================================================

#[test]
fn test_readers_do_not_block_each_other() {
    let v = Arc::new(LockedVector::new(&[4.0, 2.0], Orientation::Row));
    let barrier = Arc::new(Barrier::new(2));
    let (tx, rx) = mpsc::channel();

    for _ in 0..2 {
        let (v, barrier, tx) = (Arc::clone(&v), Arc::clone(&barrier), tx.clone());
        thread::spawn(move || {
            let guard = v.read();
            // Both threads must hold the read lock at the same time to pass.
            barrier.wait();
            tx.send(guard.get(0).unwrap()).unwrap();
        });
    }

    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), 4.0);
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), 4.0);
}

#[test]
fn test_writer_blocks_reader() {
    let v = Arc::new(LockedVector::new(&[1.0], Orientation::Row));
    let mut guard = v.write();

    let (tx, rx) = mpsc::channel();
    let reader = Arc::clone(&v);
    thread::spawn(move || tx.send(reader.get(0).unwrap()).unwrap());

    assert!(rx.recv_timeout(BLOCKED).is_err());
    guard.negate();
    drop(guard);
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), -1.0);
}

#[test]
fn test_reader_blocks_writer() {
    let v = Arc::new(LockedVector::new(&[3.0], Orientation::Row));
    let guard = v.read();

    let (tx, rx) = mpsc::channel();
    let writer = Arc::clone(&v);
    thread::spawn(move || {
        writer.write().negate();
        tx.send(()).unwrap();
    });

    assert!(rx.recv_timeout(BLOCKED).is_err());
    assert_eq!(guard.get(0).unwrap(), 3.0);
    drop(guard);
    rx.recv_timeout(PATIENCE).unwrap();
    assert_eq!(v.get(0).unwrap(), -3.0);
}

// ============================================================
// Locked Matrix
// ============================================================

#[test]
fn test_reads_never_see_a_torn_generation() {
    let matrix = Arc::new(LockedMatrix::from_rows(&vec![vec![0.0; 8]; 8]));
    let rounds = 200;

    let loader = {
        let matrix = Arc::clone(&matrix);
        thread::spawn(move || {
            for round in 0..rounds {
                let value = (round % 5) as f64;
                let rows = vec![vec![value; 8]; 8];
                if round % 2 == 0 {
                    matrix.load_row_major(&rows);
                } else {
                    matrix.load_column_major(&rows).unwrap();
                }
            }
        })
    };

    for _ in 0..rounds {
        let rows = matrix.read_row_major().unwrap();
        assert_eq!(rows.len(), 8);
        let first = rows[0][0];
        assert!(rows.iter().flatten().all(|&x| x == first), "torn read: {rows:?}");
    }
    loader.join().unwrap();
}

// ============================================================
// Worker
// ============================================================

#[test]
fn test_worker_shutdown_waits_for_queued_work() {
    let worker = Arc::new(Worker::spawn(2, 1.0).unwrap());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    worker
        .offer(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            Ok(())
        })
        .unwrap();
    started_rx.recv_timeout(PATIENCE).unwrap();
    worker.offer(|| Ok(())).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let stopper = Arc::clone(&worker);
    thread::spawn(move || {
        stopper.shutdown();
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(BLOCKED).is_err(), "shutdown should wait for space");
    release_tx.send(()).unwrap();
    done_rx.recv_timeout(PATIENCE).unwrap();
    worker.join().unwrap();
}

#[test]
fn test_many_producers_one_slot_each() {
    let workers: Arc<Vec<Worker>> =
        Arc::new((0..4).map(|id| Worker::spawn(id, 1.0).unwrap()).collect());
    let completed = Arc::new(AtomicUsize::new(0));
    let per_worker = 25;

    let producers: Vec<_> = (0..workers.len() * per_worker)
        .map(|i| {
            let (workers, completed) = (Arc::clone(&workers), Arc::clone(&completed));
            thread::spawn(move || {
                let target = &workers[i % workers.len()];
                loop {
                    let completed = Arc::clone(&completed);
                    match target.offer(move || {
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }) {
                        Ok(()) => break,
                        Err(LaeError::Busy { .. }) => thread::sleep(Duration::from_millis(1)),
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    for worker in workers.iter() {
        worker.shutdown();
        worker.join().unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), workers.len() * per_worker);
}

// ============================================================
// Executor
// ============================================================

#[test]
fn test_submit_all_is_a_barrier() {
    let executor = Executor::new(4).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let tasks = (0..10).map(|_| {
        let (active, finished) = (Arc::clone(&active), Arc::clone(&finished));
        move || -> Result<()> {
            active.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            active.fetch_sub(1, Ordering::SeqCst);
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    executor.submit_all(tasks).unwrap();

    assert_eq!(active.load(Ordering::SeqCst), 0);
    assert_eq!(finished.load(Ordering::SeqCst), 10);
    assert_eq!(executor.in_flight(), 0);
    assert_eq!(executor.idle_workers(), 4);
}

#[test]
fn test_empty_batch_returns_immediately() {
    let executor = Executor::new(1).unwrap();
    executor
        .submit_all(Vec::<Box<dyn FnOnce() -> Result<()> + Send>>::new())
        .unwrap();
}

#[test]
fn test_least_fatigued_worker_is_chosen() {
    let executor =
        Executor::with_config(ExecutorConfig::new(2).with_fatigue_range(1.0, 1.0)).unwrap();

    let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = |sleep: Duration| {
        let names = Arc::clone(&names);
        move || -> Result<()> {
            thread::sleep(sleep);
            names
                .lock()
                .push(thread::current().name().unwrap_or_default().to_owned());
            Ok(())
        }
    };

    // All idle workers start at zero; ties go to the lowest id.
    executor.submit_all([record(Duration::from_millis(50))]).unwrap();
    // Worker 0 is now far more tired than worker 1.
    executor.submit_all([record(Duration::ZERO)]).unwrap();
    executor.submit_all([record(Duration::ZERO)]).unwrap();

    assert_eq!(
        *names.lock(),
        vec!["lae-worker-0", "lae-worker-1", "lae-worker-1"]
    );
    let stats = executor.stats();
    assert!(stats[0].fatigue > stats[1].fatigue);
}

#[test]
fn test_submit_blocks_until_cancelled() {
    let executor = Arc::new(Executor::new(1).unwrap());
    let (release_tx, release_rx) = mpsc::channel::<()>();
    executor
        .submit(move || {
            release_rx.recv().ok();
            Ok(())
        })
        .unwrap();

    let token = CancelToken::new();
    let (tx, rx) = mpsc::channel();
    let submitter = {
        let (executor, token) = (Arc::clone(&executor), token.clone());
        thread::spawn(move || tx.send(executor.submit_cancellable(|| Ok(()), &token)).unwrap())
    };

    assert!(rx.recv_timeout(BLOCKED).is_err(), "submit should wait for a worker");
    token.cancel();
    let outcome = rx.recv_timeout(PATIENCE).unwrap();
    assert!(matches!(outcome, Err(LaeError::Interrupted)));
    submitter.join().unwrap();

    release_tx.send(()).unwrap();
    executor.submit_all([|| -> Result<()> { Ok(()) }]).unwrap();
    executor.shutdown().unwrap();
}

#[test]
fn test_shutdown_wakes_blocked_submitter() {
    let executor = Arc::new(Executor::new(1).unwrap());
    let (release_tx, release_rx) = mpsc::channel::<()>();
    executor
        .submit(move || {
            release_rx.recv().ok();
            Ok(())
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let blocked = Arc::clone(&executor);
    thread::spawn(move || tx.send(blocked.submit(|| Ok(()))).unwrap());
    assert!(rx.recv_timeout(BLOCKED).is_err());

    let stopper = Arc::clone(&executor);
    let stopping = thread::spawn(move || stopper.shutdown());
    assert!(matches!(
        rx.recv_timeout(PATIENCE).unwrap(),
        Err(LaeError::ShutDown)
    ));

    release_tx.send(()).unwrap();
    stopping.join().unwrap().unwrap();
    assert_eq!(executor.in_flight(), 0);
}
