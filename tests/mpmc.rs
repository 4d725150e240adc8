use crossbeam_utils::Backoff;
use ringqueue_lf::{PopError, QueueBuilder};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const EMPTY: u8 = 0;
const FILLED: u8 = 1;
const CONSUMED: u8 = 2;

// Stress tests run one at a time.
static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

#[test]
fn mpmc_exactly_once_many_threads() {
    let _guard = TEST_LOCK.lock();
    let producers = 4;
    let consumers = 4;
    let per_producer = 20_000;
    let total = producers * per_producer;

    // Small ring so producers constantly hit Full and cursors wrap many times.
    let registry = QueueBuilder::new()
        .with_capacity_hint(1024)
        .with_producers(producers as u32)
        .with_consumers(consumers as u32)
        .build()
        .unwrap();

    let trace: Arc<Vec<AtomicU8>> = Arc::new((0..total).map(|_| AtomicU8::new(EMPTY)).collect());
    let claimed = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..producers {
        let mut producer = registry.attach_producer().unwrap();
        let trace = trace.clone();
        handles.push(thread::spawn(move || {
            let backoff = Backoff::new();
            let mut i = producer.id() as usize;
            while i < total {
                assert_eq!(trace[i].swap(FILLED, Ordering::SeqCst), EMPTY);
                while producer.push(&(i as u32).to_le_bytes()).is_err() {
                    backoff.snooze();
                }
                backoff.reset();
                i += producers;
            }
        }));
    }

    for _ in 0..consumers {
        let mut consumer = registry.attach_consumer().unwrap();
        let trace = trace.clone();
        let claimed = claimed.clone();
        handles.push(thread::spawn(move || {
            let backoff = Backoff::new();
            let mut buf = [0u8; 4];
            while claimed.fetch_add(1, Ordering::SeqCst) < total {
                loop {
                    match consumer.pop(&mut buf) {
                        Ok(n) => {
                            assert_eq!(n, 4);
                            let tag = u32::from_le_bytes(buf) as usize;
                            assert_eq!(trace[tag].swap(CONSUMED, Ordering::SeqCst), FILLED, "tag {tag}");
                            backoff.reset();
                            break;
                        }
                        Err(PopError::Empty) => backoff.snooze(),
                        Err(e) => panic!("unexpected pop error: {e}"),
                    }
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert!(trace.iter().all(|t| t.load(Ordering::SeqCst) == CONSUMED));
    let storage = registry.storage();
    assert_eq!(storage.head(), storage.tail());
    assert_eq!(storage.tail(), (total * 8) as u64);
    assert_eq!(registry.attached_producers(), 0);
    assert_eq!(registry.attached_consumers(), 0);
}

#[test]
fn per_producer_order_with_single_consumer() {
    let _guard = TEST_LOCK.lock();
    let producers = 3u32;
    let per_producer = 10_000u32;

    let registry = QueueBuilder::new()
        .with_capacity_hint(512)
        .with_producers(producers)
        .with_consumers(1)
        .build()
        .unwrap();

    let mut handles = vec![];
    for _ in 0..producers {
        let mut producer = registry.attach_producer().unwrap();
        handles.push(thread::spawn(move || {
            let backoff = Backoff::new();
            let id = producer.id();
            for seq in 0..per_producer {
                let mut msg = [0u8; 8];
                msg[..4].copy_from_slice(&id.to_le_bytes());
                msg[4..].copy_from_slice(&seq.to_le_bytes());
                while producer.push(&msg).is_err() {
                    backoff.snooze();
                }
                backoff.reset();
            }
        }));
    }

    let mut consumer = registry.attach_consumer().unwrap();
    let backoff = Backoff::new();
    let mut next = vec![0u32; producers as usize];
    let mut buf = [0u8; 8];
    let mut received = 0;
    while received < producers * per_producer {
        match consumer.pop(&mut buf) {
            Ok(8) => {
                let id = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
                let seq = u32::from_le_bytes(buf[4..].try_into().unwrap());
                assert_eq!(seq, next[id], "producer {id} out of order");
                next[id] += 1;
                received += 1;
                backoff.reset();
            }
            Ok(n) => panic!("unexpected length {n}"),
            Err(PopError::Empty) => backoff.snooze(),
            Err(e) => panic!("unexpected pop error: {e}"),
        }
    }

    for h in handles {
        h.join().unwrap();
    }
    assert!(next.iter().all(|&n| n == per_producer));
}

fn payload_for(tag: u32, len: usize) -> Vec<u8> {
    let mut msg = Vec::with_capacity(len + 4);
    msg.extend_from_slice(&tag.to_le_bytes());
    msg.extend((0..len).map(|i| (tag as usize).wrapping_mul(7).wrapping_add(i) as u8));
    msg
}

#[test]
fn mixed_sizes_survive_contention() {
    let _guard = TEST_LOCK.lock();
    let producers = 2u32;
    let consumers = 2u32;
    let per_producer = 5_000u32;
    let total = (producers * per_producer) as usize;

    let registry = QueueBuilder::new()
        .with_capacity_hint(512)
        .with_producers(producers)
        .with_consumers(consumers)
        .build()
        .unwrap();

    let seen: Arc<Vec<AtomicU8>> = Arc::new((0..total).map(|_| AtomicU8::new(EMPTY)).collect());
    let received = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for p in 0..producers {
        let mut producer = registry.attach_producer().unwrap();
        handles.push(thread::spawn(move || {
            let mut rng = fastrand::Rng::with_seed(p as u64);
            let backoff = Backoff::new();
            for k in 0..per_producer {
                let tag = k * producers + p;
                let msg = payload_for(tag, rng.usize(0..200));
                while producer.push(&msg).is_err() {
                    backoff.snooze();
                }
                backoff.reset();
            }
        }));
    }

    for _ in 0..consumers {
        let mut consumer = registry.attach_consumer().unwrap();
        let seen = seen.clone();
        let received = received.clone();
        handles.push(thread::spawn(move || {
            let backoff = Backoff::new();
            let mut buf = [0u8; 256];
            while received.load(Ordering::SeqCst) < total {
                match consumer.pop(&mut buf) {
                    Ok(n) => {
                        assert!(n >= 4);
                        let tag = u32::from_le_bytes(buf[..4].try_into().unwrap());
                        assert_eq!(&buf[..n], &payload_for(tag, n - 4)[..], "tag {tag} corrupted");
                        assert_eq!(seen[tag as usize].swap(CONSUMED, Ordering::SeqCst), EMPTY);
                        received.fetch_add(1, Ordering::SeqCst);
                        backoff.reset();
                    }
                    Err(PopError::Empty) => backoff.snooze(),
                    Err(e) => panic!("unexpected pop error: {e}"),
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(received.load(Ordering::SeqCst), total);
    assert!(seen.iter().all(|s| s.load(Ordering::SeqCst) == CONSUMED));
    assert_eq!(registry.storage().used(), 0);
}
