// Throughput and exactly-once check for the lock-free ring.
//
// Usage: rq_bench [producers] [consumers] [messages-per-producer]
// Producers push tagged u32 values; a tracking table asserts every tag is
// filled before it is consumed and consumed exactly once.

use crossbeam_utils::Backoff;
use ringqueue_lf::{PopError, QueueBuilder};
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const QLEN: usize = 32 * 1024;
const ELE_EMPTY: u32 = 0x0;
const ELE_FILLED: u32 = 0xFEDC_BA98;
const ELE_CONSUMED: u32 = 0x0123_4567;

fn arg_or(args: &[String], index: usize, default: usize) -> usize {
    args.get(index)
        .map(|s| s.parse().expect("arguments must be positive integers"))
        .unwrap_or(default)
}

fn main() -> ringqueue_lf::Result<()> {
    ringqueue_lf::init_tracing();

    let args: Vec<String> = env::args().collect();
    let producers = arg_or(&args, 1, 2);
    let consumers = arg_or(&args, 2, 2);
    let per_producer = arg_or(&args, 3, 1_000_000);
    let total = producers * per_producer;

    if producers == 0 || consumers == 0 {
        eprintln!("Usage: {} [producers] [consumers] [messages-per-producer]", args[0]);
        std::process::exit(1);
    }

    let registry = QueueBuilder::new()
        .with_capacity_hint(QLEN)
        .with_producers(producers as u32)
        .with_consumers(consumers as u32)
        .build()?;

    let trace: Arc<Vec<AtomicU32>> = Arc::new((0..total).map(|_| AtomicU32::new(ELE_EMPTY)).collect());
    let claimed = Arc::new(AtomicUsize::new(0));
    let keep_running = Arc::new(AtomicBool::new(true));

    let keep_running_for_handler = Arc::clone(&keep_running);
    ctrlc::set_handler(move || {
        keep_running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    println!(
        "rq_bench: {} producers, {} consumers, {} messages, ring {} bytes",
        producers,
        consumers,
        total,
        registry.storage().capacity()
    );

    let start = Instant::now();
    let mut handles = Vec::with_capacity(producers + consumers);

    for _ in 0..producers {
        let mut producer = registry.attach_producer()?;
        let trace = Arc::clone(&trace);
        let keep_running = Arc::clone(&keep_running);
        handles.push(thread::spawn(move || {
            let backoff = Backoff::new();
            let mut i = producer.id() as usize;
            while i < total && keep_running.load(Ordering::Relaxed) {
                let ele = i as u32;
                assert_eq!(trace[i].swap(ELE_FILLED, Ordering::SeqCst), ELE_EMPTY);
                while producer.push(&ele.to_le_bytes()).is_err() {
                    if !keep_running.load(Ordering::Relaxed) {
                        return;
                    }
                    backoff.snooze();
                }
                backoff.reset();
                i += producers;
            }
        }));
    }

    for _ in 0..consumers {
        let mut consumer = registry.attach_consumer()?;
        let trace = Arc::clone(&trace);
        let claimed = Arc::clone(&claimed);
        let keep_running = Arc::clone(&keep_running);
        handles.push(thread::spawn(move || {
            let backoff = Backoff::new();
            let mut buf = [0u8; 4];
            while claimed.fetch_add(1, Ordering::SeqCst) < total {
                loop {
                    match consumer.pop(&mut buf) {
                        Ok(n) => {
                            assert_eq!(n, 4);
                            let ele = u32::from_le_bytes(buf) as usize;
                            let prev = trace[ele].swap(ELE_CONSUMED, Ordering::SeqCst);
                            assert_eq!(prev, ELE_FILLED, "debug: ele -> {ele}, {prev:#x}");
                            backoff.reset();
                            break;
                        }
                        Err(PopError::Empty) => {
                            if !keep_running.load(Ordering::Relaxed) {
                                return;
                            }
                            backoff.snooze();
                        }
                        Err(e) => panic!("unexpected pop error: {e}"),
                    }
                }
            }
        }));
    }

    for h in handles {
        h.join().expect("worker panicked");
    }

    let elapsed = start.elapsed();
    let consumed = trace
        .iter()
        .filter(|t| t.load(Ordering::Relaxed) == ELE_CONSUMED)
        .count();

    println!("time usage : {:.2?}", elapsed);
    println!("consumed   : {}/{}", consumed, total);
    println!(
        "speed      : {:.0} msg/s",
        consumed as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
