use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use colored::*;
use lockfree_job_queue::{create_job_queue_with_config, FnJob, QueueConfig, QueueStrategy};
use rand::Rng;
use tracing_subscriber::EnvFilter;

/// Command-line driver for the job-queue substrate: picks a strategy,
/// spins up producers and consumers, and prints the resulting statistics.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Which queue strategy to drive.
    #[arg(short, long, value_enum, default_value_t = CliStrategy::Adaptive)]
    strategy: CliStrategy,

    /// Number of producer threads.
    #[arg(long, default_value_t = 4)]
    producers: usize,

    /// Number of consumer threads.
    #[arg(long, default_value_t = 4)]
    consumers: usize,

    /// Jobs enqueued per producer.
    #[arg(long, default_value_t = 2500)]
    jobs_per_producer: usize,

    /// Enable verbose tracing output.
    #[arg(short, long)]
    verbose: bool,

    /// Run a larger stress test instead of the default demonstration.
    #[arg(long)]
    stress_test: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliStrategy {
    ForceMutex,
    ForceLockfree,
    Auto,
    Adaptive,
}

impl From<CliStrategy> for QueueStrategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::ForceMutex => QueueStrategy::ForceMutex,
            CliStrategy::ForceLockfree => QueueStrategy::ForceLockfree,
            CliStrategy::Auto => QueueStrategy::Auto,
            CliStrategy::Adaptive => QueueStrategy::Adaptive,
        }
    }
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("{}", "Job Queue Demonstration".green().bold());
    println!("=====================================\n");

    let producers = if args.stress_test { 16 } else { args.producers };
    let consumers = if args.stress_test { 16 } else { args.consumers };
    let jobs_per_producer = if args.stress_test {
        10_000
    } else {
        args.jobs_per_producer
    };

    println!(
        "strategy={:?} producers={} consumers={} jobs_per_producer={}",
        args.strategy, producers, consumers, jobs_per_producer
    );

    let config = QueueConfig::default();
    let queue = create_job_queue_with_config(args.strategy.into(), config);
    let total_jobs = producers * jobs_per_producer;
    let completed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let mut producer_handles = Vec::new();
    for p in 0..producers {
        let queue = Arc::clone(&queue);
        producer_handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for i in 0..jobs_per_producer {
                loop {
                    let job = FnJob::new(move || {
                        let _touched = p * jobs_per_producer + i;
                        Ok(())
                    });
                    match queue.enqueue(Box::new(job)) {
                        Ok(()) => break,
                        Err(_) => thread::yield_now(),
                    }
                }
                // Occasional pause so producers don't lock-step; mirrors real
                // workloads where job arrival isn't perfectly uniform.
                if rng.random::<f32>() < 0.01 {
                    thread::sleep(Duration::from_micros(rng.random_range(1..20)));
                }
            }
        }));
    }

    let mut consumer_handles = Vec::new();
    for _ in 0..consumers {
        let queue = Arc::clone(&queue);
        let completed = Arc::clone(&completed);
        consumer_handles.push(thread::spawn(move || loop {
            match queue.dequeue() {
                Ok(job) => {
                    let _ = job.execute();
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done >= total_jobs {
                        return;
                    }
                }
                Err(_) if completed.load(Ordering::Relaxed) >= total_jobs => return,
                Err(_) => thread::yield_now(),
            }
        }));
    }

    for h in producer_handles {
        h.join().expect("producer thread panicked");
    }
    for h in consumer_handles {
        h.join().expect("consumer thread panicked");
    }

    let elapsed = start.elapsed();
    let stats = queue.statistics();

    println!("\n{}", "Run complete".green().bold());
    println!("elapsed: {:.2?}", elapsed);
    println!("enqueue_count: {}", stats.enqueue_count);
    println!("dequeue_count: {}", stats.dequeue_count);
    println!("retry_count: {}", stats.retry_count);
    println!(
        "avg enqueue latency: {:.0}ns",
        stats.average_enqueue_latency_ns()
    );
    println!(
        "avg dequeue latency: {:.0}ns",
        stats.average_dequeue_latency_ns()
    );
    println!("final size: {}", queue.len());
}
