//! The timed loop that grows a [`LeakBuffer`].

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::buffer::{LeakBuffer, LeakStats, MIB};
use crate::memory::MemorySnapshot;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakConfig {
    pub interval: Duration,
    pub chunk_size: usize,
    /// Stop growing after this many chunks. `None` leaks until the process dies.
    pub max_iterations: Option<u64>,
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            chunk_size: 10 * MIB,
            max_iterations: None,
        }
    }
}

/// Start the leak loop on the current runtime.
///
/// The loop owns the buffer; readers only see the published [`LeakStats`].
/// When the loop stops, the buffer becomes the task's output, so it stays
/// allocated for as long as the returned handle is held.
pub fn spawn(config: LeakConfig) -> (watch::Receiver<LeakStats>, JoinHandle<LeakBuffer>) {
    let (tx, rx) = watch::channel(LeakStats::default());
    let handle = tokio::spawn(run(config, tx));
    (rx, handle)
}

async fn run(config: LeakConfig, tx: watch::Sender<LeakStats>) -> LeakBuffer {
    let mut buffer = LeakBuffer::new(config.chunk_size);
    let mut rng = StdRng::from_entropy();
    // A zero period panics inside tokio.
    let mut ticker = tokio::time::interval(config.interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_ms = config.interval.as_millis() as u64,
        chunk_bytes = config.chunk_size,
        max_iterations = ?config.max_iterations,
        "starting memory leak"
    );

    loop {
        ticker.tick().await;

        if let Some(max) = config.max_iterations {
            if buffer.stats().iterations >= max {
                tracing::info!(iterations = max, "reached max iterations, holding memory");
                break;
            }
        }

        let stats = buffer.leak_once(&mut rng);
        report(&stats);

        if tx.send(stats).is_err() {
            tracing::debug!("no stats subscribers left, stopping");
            break;
        }
    }

    buffer
}

fn report(stats: &LeakStats) {
    match MemorySnapshot::capture() {
        Ok(snapshot) => tracing::info!(
            iteration = stats.iterations,
            leaked_mb = stats.leaked_mb(),
            used_mb = snapshot.used_mb(),
            max_mb = snapshot.max_mb(),
            percent = %snapshot.usage_percent_text(),
            "leaked chunk"
        ),
        Err(err) => tracing::info!(
            iteration = stats.iterations,
            leaked_mb = stats.leaked_mb(),
            error = %err,
            "leaked chunk, memory usage unavailable"
        ),
    }
}
