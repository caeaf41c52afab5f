//! Bounded backoff polling for agent runs.
//!
//! The contract is "poll until terminal status or cancellation": delays grow
//! from `initial_interval` by `multiplier` up to `max_interval`, with a
//! little jitter so concurrent runs don't poll in lockstep, and the loop
//! gives up after `max_attempts`. Cancellation is dropping the returned
//! future — no poll blocks past one interval.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::PollConfig;
use crate::error::AnswererError;

use super::{AgentRun, Answerer, RunStatus};

/// Drive `get_run` until the run reaches a terminal status.
///
/// Returns the terminal run on success. A run that ends `Failed`,
/// `Cancelled`, or `Expired` is returned as an error — callers treat those
/// as fatal to the current drive.
pub async fn poll_run_until_terminal(
    answerer: &dyn Answerer,
    thread_id: &str,
    run_id: &str,
    config: &PollConfig,
) -> Result<AgentRun, AnswererError> {
    let mut delay = config.initial_interval;
    let mut waited = Duration::ZERO;

    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(jittered(delay)).await;
        waited += delay;

        let run = answerer.get_run(thread_id, run_id).await?;
        if run.status.is_terminal() {
            debug!(
                run_id = %run.id,
                status = %run.status,
                attempts = attempt,
                "Run reached terminal status"
            );
            if run.status == RunStatus::Completed {
                return Ok(run);
            }
            return Err(AnswererError::RunFailed {
                thread_id: thread_id.to_string(),
                run_id: run.id,
                status: run.status.to_string(),
            });
        }

        delay = delay.mul_f64(config.multiplier).min(config.max_interval);
    }

    warn!(run_id, attempts = config.max_attempts, "Run polling exhausted");
    Err(AnswererError::PollExhausted {
        run_id: run_id.to_string(),
        attempts: config.max_attempts,
        waited,
    })
}

/// Apply up to ±10% jitter to a delay.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..1.1);
    delay.mul_f64(factor)
}
