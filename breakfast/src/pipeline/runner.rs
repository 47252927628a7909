//! The serve-forever loop.

use super::{Consumer, Kitchen};
use crate::items::BatchSource;
use std::io::Write;
use tracing::{debug, info};

/// Counts from a run of [`run_forever`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Breakfasts served successfully.
    pub served: usize,
    /// Breakfasts that failed.
    pub ruined: usize,
}

impl RunSummary {
    /// Returns the number of breakfasts attempted.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.served + self.ruined
    }
}

/// Serves breakfast after breakfast, printing one status line per request.
///
/// Stops when the kitchen is shut down or after `limit` requests. A failed
/// request never stops the loop.
pub async fn run_forever<S, D>(kitchen: &Kitchen<S, D>, limit: Option<usize>) -> RunSummary
where
    S: BatchSource,
    D: Consumer<S::Item>,
{
    run_with_output(kitchen, limit, &mut std::io::stdout()).await
}

/// [`run_forever`], writing status lines to `out`.
pub async fn run_with_output<S, D, W>(
    kitchen: &Kitchen<S, D>,
    limit: Option<usize>,
    out: &mut W,
) -> RunSummary
where
    S: BatchSource,
    D: Consumer<S::Item>,
    W: Write + Send,
{
    let mut summary = RunSummary::default();
    info!(limit = ?limit, "Making Breakfast!");

    loop {
        if kitchen.is_shut_down() {
            debug!("Kitchen shut down");
            break;
        }
        if limit.is_some_and(|limit| summary.attempts() >= limit) {
            break;
        }

        let line = match kitchen.serve_breakfast().await {
            Ok(()) => {
                summary.served += 1;
                "Breakfast Success!".to_string()
            }
            Err(err) => {
                summary.ruined += 1;
                format!("Breakfast is ruined! {err}")
            }
        };
        // Status output is best-effort.
        if let Err(err) = writeln!(out, "{line}") {
            debug!(error = %err, status = %line, "Could not write status line");
        }
    }

    info!(served = summary.served, ruined = summary.ruined, "Kitchen closed");
    summary
}
