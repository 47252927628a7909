//! Stage two: syrup pancakes and stream them out as they are ready.

use super::PancakeStream;
use crate::context::TraceContext;
use crate::items::Cookable;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Event name reported for this stage.
pub const SYRUP_EVENT: &str = "PancakeReady";

/// How the syrup station treats the rest of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ServePolicy {
    /// Stop after the first pancake served while no pancake has gone soggy.
    /// Once one has, keep going through the batch without fixing it.
    #[default]
    FirstReady,
    /// Attempt every pancake in the batch once.
    AllReady,
    /// Attempt every pancake, then re-syrup soggy ones up to `passes` more
    /// times.
    RetryMistakes {
        /// Extra passes over the soggy pancakes.
        passes: usize,
    },
}

impl ServePolicy {
    fn stops_early(self) -> bool {
        matches!(self, Self::FirstReady)
    }

    fn retry_passes(self) -> usize {
        match self {
            Self::RetryMistakes { passes } => passes,
            Self::FirstReady | Self::AllReady => 0,
        }
    }
}

/// Counters for one run of the syrup station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    served: usize,
    soggy: usize,
    retried: usize,
    stopped: Option<Stop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Cancelled,
    Abandoned,
}

/// Syrups the batch on a spawned task and returns the stream of ready
/// pancakes immediately.
///
/// Opens a `PancakeReady` event in the context and hands it to the producer,
/// which closes it when it terminates. Must be called within a Tokio runtime.
pub fn syrup_pancakes<C: Cookable>(
    ctx: &TraceContext,
    cakes: Vec<C>,
    policy: ServePolicy,
) -> PancakeStream<C> {
    let (ctx, _event) = ctx.begin_event_in_context(SYRUP_EVENT);
    spawn_syrup_station(ctx, cakes, policy)
}

/// Spawns the producer for an already opened event carried by `ctx`.
pub fn spawn_syrup_station<C: Cookable>(
    ctx: TraceContext,
    cakes: Vec<C>,
    policy: ServePolicy,
) -> PancakeStream<C> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        // Locals drop in reverse: the event closes before the stream does, so a
        // consumer that sees the end of the stream never outlives the event.
        let out = tx;
        let _finish = FinishEvent(ctx.clone());

        let tally = syrup_batch(&ctx, cakes, policy, &out).await;
        if let Some(event) = ctx.event() {
            event.append("served", tally.served);
            event.append("mistakes", tally.soggy);
            event.append("retried", tally.retried);
            event.append("cancelled", tally.stopped == Some(Stop::Cancelled));
        }
        debug!(
            served = tally.served,
            mistakes = tally.soggy,
            stopped = ?tally.stopped,
            "Syrup station done"
        );
    });

    PancakeStream::new(rx)
}

/// Closes the event carried by the context on drop.
struct FinishEvent(TraceContext);

impl Drop for FinishEvent {
    fn drop(&mut self) {
        self.0.maybe_finish_event();
    }
}

async fn syrup_batch<C: Cookable>(
    ctx: &TraceContext,
    cakes: Vec<C>,
    policy: ServePolicy,
    out: &mpsc::Sender<C>,
) -> Tally {
    let mut tally = Tally::default();
    // Where soggy pancakes go
    let mut mistakes: Vec<(usize, C)> = Vec::new();

    for (index, mut cake) in cakes.into_iter().enumerate() {
        if let Err(err) = cake.syrup() {
            warn!(pancake = index, error = %err, "Ohh no, soggy pancakes!");
            mistakes.push((index, cake));
            continue;
        }
        if let Err(stop) = serve(ctx, out, cake).await {
            tally.stopped = Some(stop);
            tally.soggy = mistakes.len();
            return tally;
        }
        tally.served += 1;
        if policy.stops_early() && mistakes.is_empty() {
            tally.soggy = mistakes.len();
            return tally;
        }
    }

    for pass in 0..policy.retry_passes() {
        if mistakes.is_empty() {
            break;
        }
        debug!(pass, pending = mistakes.len(), "Re-syruping soggy pancakes");
        for (index, mut cake) in std::mem::take(&mut mistakes) {
            tally.retried += 1;
            if let Err(err) = cake.syrup() {
                warn!(pancake = index, pass, error = %err, "Still soggy");
                mistakes.push((index, cake));
                continue;
            }
            if let Err(stop) = serve(ctx, out, cake).await {
                tally.stopped = Some(stop);
                tally.soggy = mistakes.len();
                return tally;
            }
            tally.served += 1;
        }
    }

    tally.soggy = mistakes.len();
    tally
}

/// Hands one pancake to the consumer unless the context is cancelled first.
async fn serve<C: Cookable>(
    ctx: &TraceContext,
    out: &mpsc::Sender<C>,
    cake: C,
) -> Result<(), Stop> {
    tokio::select! {
        biased;
        () = ctx.cancelled() => {
            debug!("Syrup station cancelled");
            Err(Stop::Cancelled)
        }
        sent = out.send(cake) => sent.map_err(|_| {
            debug!("Nobody is eating; stopping");
            Stop::Abandoned
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_telemetry, wait_for_closed_event, ScriptedPancake, SyrupLog};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn labels(cakes: &[ScriptedPancake]) -> Vec<usize> {
        cakes.iter().map(|c| c.label).collect()
    }

    #[tokio::test]
    async fn test_all_good_emits_only_first() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let log = SyrupLog::new();
        let cakes = ScriptedPancake::batch(3)
            .into_iter()
            .map(|cake| cake.logged(&log))
            .collect();

        let served = syrup_pancakes(&ctx, cakes, ServePolicy::FirstReady)
            .collect_all()
            .await;

        assert_eq!(labels(&served), vec![0]);
        assert_eq!(served[0].syrup_attempts, 1);
        // Pancakes 1 and 2 never reach the syrup bottle.
        assert_eq!(log.labels(), vec![0]);
        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["served"], 1);
        assert_eq!(event["metadata"]["mistakes"], 0);
        assert_eq!(event["metadata"]["retried"], 0);
        assert_eq!(sink.closed_events(SYRUP_EVENT).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_closed_when_stream_ends() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);

        for round in 1..=200 {
            let served = syrup_pancakes(&ctx, ScriptedPancake::batch(1), ServePolicy::AllReady)
                .collect_all()
                .await;
            assert_eq!(served.len(), 1);
            // No waiting: the end of the stream implies the event is closed.
            assert_eq!(sink.closed_events(SYRUP_EVENT).len(), round);
        }
    }

    #[tokio::test]
    async fn test_first_soggy_keeps_going() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let mut cakes = ScriptedPancake::batch(3);
        cakes[0] = ScriptedPancake::good().soggy(1).labelled(0);

        let served = syrup_pancakes(&ctx, cakes, ServePolicy::FirstReady)
            .collect_all()
            .await;

        assert_eq!(labels(&served), vec![1, 2]);
        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["mistakes"], 1);
        assert_eq!(event["metadata"]["retried"], 0);
    }

    #[tokio::test]
    async fn test_all_ready_attempts_every_pancake() {
        let (_tracer, _sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let mut cakes = ScriptedPancake::batch(4);
        cakes[2] = ScriptedPancake::good().soggy(1).labelled(2);

        let served = syrup_pancakes(&ctx, cakes, ServePolicy::AllReady)
            .collect_all()
            .await;

        assert_eq!(labels(&served), vec![0, 1, 3]);
    }

    #[tokio::test]
    async fn test_retry_mistakes_serves_fixed_pancakes_last() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let cakes = vec![
            ScriptedPancake::good().soggy(1).labelled(0),
            ScriptedPancake::good().labelled(1),
            ScriptedPancake::good().soggy(5).labelled(2),
        ];

        let served = syrup_pancakes(&ctx, cakes, ServePolicy::RetryMistakes { passes: 2 })
            .collect_all()
            .await;

        assert_eq!(labels(&served), vec![1, 0]);
        assert_eq!(served[1].syrup_attempts, 2);
        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["served"], 2);
        assert_eq!(event["metadata"]["mistakes"], 1);
        assert_eq!(event["metadata"]["retried"], 3);
    }

    #[tokio::test]
    async fn test_all_soggy_closes_empty() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let cakes = (0..3)
            .map(|i| ScriptedPancake::good().soggy(1).labelled(i))
            .collect();

        let served = syrup_pancakes(&ctx, cakes, ServePolicy::FirstReady)
            .collect_all()
            .await;

        assert!(served.is_empty());
        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["mistakes"], 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_emission() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, cancel) = TraceContext::root(telemetry);
        drop(cancel);

        let served = syrup_pancakes(&ctx, ScriptedPancake::batch(3), ServePolicy::AllReady)
            .collect_all()
            .await;

        assert!(served.is_empty());
        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["cancelled"], true);
        assert_eq!(event["metadata"]["served"], 0);
        assert_eq!(sink.closed_events(SYRUP_EVENT).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_emission() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);

        let mut stream = syrup_pancakes(&ctx, ScriptedPancake::batch(3), ServePolicy::AllReady);
        // The first pancake fills the slot; the producer then blocks on the second.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.closed_events(SYRUP_EVENT).is_empty());

        ctx.token().cancel("customer left");

        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["cancelled"], true);
        assert_eq!(event["metadata"]["served"], 1);

        assert_eq!(stream.recv().await.map(|c| c.label), Some(0));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_producer() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);

        let stream = syrup_pancakes(&ctx, ScriptedPancake::batch(3), ServePolicy::AllReady);
        drop(stream);

        let event = wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(event["metadata"]["cancelled"], false);
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_pancake_still_closes_event() {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let cakes = vec![ScriptedPancake::good().panics_on_syrup()];

        let served = syrup_pancakes(&ctx, cakes, ServePolicy::FirstReady)
            .collect_all()
            .await;

        assert!(served.is_empty());
        wait_for_closed_event(&sink, SYRUP_EVENT).await;
        assert_eq!(sink.closed_events(SYRUP_EVENT).len(), 1);
    }

    #[tokio::test]
    async fn test_stream_implements_futures_stream() {
        use futures::StreamExt;

        let (_tracer, _sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry);
        let stream = syrup_pancakes(&ctx, ScriptedPancake::batch(2), ServePolicy::AllReady);

        let served: Vec<_> = stream.map(|c| c.label).collect().await;
        assert_eq!(served, vec![0, 1]);
    }

    #[test]
    fn test_policy_serde() {
        let policy: ServePolicy =
            serde_json::from_str(r#"{"mode": "retry_mistakes", "passes": 2}"#).unwrap();
        assert_eq!(policy, ServePolicy::RetryMistakes { passes: 2 });
        assert_eq!(
            serde_json::to_value(ServePolicy::FirstReady).unwrap(),
            serde_json::json!({"mode": "first_ready"})
        );
    }
}
