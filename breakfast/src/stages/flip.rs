//! Stage one: flip every pancake, let the batch cook, reject burnt batches.

use crate::context::TraceContext;
use crate::errors::BreakfastError;
use crate::items::Cookable;
use std::time::Duration;
use tracing::debug;

/// Event name reported for this stage.
pub const FLIP_EVENT: &str = "FlipPancakes";

/// Flips every pancake in order, waits `cook_time`, then checks for burns.
///
/// Fails fast on the first pancake that cannot be flipped, leaving the rest
/// of the batch untouched. If every flip succeeds but any pancake burnt
/// while cooking, the whole batch is rejected with
/// [`BreakfastError::Burnt`]. The cook wait is not cancellable.
///
/// The stage runs inside a `FlipPancakes` event that is closed exactly once,
/// tagged with the returned error if there is one.
pub async fn flip_pancakes<C: Cookable>(
    ctx: &TraceContext,
    cakes: &mut [C],
    cook_time: Duration,
) -> Result<(), BreakfastError> {
    let event = ctx.begin_event(FLIP_EVENT);
    event.append("pancakes", cakes.len());
    event.scoped(flip_and_cook(cakes, cook_time)).await
}

async fn flip_and_cook<C: Cookable>(
    cakes: &mut [C],
    cook_time: Duration,
) -> Result<(), BreakfastError> {
    for (index, cake) in cakes.iter_mut().enumerate() {
        cake.flip().map_err(|source| BreakfastError::flip(index, source))?;
    }

    // Let the pancakes cook
    debug!(cook_ms = cook_millis(cook_time), "Cooking");
    tokio::time::sleep(cook_time).await;

    let burnt: Vec<usize> = cakes
        .iter()
        .enumerate()
        .filter(|(_, cake)| cake.is_burnt())
        .map(|(index, _)| index)
        .collect();
    if !burnt.is_empty() {
        return Err(BreakfastError::Burnt { indices: burnt });
    }

    Ok(())
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn cook_millis(cook_time: Duration) -> u64 {
    u64::try_from(cook_time.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TraceContext;
    use crate::errors::CookError;
    use crate::testing::{test_telemetry, ScriptedPancake};
    use pretty_assertions::assert_eq;

    const NO_WAIT: Duration = Duration::ZERO;

    fn root() -> (
        TraceContext,
        crate::cancellation::CancelGuard,
        std::sync::Arc<crate::events::CollectingEventSink>,
    ) {
        let (_tracer, sink, telemetry) = test_telemetry();
        let (ctx, cancel) = TraceContext::root(telemetry);
        (ctx, cancel, sink)
    }

    #[tokio::test]
    async fn test_good_batch_flips_each_once() {
        let (ctx, _cancel, sink) = root();
        let mut cakes = ScriptedPancake::batch(3);

        flip_pancakes(&ctx, &mut cakes, NO_WAIT).await.unwrap();

        assert_eq!(cakes.iter().map(|c| c.flips).collect::<Vec<_>>(), vec![1, 1, 1]);
        let closed = sink.closed_events(FLIP_EVENT);
        assert_eq!(closed.len(), 1);
        assert!(closed[0].get("error").is_none());
        assert_eq!(closed[0]["metadata"]["pancakes"], 3);
    }

    #[tokio::test]
    async fn test_flip_failure_is_fail_fast() {
        let (ctx, _cancel, sink) = root();
        let mut cakes = ScriptedPancake::batch(4);
        cakes[1] = ScriptedPancake::good().sticks();

        let err = flip_pancakes(&ctx, &mut cakes, NO_WAIT).await.unwrap_err();

        match err {
            BreakfastError::Flip { index, source } => {
                assert_eq!(index, 1);
                assert_eq!(source, CookError::Stuck);
            }
            other => panic!("expected flip failure, got {other:?}"),
        }
        assert_eq!(cakes.iter().map(|c| c.flips).collect::<Vec<_>>(), vec![1, 0, 0, 0]);
        assert_eq!(cakes[1].flip_attempts, 1);
        assert_eq!(cakes[2].flip_attempts, 0);

        let closed = sink.closed_events(FLIP_EVENT);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0]["error"], "Failed to flip pancake 1: pancake stuck to the griddle");
    }

    #[tokio::test]
    async fn test_burnt_batch_rejected_after_all_flips() {
        let (ctx, _cancel, sink) = root();
        let mut cakes = ScriptedPancake::batch(3);
        cakes[2] = ScriptedPancake::good().burns();

        let err = flip_pancakes(&ctx, &mut cakes, NO_WAIT).await.unwrap_err();

        assert!(err.is_burnt());
        assert!(!err.is_flip_failure());
        assert!(matches!(err, BreakfastError::Burnt { ref indices } if indices == &[2]));
        assert!(cakes.iter().all(|c| c.flips == 1));
        assert_eq!(sink.closed_events(FLIP_EVENT)[0]["error"], "Burnt pancake(s) at [2]");
    }

    #[tokio::test]
    async fn test_burnt_reports_every_burnt_index() {
        let (ctx, _cancel, _sink) = root();
        let mut cakes = vec![
            ScriptedPancake::good().burns(),
            ScriptedPancake::good(),
            ScriptedPancake::good().burns(),
        ];

        let err = flip_pancakes(&ctx, &mut cakes, NO_WAIT).await.unwrap_err();
        assert_eq!(err.to_string(), "Burnt pancake(s) at [0, 2]");
    }

    #[tokio::test]
    async fn test_cook_wait_ignores_cancellation() {
        let (ctx, _cancel, _sink) = root();
        ctx.token().cancel("impatient");
        let mut cakes = ScriptedPancake::batch(2);

        let started = std::time::Instant::now();
        flip_pancakes(&ctx, &mut cakes, Duration::from_millis(20)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cook_millis_saturates() {
        assert_eq!(cook_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(cook_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let (ctx, _cancel, sink) = root();
        let mut cakes: Vec<ScriptedPancake> = Vec::new();
        flip_pancakes(&ctx, &mut cakes, NO_WAIT).await.unwrap();
        assert_eq!(sink.closed_events(FLIP_EVENT).len(), 1);
    }

    #[tokio::test]
    async fn test_event_span_nests_under_request_span() {
        let (tracer, _sink, telemetry) = test_telemetry();
        let (ctx, _cancel) = TraceContext::root(telemetry.clone());
        let root = telemetry.start_span("ServeHotCakes", None);
        let ctx = ctx.with_span(root.span().clone());
        let mut cakes = ScriptedPancake::batch(1);

        flip_pancakes(&ctx, &mut cakes, NO_WAIT).await.unwrap();

        let spans = tracer.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].operation, FLIP_EVENT);
        assert_eq!(spans[0].parent_id, Some(root.context().span_id));
    }
}
