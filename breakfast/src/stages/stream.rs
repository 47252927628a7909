//! The read side of a stage's output channel.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A finite, single-pass stream of finished pancakes.
///
/// The stream ends once the producer has finished and every item it sent has
/// been received. Dropping the stream tells the producer nobody is listening.
#[derive(Debug)]
pub struct PancakeStream<C> {
    rx: mpsc::Receiver<C>,
}

impl<C> PancakeStream<C> {
    pub(crate) fn new(rx: mpsc::Receiver<C>) -> Self {
        Self { rx }
    }

    /// Receives the next pancake, or `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<C> {
        self.rx.recv().await
    }

    /// Drains the stream to completion.
    pub async fn collect_all(mut self) -> Vec<C> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }
}

impl<C> Stream for PancakeStream<C> {
    type Item = C;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<C>> {
        self.rx.poll_recv(cx)
    }
}
