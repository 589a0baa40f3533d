//! Paced emission of payload chunks.
//!
//! [`emit`] turns a payload into a lazy stream of [`Event`]s: one delta per
//! chunk of words, then a single [`Event::Done`]. The stream knows nothing
//! about HTTP; the handler adapts it into an SSE response body.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::sync::watch;

use crate::payload::Payload;
use crate::sse::{format_sse_delta, format_sse_done};

/// Words per emitted chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(3) {
    Some(n) => n,
    None => unreachable!(),
};

/// Upper bound on the delay before the first chunk.
pub const FIRST_TOKEN_CEILING: Duration = Duration::from_millis(2426);

/// Steady-state emission rate the pacing has to beat.
pub const MIN_WORDS_PER_SEC: f64 = 25.0;

/// Delays applied while emitting a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Wait before the first chunk.
    pub startup_delay: Duration,
    /// Wait after every chunk, including the last one before `[DONE]`.
    pub chunk_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_millis(500),
            chunk_delay: Duration::from_millis(50),
        }
    }
}

impl Pacing {
    pub fn new(startup_delay: Duration, chunk_delay: Duration) -> Self {
        Self {
            startup_delay,
            chunk_delay,
        }
    }

    /// No delays at all.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Steady-state words per second, `None` when chunks are not delayed.
    pub fn words_per_sec(&self, chunk_size: NonZeroUsize) -> Option<f64> {
        if self.chunk_delay.is_zero() {
            None
        } else {
            Some(chunk_size.get() as f64 / self.chunk_delay.as_secs_f64())
        }
    }

    /// Wall-clock length of a stream with `chunk_count` chunks, saturating at
    /// [`Duration::MAX`].
    pub fn total_duration(&self, chunk_count: usize) -> Duration {
        u32::try_from(chunk_count)
            .ok()
            .and_then(|n| self.chunk_delay.checked_mul(n))
            .and_then(|chunks| self.startup_delay.checked_add(chunks))
            .unwrap_or(Duration::MAX)
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A text fragment wrapped in a delta envelope.
    Delta(String),
    /// Terminal sentinel.
    Done,
}

impl Event {
    /// Fragment text, `None` for the terminal event.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            Event::Delta(fragment) => Some(fragment),
            Event::Done => None,
        }
    }

    /// Serialize as a complete SSE frame.
    pub fn to_sse(&self) -> Bytes {
        match self {
            Event::Delta(fragment) => format_sse_delta(fragment),
            Event::Done => format_sse_done(),
        }
    }
}

/// Text for chunk `index`: its words joined by spaces, with one leading
/// space on every chunk after the first so the fragments concatenate back
/// to the payload text.
fn fragment_for(index: usize, chunk: &[String]) -> String {
    let joined = chunk.join(" ");
    if index == 0 {
        joined
    } else {
        format!(" {}", joined)
    }
}

/// Build the paced event stream for one request.
///
/// The stream sleeps `pacing.startup_delay`, yields one [`Event::Delta`] per
/// chunk with `pacing.chunk_delay` after each, and finishes with
/// [`Event::Done`]. Once `cancel` reads `true` the stream ends at the next
/// emission point without sending `Done`. Dropping the stream stops it
/// immediately.
pub fn emit(
    payload: Arc<Payload>,
    chunk_size: NonZeroUsize,
    pacing: Pacing,
    cancel: watch::Receiver<bool>,
) -> impl Stream<Item = Event> + Send + 'static {
    let emitter = Emitter {
        payload,
        chunk_size,
        pacing,
        cancel,
        state: EmitterState::NotStarted,
    };

    stream::unfold(emitter, |mut emitter| async move {
        let event = emitter.advance().await?;
        Some((event, emitter))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitterState {
    NotStarted,
    /// Index of the chunk emitted last.
    Emitting(usize),
    Done,
}

struct Emitter {
    payload: Arc<Payload>,
    chunk_size: NonZeroUsize,
    pacing: Pacing,
    cancel: watch::Receiver<bool>,
    state: EmitterState,
}

impl Emitter {
    async fn advance(&mut self) -> Option<Event> {
        let next = match self.state {
            EmitterState::NotStarted => {
                self.pause(self.pacing.startup_delay).await;
                0
            }
            EmitterState::Emitting(index) => {
                self.pause(self.pacing.chunk_delay).await;
                index + 1
            }
            EmitterState::Done => return None,
        };

        if *self.cancel.borrow() {
            self.state = EmitterState::Done;
            return None;
        }

        match self.chunk(next) {
            Some(chunk) => {
                let fragment = fragment_for(next, chunk);
                self.state = EmitterState::Emitting(next);
                Some(Event::Delta(fragment))
            }
            None => {
                self.state = EmitterState::Done;
                Some(Event::Done)
            }
        }
    }

    fn chunk(&self, index: usize) -> Option<&[String]> {
        let words = self.payload.words();
        let size = self.chunk_size.get();
        let start = index.checked_mul(size)?;
        if start >= words.len() {
            return None;
        }
        Some(&words[start..words.len().min(start + size)])
    }

    /// Sleep for `delay`, waking early if cancellation is signaled.
    async fn pause(&mut self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_for_cancel(&mut self.cancel) => {}
        }
    }
}

async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    let result = cancel.wait_for(|cancelled| *cancelled).await.map(|_| ());
    // A dropped sender can never cancel.
    if result.is_err() {
        std::future::pending::<()>().await;
    }
}
