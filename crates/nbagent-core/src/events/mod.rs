//! Interrupt-safe event queue feeding the single worker loop
//!
//! Button edges, ticker expirations and management-client callbacks all
//! arrive on contexts where touching the resource table or the network stack
//! is not allowed. They only ever call [`Producer::post`], which enqueues an
//! event without blocking. One worker drains the queue in FIFO order and runs
//! each event to completion through an [`EventHandler`].
//!
//! When producers outrun the worker the newest event is dropped and counted;
//! the worker logs the running total the next time it dispatches.

mod agent_event;
mod sources;

pub use agent_event::*;
pub use sources::*;

use core::future::Future;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;
use thiserror_no_std::Error;

/// Queue capacity used for the agent's event queue
pub const EVENT_QUEUE_CAPACITY: usize = 16;

/// Returned by [`Producer::post`] when the queue was full and the event was discarded
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("event queue full, event dropped")]
pub struct EventDropped;

/// Consumer side: runs one dequeued event to completion
pub trait EventHandler<E> {
    fn handle(&mut self, event: E) -> impl Future<Output = ()>;
}

/// Bounded FIFO between interrupt-context producers and the worker loop
pub struct EventQueue<E, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, E, N>,
    dropped: AtomicU32,
    reported: AtomicU32,
}

impl<E, const N: usize> Default for EventQueue<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, const N: usize> EventQueue<E, N> {
    /// Create an empty queue; usable in a `static`
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
            reported: AtomicU32::new(0),
        }
    }

    /// Get a post-only handle for an interrupt handler, timer or client
    pub fn producer(&self) -> Producer<'_, E, N> {
        Producer { queue: self }
    }

    /// Total number of events discarded because the queue was full
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of events currently waiting
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Wait for the next event and run it to completion
    pub async fn dispatch_next<H: EventHandler<E>>(&self, handler: &mut H) {
        let event = self.channel.receive().await;
        self.report_drops();
        handler.handle(event).await;
    }

    /// Run every event queued right now, without waiting for new ones
    ///
    /// Returns the number of events dispatched.
    pub async fn dispatch_pending<H: EventHandler<E>>(&self, handler: &mut H) -> usize {
        let mut count = 0;
        while let Ok(event) = self.channel.try_receive() {
            self.report_drops();
            handler.handle(event).await;
            count += 1;
        }
        count
    }

    /// The worker loop: dispatch events in arrival order, forever
    pub async fn dispatch_forever<H: EventHandler<E>>(&self, handler: &mut H) -> ! {
        loop {
            self.dispatch_next(handler).await;
        }
    }

    fn report_drops(&self) {
        let dropped = self.dropped.load(Ordering::Relaxed);
        let reported = self.reported.swap(dropped, Ordering::Relaxed);
        if dropped != reported {
            warn!(
                "Event queue overflowed: {} new events dropped ({} total)",
                dropped.wrapping_sub(reported),
                dropped
            );
        }
    }
}

/// Post-only capability handed to interrupt handlers and timers
///
/// It exposes no way to read or mutate anything the worker owns.
pub struct Producer<'q, E, const N: usize> {
    queue: &'q EventQueue<E, N>,
}

impl<E, const N: usize> Clone for Producer<'_, E, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, const N: usize> Copy for Producer<'_, E, N> {}

impl<E, const N: usize> Producer<'_, E, N> {
    /// Enqueue `event` for the worker. Never blocks and never runs the event.
    ///
    /// On a full queue the event is discarded and the drop counter bumped.
    pub fn post(&self, event: E) -> Result<(), EventDropped> {
        match self.queue.channel.try_send(event) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.queue.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EventDropped)
            }
        }
    }
}

/// Producer of the agent's own event type
pub type AgentProducer<'q> = Producer<'q, AgentEvent, EVENT_QUEUE_CAPACITY>;

/// Queue of the agent's own event type
pub type AgentEventQueue = EventQueue<AgentEvent, EVENT_QUEUE_CAPACITY>;
