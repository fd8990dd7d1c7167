/// Event delivery indirection between the core's background tasks and
/// whoever owns the session.
///
/// Background work (the receive loop, the waiter task, the debug-tap pump
/// thread) never calls into the consumer directly; it posts through a
/// [`Dispatcher`]. A GUI host marshals `post` onto its UI thread; the
/// headless driver and the tests use [`ChannelDispatcher`], which forwards
/// into a tokio channel drained by the owner's event loop.
use tokio::sync::mpsc;

use crate::event::MonitorEvent;

pub trait Dispatcher: Send + Sync {
    /// Delivers one event to the owner. Must be callable from any thread and
    /// must not block.
    fn post(&self, event: MonitorEvent);
}

/// Forwards events into an unbounded tokio channel. Unbounded so that the
/// single ProcessExited event can never be lost to backpressure; all other
/// traffic is naturally rate-limited by the target process itself.
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<MonitorEvent>) -> Self {
        Self { tx }
    }
}

impl Dispatcher for ChannelDispatcher {
    fn post(&self, event: MonitorEvent) {
        // A closed receiver means the session owner is gone; nothing left to
        // notify.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posted_events_arrive_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = ChannelDispatcher::new(tx);
        dispatcher.post(MonitorEvent::ProcessExited(0));
        dispatcher.post(MonitorEvent::ProcessExited(1));
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::ProcessExited(0));
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::ProcessExited(1));
    }

    #[test]
    fn post_after_receiver_dropped_is_a_no_op() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let dispatcher = ChannelDispatcher::new(tx);
        dispatcher.post(MonitorEvent::ProcessExited(0));
    }
}
