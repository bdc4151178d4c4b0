//! Single-slot delivery gate between the capture and delivery threads.
//!
//! The gate is claimed by the capture thread when a frame is accepted and released
//! by the delivery thread only after the consumer has finished with that frame.
//! While it is claimed every offered frame is dropped, so nothing ever queues
//! behind the frame in flight.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::RawFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Offer {
    Accepted,
    /// A previous frame is still in flight.
    Dropped,
    /// The delivery side is gone.
    Closed,
}

pub(crate) fn delivery_gate() -> (DeliveryGate, GateInbox) {
    let (tx, rx) = bounded(1);
    let busy = Arc::new(AtomicBool::new(false));
    (
        DeliveryGate {
            tx,
            busy: busy.clone(),
        },
        GateInbox { rx, busy },
    )
}

pub(crate) struct DeliveryGate {
    tx: Sender<RawFrame>,
    busy: Arc<AtomicBool>,
}

impl DeliveryGate {
    /// Hand `frame` to the delivery thread if it is idle. Never blocks.
    pub(crate) fn offer(&self, frame: RawFrame) -> Offer {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Offer::Dropped;
        }
        match self.tx.try_send(frame) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(_)) => {
                self.busy.store(false, Ordering::Release);
                Offer::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.busy.store(false, Ordering::Release);
                Offer::Closed
            }
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub(crate) struct GateInbox {
    rx: Receiver<RawFrame>,
    busy: Arc<AtomicBool>,
}

impl GateInbox {
    /// Block until a frame is accepted or the gate is dropped.
    ///
    /// The gate stays claimed until the returned `InFlight` is dropped.
    pub(crate) fn recv(&self) -> Option<(RawFrame, InFlight<'_>)> {
        let frame = self.rx.recv().ok()?;
        Some((frame, InFlight { busy: &self.busy }))
    }
}

/// Releases the gate on drop, including during unwinding.
pub(crate) struct InFlight<'a> {
    busy: &'a AtomicBool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> RawFrame {
        RawFrame::solid_rgb(2, 2, [0, 0, 0]).with_sequence(seq)
    }

    #[test]
    fn second_offer_is_dropped_while_first_is_pending() {
        let (gate, inbox) = delivery_gate();
        assert_eq!(gate.offer(frame(1)), Offer::Accepted);
        assert_eq!(gate.offer(frame(2)), Offer::Dropped);

        let (received, _in_flight) = inbox.recv().expect("frame");
        assert_eq!(received.sequence, 1);
    }

    #[test]
    fn offers_are_dropped_until_processing_finishes() {
        let (gate, inbox) = delivery_gate();
        assert_eq!(gate.offer(frame(1)), Offer::Accepted);

        let (_frame, in_flight) = inbox.recv().expect("frame");
        assert!(gate.in_flight());
        assert_eq!(gate.offer(frame(2)), Offer::Dropped);

        drop(in_flight);
        assert!(!gate.in_flight());
        assert_eq!(gate.offer(frame(3)), Offer::Accepted);
        let (next, _in_flight) = inbox.recv().expect("frame");
        assert_eq!(next.sequence, 3);
    }

    #[test]
    fn closed_inbox_is_reported() {
        let (gate, inbox) = delivery_gate();
        drop(inbox);
        assert_eq!(gate.offer(frame(1)), Offer::Closed);
        assert!(!gate.in_flight());
    }

    #[test]
    fn inbox_ends_when_gate_is_dropped() {
        let (gate, inbox) = delivery_gate();
        drop(gate);
        assert!(inbox.recv().is_none());
    }
}
