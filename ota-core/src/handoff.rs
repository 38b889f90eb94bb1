//! Phase-tagged reply slots between the control-notification callback and the controller.
//!
//! Each handshake phase gets its own single-use slot, armed just before the opcode that
//! provokes the reply is written. A reply only lands in the slot of the phase it answers,
//! so a late reply to one phase can never be consumed by the next. Replies that arrive while
//! no slot is armed, including any ACK or NAK pushed mid-transfer, are stray and dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::protocol::{Phase, Reply};

/// What happened to a reply handed to [`Handoff::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Filled the armed slot for its phase.
    Accepted,
    /// No armed slot for that phase, or the slot was already filled.
    Stray,
}

type Slot = Option<(Phase, oneshot::Sender<Reply>)>;

/// Shared between the notification callback and the controller.
#[derive(Debug, Default)]
pub struct Handoff {
    armed: Mutex<Slot>,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a fresh slot for `phase`, replacing any previous one, and return its receiver.
    pub fn arm(&self, phase: Phase) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some((phase, tx));
        rx
    }

    /// Close the armed slot without a reply (after a timeout).
    pub fn disarm(&self) {
        *self.lock() = None;
    }

    /// Hand a classified reply to the slot of `phase`. Never blocks.
    pub fn deliver(&self, phase: Phase, reply: Reply) -> Delivery {
        let mut armed = self.lock();
        match armed.take() {
            Some((slot, tx)) if slot == phase => {
                if tx.send(reply).is_ok() {
                    Delivery::Accepted
                } else {
                    Delivery::Stray
                }
            }
            other => {
                *armed = other;
                Delivery::Stray
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_reaches_armed_phase() {
        let handoff = Handoff::new();
        let mut rx = handoff.arm(Phase::Request);
        assert_eq!(handoff.deliver(Phase::Request, Reply::Ack), Delivery::Accepted);
        assert_eq!(rx.try_recv(), Ok(Reply::Ack));
    }

    #[test]
    fn slot_is_single_use() {
        let handoff = Handoff::new();
        let mut rx = handoff.arm(Phase::Request);
        assert_eq!(handoff.deliver(Phase::Request, Reply::Ack), Delivery::Accepted);
        assert_eq!(handoff.deliver(Phase::Request, Reply::Nak), Delivery::Stray);
        assert_eq!(rx.try_recv(), Ok(Reply::Ack));
    }

    #[test]
    fn wrong_phase_is_stray_and_keeps_slot() {
        let handoff = Handoff::new();
        let mut rx = handoff.arm(Phase::Done);
        assert_eq!(handoff.deliver(Phase::Request, Reply::Ack), Delivery::Stray);
        assert!(rx.try_recv().is_err());
        assert_eq!(handoff.deliver(Phase::Done, Reply::Ack), Delivery::Accepted);
        assert_eq!(rx.try_recv(), Ok(Reply::Ack));
    }

    #[test]
    fn reply_before_arming_is_not_kept() {
        let handoff = Handoff::new();
        assert_eq!(handoff.deliver(Phase::Done, Reply::Ack), Delivery::Stray);
        let mut rx = handoff.arm(Phase::Done);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn late_reply_after_disarm_is_stray() {
        let handoff = Handoff::new();
        let _rx = handoff.arm(Phase::Request);
        handoff.disarm();
        assert_eq!(handoff.deliver(Phase::Request, Reply::Ack), Delivery::Stray);
    }

    #[test]
    fn nak_between_phases_is_stray() {
        let handoff = Handoff::new();
        let _rx = handoff.arm(Phase::Request);
        assert_eq!(handoff.deliver(Phase::Request, Reply::Ack), Delivery::Accepted);
        assert_eq!(handoff.deliver(Phase::Request, Reply::Nak), Delivery::Stray);
        assert_eq!(handoff.deliver(Phase::Done, Reply::Nak), Delivery::Stray);

        let mut rx = handoff.arm(Phase::Done);
        assert!(rx.try_recv().is_err());
        assert_eq!(handoff.deliver(Phase::Done, Reply::Ack), Delivery::Accepted);
        assert_eq!(rx.try_recv(), Ok(Reply::Ack));
    }
}
