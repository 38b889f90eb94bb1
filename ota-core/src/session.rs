//! Session state machine. No I/O: the controller feeds events, the session returns the next state.

use std::fmt;

use crate::protocol::{Phase, Reply};

/// Where an OTA run stands. Everything after `AwaitingDoneAck` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    AwaitingRequestAck,
    /// Streaming packets; `confirmed` counts packets the transport acknowledged.
    Transferring { confirmed: usize },
    AwaitingDoneAck,
    Succeeded,
    RequestRejected,
    TransferFailed,
    DoneRejected,
    Timeout,
    TransportError,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::RequestRejected
                | Self::TransferFailed
                | Self::DoneRejected
                | Self::Timeout
                | Self::TransportError
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingRequestAck => write!(f, "awaiting request acknowledgement"),
            Self::Transferring { confirmed } => write!(f, "transferring ({confirmed} sent)"),
            Self::AwaitingDoneAck => write!(f, "awaiting done acknowledgement"),
            Self::Succeeded => write!(f, "OTA successful"),
            Self::RequestRejected => write!(f, "device did not acknowledge the OTA request"),
            Self::TransferFailed => write!(f, "transfer failed"),
            Self::DoneRejected => write!(f, "device did not acknowledge OTA done"),
            Self::Timeout => write!(f, "timed out waiting for the device"),
            Self::TransportError => write!(f, "transport error"),
        }
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// REQUEST was written to the control endpoint.
    RequestSent,
    /// Device replied to a handshake phase.
    Reply(Phase, Reply),
    /// One data packet write was confirmed.
    PacketConfirmed,
    /// DONE was written to the control endpoint.
    DoneSent,
    /// No reply within the wait window.
    Timeout,
    /// A write, read or subscription failed.
    TransportFailed,
}

/// One OTA run. Exactly one per transfer; discarded when terminal.
#[derive(Debug, Clone)]
pub struct OtaSession {
    state: State,
    total_packets: usize,
}

impl OtaSession {
    pub fn new(total_packets: usize) -> Self {
        Self {
            state: State::Idle,
            total_packets,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn total_packets(&self) -> usize {
        self.total_packets
    }

    /// Apply an event and return the new state. Total: every (state, event) pair has an outcome.
    ///
    /// Terminal states absorb every event. Replies for the wrong phase leave the state unchanged.
    /// Controller events out of protocol order fail the transfer.
    pub fn apply(&mut self, event: Event) -> State {
        self.state = self.next(event);
        self.state
    }

    fn next(&self, event: Event) -> State {
        use self::{Event as E, State as S};

        if self.state.is_terminal() {
            return self.state;
        }
        match (self.state, event) {
            (_, E::TransportFailed) => S::TransportError,
            (_, E::Timeout) => S::Timeout,

            (S::Idle, E::RequestSent) => S::AwaitingRequestAck,
            (S::Idle, E::Reply(..)) => S::Idle,
            (S::Idle, E::PacketConfirmed | E::DoneSent) => S::TransferFailed,

            (S::AwaitingRequestAck, E::Reply(Phase::Request, Reply::Ack)) => {
                S::Transferring { confirmed: 0 }
            }
            (S::AwaitingRequestAck, E::Reply(Phase::Request, Reply::Nak)) => S::RequestRejected,
            (S::AwaitingRequestAck, E::Reply(Phase::Done, _)) => S::AwaitingRequestAck,
            (S::AwaitingRequestAck, E::RequestSent | E::PacketConfirmed | E::DoneSent) => {
                S::TransferFailed
            }

            (S::Transferring { confirmed }, E::PacketConfirmed) => {
                if confirmed < self.total_packets {
                    S::Transferring {
                        confirmed: confirmed + 1,
                    }
                } else {
                    S::TransferFailed
                }
            }
            (S::Transferring { confirmed }, E::DoneSent) => {
                if confirmed == self.total_packets {
                    S::AwaitingDoneAck
                } else {
                    S::TransferFailed
                }
            }
            (S::Transferring { confirmed }, E::Reply(..)) => S::Transferring { confirmed },
            (S::Transferring { .. }, E::RequestSent) => S::TransferFailed,

            (S::AwaitingDoneAck, E::Reply(Phase::Done, Reply::Ack)) => S::Succeeded,
            (S::AwaitingDoneAck, E::Reply(Phase::Done, Reply::Nak)) => S::DoneRejected,
            (S::AwaitingDoneAck, E::Reply(Phase::Request, _)) => S::AwaitingDoneAck,
            (S::AwaitingDoneAck, E::RequestSent | E::PacketConfirmed | E::DoneSent) => {
                S::TransferFailed
            }

            (terminal, _) => terminal,
        }
    }
}
