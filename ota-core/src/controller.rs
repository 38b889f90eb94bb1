//! OTA session controller: drives handshake, packet stream and completion over a [`Transport`].
//!
//! One cooperative task runs the whole session. The control-notification callback only
//! classifies replies and hands them over through [`Handoff`]; the controller waits on the
//! armed slot with a single bounded timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::chunk::{self, ChunkError, Packets};
use crate::handoff::{Delivery, Handoff};
use crate::protocol::{Phase, PROTOCOL_OVERHEAD};
use crate::session::{Event, OtaSession, State};
use crate::transport::{NotificationHandler, Transport, TransportError};
use crate::wire;

/// Default wait for REQUEST_ACK / DONE_ACK. The device validates the image before answering DONE.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Bounded wait for each handshake reply.
    pub ack_timeout: Duration,
    /// Bytes subtracted from the transport unit to get the packet size.
    pub overhead: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            overhead: PROTOCOL_OVERHEAD,
        }
    }
}

/// Terminal outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeReport {
    pub state: State,
    /// Wall-clock time from session start; set on success only.
    pub elapsed: Option<Duration>,
    pub packets_sent: usize,
    pub total_packets: usize,
    /// Transport failure that ended the run, if any.
    pub error: Option<TransportError>,
}

impl OutcomeReport {
    pub fn is_success(&self) -> bool {
        self.state == State::Succeeded
    }
}

impl fmt::Display for OutcomeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.elapsed, &self.error) {
            (Some(elapsed), _) => write!(f, "{}! Total time: {elapsed:.2?}", self.state),
            (None, Some(err)) => write!(f, "OTA failed: {}: {err}", self.state),
            (None, None) => write!(
                f,
                "OTA failed: {} after {}/{} packets",
                self.state, self.packets_sent, self.total_packets
            ),
        }
    }
}

/// Run rejected before any endpoint was touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtaError {
    #[error("firmware image is empty")]
    EmptyFirmware,
    #[error(transparent)]
    ChunkSize(#[from] ChunkError),
}

/// The session reached a terminal state; stop driving it.
struct Halted;

type Step = Result<(), Halted>;

struct Run {
    session: OtaSession,
    handoff: Arc<Handoff>,
    packets_sent: usize,
    error: Option<TransportError>,
}

impl Run {
    fn new(total_packets: usize) -> Self {
        Self {
            session: OtaSession::new(total_packets),
            handoff: Arc::new(Handoff::new()),
            packets_sent: 0,
            error: None,
        }
    }

    fn apply(&mut self, event: Event) -> Step {
        let from = self.session.state();
        let to = self.session.apply(event);
        debug!(%from, %to, ?event, "session transition");
        if to.is_terminal() {
            Err(Halted)
        } else {
            Ok(())
        }
    }

    fn transport_failed(&mut self, err: TransportError) -> Step {
        error!("Transport error: {err}");
        self.error = Some(err);
        self.apply(Event::TransportFailed)
    }

    fn into_report(self, elapsed: Option<Duration>) -> OutcomeReport {
        OutcomeReport {
            state: self.session.state(),
            elapsed,
            packets_sent: self.packets_sent,
            total_packets: self.session.total_packets(),
            error: self.error,
        }
    }
}

/// Unsubscribes control notifications at most once.
struct Subscription<'a, T: ?Sized> {
    transport: &'a T,
    active: bool,
}

impl<'a, T: Transport + ?Sized> Subscription<'a, T> {
    fn new(transport: &'a T) -> Self {
        Self {
            transport,
            active: true,
        }
    }

    async fn close(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Err(err) = self.transport.unsubscribe_control().await {
            warn!("Failed to unsubscribe from OTA control: {err}");
        }
    }
}

/// Drives one OTA run per call. Holds no state between runs.
#[derive(Debug, Clone, Default)]
pub struct OtaController {
    config: ControllerConfig,
}

impl OtaController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    /// Push `firmware` to the device behind `transport`.
    ///
    /// Returns `Err` only for preconditions checked before any endpoint is touched. Every other
    /// failure is a terminal state in the report.
    pub async fn run<T>(&self, transport: &T, firmware: &[u8]) -> Result<OutcomeReport, OtaError>
    where
        T: Transport + ?Sized,
    {
        if firmware.is_empty() {
            return Err(OtaError::EmptyFirmware);
        }
        let chunk_size = chunk::chunk_size(transport.max_payload_size(), self.config.overhead)?;
        let announcement = wire::encode_packet_size(chunk_size)
            .map_err(|_| ChunkError::TooLarge(chunk_size))?;
        let packets = chunk::split_into_packets(firmware, chunk_size);
        let started = Instant::now();
        let mut run = Run::new(packets.len());

        let handler = notification_handler(run.handoff.clone());
        if let Err(err) = transport.subscribe_control(handler).await {
            let _ = run.transport_failed(err);
            return Ok(run.into_report(None));
        }
        let mut subscription = Subscription::new(transport);
        // Every path through `drive` ends in a terminal state.
        let _ = self.drive(transport, &mut run, chunk_size, announcement, packets).await;
        subscription.close().await;

        let elapsed = (run.session.state() == State::Succeeded).then(|| started.elapsed());
        Ok(run.into_report(elapsed))
    }

    async fn drive<T>(
        &self,
        transport: &T,
        run: &mut Run,
        chunk_size: usize,
        announcement: [u8; 2],
        packets: Packets<'_>,
    ) -> Step
    where
        T: Transport + ?Sized,
    {
        info!("Sending packet size: {chunk_size}.");
        if let Err(err) = transport.write_data(&announcement).await {
            return run.transport_failed(err);
        }
        self.handshake(transport, run, Phase::Request).await?;
        self.transfer(transport, run, packets).await?;
        self.handshake(transport, run, Phase::Done).await
    }

    async fn handshake<T>(&self, transport: &T, run: &mut Run, phase: Phase) -> Step
    where
        T: Transport + ?Sized,
    {
        // Armed before the write so a fast reply cannot be missed.
        let reply = run.handoff.arm(phase);
        let opcode = phase.opcode();
        info!("Sending OTA {opcode:?}.");
        if let Err(err) = transport.write_control(opcode).await {
            return run.transport_failed(err);
        }
        run.apply(match phase {
            Phase::Request => Event::RequestSent,
            Phase::Done => Event::DoneSent,
        })?;

        match timeout(self.config.ack_timeout, reply).await {
            Ok(Ok(reply)) => {
                info!("Device answered OTA {opcode:?} with {reply:?}.");
                run.apply(Event::Reply(phase, reply))
            }
            Ok(Err(_)) | Err(_) => {
                run.handoff.disarm();
                warn!(
                    "No answer to OTA {opcode:?} within {:?}.",
                    self.config.ack_timeout
                );
                run.apply(Event::Timeout)
            }
        }
    }

    async fn transfer<T>(&self, transport: &T, run: &mut Run, packets: Packets<'_>) -> Step
    where
        T: Transport + ?Sized,
    {
        let total = packets.len();
        for (index, packet) in packets.enumerate() {
            info!("Sending packet {}/{}.", index + 1, total);
            if let Err(err) = transport.write_data(packet).await {
                return run.transport_failed(err);
            }
            run.packets_sent += 1;
            run.apply(Event::PacketConfirmed)?;
        }
        Ok(())
    }
}

/// Push `firmware` with the default configuration.
pub async fn run_ota_update<T>(transport: &T, firmware: &[u8]) -> Result<OutcomeReport, OtaError>
where
    T: Transport + ?Sized,
{
    OtaController::default().run(transport, firmware).await
}

fn notification_handler(handoff: Arc<Handoff>) -> NotificationHandler {
    Box::new(move |bytes: &[u8]| {
        let opcode = match wire::decode_notification(bytes) {
            Ok(opcode) => opcode,
            Err(err) => {
                warn!(?bytes, "Unclassified control notification: {err}");
                return;
            }
        };
        let Some((phase, reply)) = opcode.classify() else {
            info!("Notification received: {opcode:?}");
            return;
        };
        match handoff.deliver(phase, reply) {
            Delivery::Accepted => debug!(?phase, ?reply, "reply handed over"),
            Delivery::Stray => warn!(?phase, ?reply, "Ignoring reply outside its phase."),
        }
    })
}
