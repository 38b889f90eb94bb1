//! Scripted device for controller tests. Mirrors how the Synth OPL GATT server answers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::Opcode;
use crate::transport::{NotificationHandler, Transport, TransportError};

type HandlerSlot = Arc<Mutex<Option<Arc<NotificationHandler>>>>;

/// Raw notifications pushed after an optional delay.
pub(crate) type Pushes = Vec<(Duration, Vec<u8>)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Written {
    Control(Opcode),
    Data(Vec<u8>),
}

#[derive(Debug, Default)]
pub(crate) struct Script {
    pub on_request: Pushes,
    pub on_done: Pushes,
    /// Push bytes right after the n-th packet (1-based) is confirmed.
    pub after_packet: Option<(usize, Vec<u8>)>,
    /// Fail the n-th data write; 0 is the packet-size announcement.
    pub fail_packet: Option<usize>,
    /// Drop the link when this opcode is written.
    pub fail_control: Option<Opcode>,
    pub fail_subscribe: bool,
}

impl Script {
    pub fn replying(request: Opcode, done: Opcode) -> Self {
        Self {
            on_request: now(request),
            on_done: now(done),
            ..Self::default()
        }
    }
}

pub(crate) fn now(opcode: Opcode) -> Pushes {
    vec![(Duration::ZERO, vec![u8::from(opcode)])]
}

pub(crate) fn after(delay: Duration, opcode: Opcode) -> Pushes {
    vec![(delay, vec![u8::from(opcode)])]
}

pub(crate) struct MockDevice {
    max_payload: usize,
    script: Script,
    written: Mutex<Vec<Written>>,
    handler: HandlerSlot,
    data_writes: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl MockDevice {
    pub fn new(max_payload: usize, script: Script) -> Self {
        Self {
            max_payload,
            script,
            written: Mutex::new(Vec::new()),
            handler: Arc::new(Mutex::new(None)),
            data_writes: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
        }
    }

    pub fn written(&self) -> Vec<Written> {
        self.written.lock().unwrap().clone()
    }

    /// Firmware packets written, excluding the packet-size announcement.
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.written()
            .into_iter()
            .filter_map(|w| match w {
                Written::Data(bytes) => Some(bytes),
                Written::Control(_) => None,
            })
            .skip(1)
            .collect()
    }

    fn push(&self, pushes: &Pushes) {
        for (delay, bytes) in pushes.iter().cloned() {
            if delay.is_zero() {
                fire(&self.handler, &bytes);
            } else {
                let slot = self.handler.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    fire(&slot, &bytes);
                });
            }
        }
    }
}

fn fire(slot: &HandlerSlot, bytes: &[u8]) {
    let handler = slot.lock().unwrap().clone();
    if let Some(handler) = handler {
        (**handler)(bytes);
    }
}

#[async_trait]
impl Transport for MockDevice {
    async fn write_control(&self, opcode: Opcode) -> Result<(), TransportError> {
        if self.script.fail_control == Some(opcode) {
            return Err(TransportError::Disconnected);
        }
        self.written.lock().unwrap().push(Written::Control(opcode));
        match opcode {
            Opcode::Request => self.push(&self.script.on_request),
            Opcode::Done => self.push(&self.script.on_done),
            _ => {}
        }
        Ok(())
    }

    async fn write_data(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let packet = self.data_writes.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_packet == Some(packet) {
            return Err(TransportError::Write("link lost".into()));
        }
        self.written
            .lock()
            .unwrap()
            .push(Written::Data(bytes.to_vec()));
        if let Some((n, pushed)) = &self.script.after_packet {
            if *n == packet {
                fire(&self.handler, pushed);
            }
        }
        Ok(())
    }

    async fn subscribe_control(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        if self.script.fail_subscribe {
            return Err(TransportError::Subscribe("notify not permitted".into()));
        }
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        *self.handler.lock().unwrap() = Some(Arc::new(handler));
        Ok(())
    }

    async fn unsubscribe_control(&self) -> Result<(), TransportError> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        *self.handler.lock().unwrap() = None;
        Ok(())
    }

    fn max_payload_size(&self) -> usize {
        self.max_payload
    }
}
