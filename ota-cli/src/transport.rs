//! BLE transport: the OTA control and data characteristics of a connected peripheral.

use std::collections::BTreeSet;

use anyhow::Context;
use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use ota_core::{
    NotificationHandler, Opcode, Transport, TransportError, OTA_CONTROL_UUID, OTA_DATA_UUID,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Connected peripheral exposing the OTA service.
pub struct BleTransport {
    peripheral: Peripheral,
    control: Characteristic,
    data: Characteristic,
    mtu: usize,
    /// Task forwarding control notifications to the registered handler.
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Connect, discover services and resolve both OTA characteristics.
    pub async fn connect(peripheral: Peripheral, mtu: usize) -> anyhow::Result<Self> {
        peripheral
            .connect()
            .await
            .context("cannot connect to device")?;
        peripheral
            .discover_services()
            .await
            .context("service discovery failed")?;
        let chars = peripheral.characteristics();
        let control = find_characteristic(&chars, OTA_CONTROL_UUID)
            .context("device has no OTA control characteristic")?;
        let data = find_characteristic(&chars, OTA_DATA_UUID)
            .context("device has no OTA data characteristic")?;
        info!("Connected to {}.", peripheral.address());
        Ok(Self {
            peripheral,
            control,
            data,
            mtu,
            listener: Mutex::new(None),
        })
    }

    /// Drop the link. The device reboots after a successful update, so failures are only logged.
    pub async fn disconnect(&self) {
        if let Some(task) = self.listener.lock().await.take() {
            task.abort();
        }
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Disconnect failed: {e}");
        }
    }
}

fn find_characteristic(chars: &BTreeSet<Characteristic>, uuid: Uuid) -> Option<Characteristic> {
    chars.iter().find(|c| c.uuid == uuid).cloned()
}

fn write_error(e: btleplug::Error) -> TransportError {
    match e {
        btleplug::Error::NotConnected => TransportError::Disconnected,
        e => TransportError::Write(e.to_string()),
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write_control(&self, opcode: Opcode) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.control, &[u8::from(opcode)], WriteType::WithResponse)
            .await
            .map_err(write_error)
    }

    async fn write_data(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.data, bytes, WriteType::WithResponse)
            .await
            .map_err(write_error)
    }

    async fn subscribe_control(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        self.peripheral
            .subscribe(&self.control)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let uuid = self.control.uuid;
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == uuid {
                    handler(notification.value.as_slice());
                }
            }
            debug!("control notification stream ended");
        });
        if let Some(previous) = self.listener.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe_control(&self) -> Result<(), TransportError> {
        let Some(task) = self.listener.lock().await.take() else {
            return Ok(());
        };
        task.abort();
        self.peripheral
            .unsubscribe(&self.control)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    fn max_payload_size(&self) -> usize {
        self.mtu
    }
}
