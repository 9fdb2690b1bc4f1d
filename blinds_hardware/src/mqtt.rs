//! MQTT session backed by `rumqttc`.
//!
//! The rumqttc event loop runs on a background thread. It forwards inbound
//! publishes over a channel and tracks the link state; subscriptions are
//! replayed on every ConnAck so the control loop never waits on the broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blinds_traits::{Message, MessageBus};
use crossbeam_channel::{Receiver, TryRecvError};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Broker endpoint.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
}

pub struct MqttBus {
    settings: MqttSettings,
    client: Option<Client>,
    inbox: Option<Receiver<Message>>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MqttBus {
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            settings,
            client: None,
            inbox: None,
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MessageBus for MqttBus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Starts the background session on first call. Later calls are no-ops
    /// because rumqttc reconnects on its own.
    fn connect(&mut self, client_id: &str) -> Result<(), BoxError> {
        if self.client.is_some() {
            return Ok(());
        }
        let mut opts = MqttOptions::new(client_id, &self.settings.host, self.settings.port);
        opts.set_keep_alive(self.settings.keep_alive);
        let (client, mut connection) = Client::new(opts, 64);
        let (tx, rx) = crossbeam_channel::unbounded();

        let connected = Arc::clone(&self.connected);
        let subscriptions = Arc::clone(&self.subscriptions);
        let resub = client.clone();
        // Exits once the bus (and with it the inbox) is dropped.
        std::thread::Builder::new()
            .name("mqtt-eventloop".into())
            .spawn(move || {
                for event in connection.iter() {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected.store(true, Ordering::Release);
                            info!("mqtt connected");
                            let topics = subscriptions.lock().map(|g| g.clone()).unwrap_or_default();
                            for t in topics {
                                if let Err(e) = resub.try_subscribe(t.as_str(), QoS::AtMostOnce) {
                                    warn!(topic = %t, error = %e, "resubscribe failed");
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(p))) => {
                            let payload = String::from_utf8_lossy(&p.payload).into_owned();
                            if tx.send(Message::new(p.topic, payload)).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if connected.swap(false, Ordering::AcqRel) {
                                warn!(error = %e, "mqtt connection lost");
                            } else {
                                debug!(error = %e, "mqtt connect attempt failed");
                            }
                            std::thread::sleep(RETRY_BACKOFF);
                        }
                    }
                }
                connected.store(false, Ordering::Release);
                debug!("mqtt event loop exited");
            })
            .map_err(HwError::Io)?;

        self.client = Some(client);
        self.inbox = Some(rx);
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), BoxError> {
        let client = self.client.as_ref().ok_or(HwError::Disconnected)?;
        if let Ok(mut subs) = self.subscriptions.lock()
            && !subs.iter().any(|s| s == topic)
        {
            subs.push(topic.to_owned());
        }
        client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| HwError::Broker(e.to_string()))?;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Message>, BoxError> {
        let Some(rx) = self.inbox.as_ref() else {
            return Ok(None);
        };
        match rx.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Box::new(HwError::Disconnected)),
        }
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BoxError> {
        if !self.is_connected() {
            return Err(Box::new(HwError::Disconnected));
        }
        let client = self.client.as_ref().ok_or(HwError::Disconnected)?;
        client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| HwError::Broker(e.to_string()))?;
        Ok(())
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.try_disconnect();
        }
    }
}
