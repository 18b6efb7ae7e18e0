//! Telemetry channel access over MQTT with mutual TLS.
//!
//! Both endpoints authenticate with certificates; events travel at-least-once
//! (QoS 1) on a single fixed topic. Each process owns one background driver
//! thread that runs the network event loop, so reconnects and redeliveries
//! never block the caller.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::message::StateEvent;
use log::{debug, error, info, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use serde::Deserialize;
use std::fs;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Outstanding requests the client handle may buffer before publish blocks.
const REQUEST_CAP: usize = 10;

/// Inbound events buffered between the driver thread and the consumer.
/// When the consumer falls this far behind, further messages are dropped.
const INBOUND_QUEUE_CAP: usize = 64;

/// How long to wait for the broker to acknowledge the initial connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const RECONNECT_BACKOFF_MIN: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// The `channel:` section of ajar.yaml, shared by the sensor hub and the
/// dashboard. Certificate paths point at PEM files.
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelConfig {
    pub endpoint: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    30
}

impl ChannelConfig {
    fn mqtt_options(&self) -> io::Result<MqttOptions> {
        let ca = fs::read(&self.ca_cert)?;
        let client_cert = fs::read(&self.client_cert)?;
        let client_key = fs::read(&self.client_key)?;

        let mut options =
            MqttOptions::new(self.client_id.clone(), self.endpoint.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(false);
        options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: Some((client_cert, client_key)),
        }));

        Ok(options)
    }
}

/// Publisher handle held by the detection loop.
///
/// `connect` blocks until the broker acknowledges the connection; the
/// detection path treats a failure here as fatal since events would have
/// no destination. After that, `publish` only hands the event to the
/// driver thread. QoS 1 redelivery and reconnects happen there.
pub struct EventPublisher {
    client: Client,
    topic: String,
}

impl EventPublisher {
    pub fn connect(config: &ChannelConfig) -> io::Result<Self> {
        let options = config.mqtt_options()?;
        let (client, connection) = Client::new(options, REQUEST_CAP);

        let (connected_tx, connected_rx) = mpsc::channel();
        thread::spawn(move || {
            drive(connection, None, connected_tx);
        });

        info!("Connecting to the telemetry channel at {}...", config.endpoint);
        connected_rx.recv_timeout(CONNECT_TIMEOUT).map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                "the telemetry channel did not acknowledge the connection",
            )
        })?;
        info!("Telemetry channel connected.");

        Ok(Self {
            client,
            topic: config.topic.clone(),
        })
    }

    pub fn publish(&self, event: &StateEvent) -> io::Result<()> {
        let payload = event.to_payload()?;
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        info!("Published: {}", payload);
        Ok(())
    }
}

/// Subscriber handle held by the dashboard's inbound worker.
///
/// The driver thread subscribes on every (re)connection and forwards each
/// received payload into a bounded queue; `recv` blocks on that queue.
/// Transport trouble is retried in the background and never surfaces here.
pub struct EventSubscriber {
    inbound: mpsc::Receiver<Vec<u8>>,
}

impl EventSubscriber {
    pub fn connect(config: &ChannelConfig) -> io::Result<Self> {
        let options = config.mqtt_options()?;
        let (client, connection) = Client::new(options, REQUEST_CAP);

        let (inbound_tx, inbound_rx) = mpsc::sync_channel(INBOUND_QUEUE_CAP);
        let (connected_tx, connected_rx) = mpsc::channel();
        let topic = config.topic.clone();
        thread::spawn(move || {
            drive(connection, Some((client, topic, inbound_tx)), connected_tx);
        });

        info!("Connecting to the telemetry channel at {}...", config.endpoint);
        connected_rx.recv_timeout(CONNECT_TIMEOUT).map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                "the telemetry channel did not acknowledge the connection",
            )
        })?;
        info!("Telemetry channel connected.");

        Ok(Self { inbound: inbound_rx })
    }

    /// Blocks until the next raw payload arrives. Returns None when the
    /// driver thread has gone away (process teardown).
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.inbound.recv().ok()
    }
}

/// Network event loop shared by both endpoints. Runs until the owning
/// handle is dropped. On errors it sleeps with capped exponential backoff;
/// the iterator itself re-establishes the connection on the next poll.
fn drive(
    mut connection: Connection,
    subscription: Option<(Client, String, mpsc::SyncSender<Vec<u8>>)>,
    connected_tx: mpsc::Sender<()>,
) {
    let mut backoff = RECONNECT_BACKOFF_MIN;

    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff = RECONNECT_BACKOFF_MIN;
                // Session state on the broker is not trusted across
                // reconnects; subscribe again every time.
                if let Some((client, topic, _)) = &subscription {
                    match client.subscribe(topic, QoS::AtLeastOnce) {
                        Ok(_) => info!("Subscribed to {}", topic),
                        Err(e) => error!("Failed to subscribe to {}: {e}", topic),
                    }
                }
                // Only the initial connect has a listener; later acks are
                // reconnects and nobody is waiting for them.
                let _ = connected_tx.send(());
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Some((_, _, inbound)) = &subscription {
                    if inbound.try_send(publish.payload.to_vec()).is_err() {
                        warn!("Inbound event queue is full. Dropping a message.");
                    }
                }
            }
            Ok(event) => {
                debug!("Channel event: {:?}", event);
            }
            Err(e) => {
                error!(
                    "Telemetry channel error: {e}. Retrying in {}s.",
                    backoff.as_secs()
                );
                thread::sleep(backoff);
                backoff = std::cmp::min(backoff * 2, RECONNECT_BACKOFF_MAX);
            }
        }
    }

    debug!("Telemetry channel driver exiting.");
}
