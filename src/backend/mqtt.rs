//! MQTT implementation of [`BusClient`]
//!
//! `rumqttc` is async, while the dispatcher is a plain thread that publishes
//! one message at a time and waits for it. [`MqttBus`] bridges the two by
//! owning a small private tokio runtime:
//!
//! - a driver task polls the rumqttc event loop for the whole connection
//!   lifetime and reconnects after connection errors
//! - `publish` enqueues the message with `try_publish` and then blocks on a
//!   oneshot completed by the driver when the broker acknowledges it
//!
//! # Completion Tracking
//!
//! rumqttc reports the packet id of a publish only when it is written to the
//! socket (`Outgoing::Publish(pkid)`), in request order. [`AckTracker`] keeps
//! waiters in that order and moves each one into an in-flight map keyed by
//! packet id once it has been sent. PUBACK (QoS 1) or PUBCOMP (QoS 2) then
//! completes the waiter; QoS 0 completes as soon as the packet is written.
//!
//! A caller that times out leaves a tombstone under its packet id until the
//! broker acknowledges it. rumqttc resends unacknowledged packets after a
//! reconnect, and the tombstone is what marks such a write as a resend rather
//! than the next queued publish.

use crate::config::{BrokerAddress, RelayConfig};
use crate::error::{RelayError, Result};
use crate::types::QosLevel;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::bus_trait::BusClient;

/// Request channel capacity of the rumqttc client
const REQUEST_CAPACITY: usize = 16;

/// Pause between reconnect attempts after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for a clean disconnect
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

type ConnectResult = std::result::Result<(), String>;

fn to_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Correlates outgoing publishes with broker acknowledgements
#[derive(Debug, Default)]
pub struct AckTracker {
    /// Waiters whose publish has not been written yet, in request order
    queued: VecDeque<(QosLevel, oneshot::Sender<()>)>,
    /// Written publishes awaiting PUBACK/PUBCOMP; `None` once the caller gave up
    inflight: HashMap<u16, Option<oneshot::Sender<()>>>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for the next publish request
    pub fn push(&mut self, qos: QosLevel, done: oneshot::Sender<()>) {
        self.queued.push_back((qos, done));
    }

    /// Drop the most recent waiter after its request was rejected
    pub fn cancel_last(&mut self) {
        self.queued.pop_back();
    }

    /// A publish was written to the socket
    pub fn sent(&mut self, pkid: u16) {
        if pkid != 0 && self.inflight.contains_key(&pkid) {
            // Retransmission after reconnect
            return;
        }
        let Some((qos, done)) = self.queued.pop_front() else {
            tracing::debug!("Untracked publish written (pkid {})", pkid);
            return;
        };
        match qos {
            QosLevel::AtMostOnce => {
                let _ = done.send(());
            }
            QosLevel::AtLeastOnce | QosLevel::ExactlyOnce => {
                self.inflight.insert(pkid, Some(done));
            }
        }
    }

    /// The broker completed the publish with this packet id
    pub fn acknowledged(&mut self, pkid: u16) {
        if let Some(Some(done)) = self.inflight.remove(&pkid) {
            let _ = done.send(());
        }
    }

    /// Release the waiters of in-flight publishes whose caller has given up
    ///
    /// The packet id stays reserved until the broker acknowledges it.
    pub fn prune(&mut self) {
        for done in self.inflight.values_mut() {
            if done.as_ref().is_some_and(|tx| tx.is_closed()) {
                *done = None;
            }
        }
    }

    /// Number of publishes queued or in flight with a caller still waiting
    pub fn pending(&self) -> usize {
        self.queued.len() + self.inflight.values().filter(|done| done.is_some()).count()
    }

    /// Number of packet ids held for abandoned publishes
    pub fn abandoned(&self) -> usize {
        self.inflight.values().filter(|done| done.is_none()).count()
    }
}

fn lock(tracker: &Mutex<AckTracker>) -> MutexGuard<'_, AckTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build the rumqttc options for a relay configuration
pub fn mqtt_options(config: &RelayConfig) -> Result<MqttOptions> {
    let broker: BrokerAddress = config.broker()?;
    let settings = &config.mqtt;

    let mut options = MqttOptions::new(config.client_id(), broker.host, broker.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    options.set_clean_session(true);

    if let Some((username, password)) = settings.credentials() {
        tracing::info!("Using username/password authentication");
        options.set_credentials(username, password);
    }

    if let Some(will) = &settings.last_will {
        options.set_last_will(LastWill::new(
            will.topic.clone(),
            will.payload.clone().into_bytes(),
            to_qos(will.qos),
            will.retain,
        ));
    }

    Ok(options)
}

/// MQTT bus client with blocking, bounded publishes
pub struct MqttBus {
    options: MqttOptions,
    broker: String,
    publish_timeout: Duration,
    connect_timeout: Duration,
    runtime: Runtime,
    client: Option<AsyncClient>,
    driver: Option<JoinHandle<()>>,
    tracker: Arc<Mutex<AckTracker>>,
}

impl MqttBus {
    /// Create an unconnected client from the `[mqtt]` settings
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let options = mqtt_options(config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mqtt-io")
            .enable_all()
            .build()?;

        Ok(Self {
            options,
            broker: config.broker()?.to_string(),
            publish_timeout: config.mqtt.publish_timeout(),
            connect_timeout: config.mqtt.connect_timeout(),
            runtime,
            client: None,
            driver: None,
            tracker: Arc::new(Mutex::new(AckTracker::new())),
        })
    }

    fn abort_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.client = None;
    }
}

impl BusClient for MqttBus {
    fn connect(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }

        tracing::info!("Connecting to MQTT broker {}", self.broker);

        let (connect_tx, connect_rx) = oneshot::channel();
        let (client, eventloop) = {
            let _guard = self.runtime.enter();
            AsyncClient::new(self.options.clone(), REQUEST_CAPACITY)
        };

        self.driver = Some(self.runtime.spawn(drive(
            eventloop,
            Arc::clone(&self.tracker),
            connect_tx,
        )));
        self.client = Some(client);

        let timeout = self.connect_timeout;
        let outcome = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, connect_rx).await });

        match outcome {
            Ok(Ok(Ok(()))) => {
                tracing::info!("Connected to MQTT broker {}", self.broker);
                Ok(())
            }
            Ok(Ok(Err(reason))) => {
                self.abort_driver();
                Err(RelayError::Bus(format!(
                    "cannot connect to {}: {}",
                    self.broker, reason
                )))
            }
            Ok(Err(_)) => {
                self.abort_driver();
                Err(RelayError::Bus(format!(
                    "connection to {} ended before it was accepted",
                    self.broker
                )))
            }
            Err(_) => {
                self.abort_driver();
                Err(RelayError::Timeout(format!(
                    "broker {} did not accept the connection within {:?}",
                    self.broker, timeout
                )))
            }
        }
    }

    fn publish(&mut self, topic: &str, payload: &str, qos: QosLevel) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| RelayError::Bus("not connected".to_string()))?;

        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut tracker = lock(&self.tracker);
            tracker.prune();
            tracker.push(qos, done_tx);
        }

        if let Err(e) = client.try_publish(topic, to_qos(qos), false, payload.as_bytes().to_vec()) {
            lock(&self.tracker).cancel_last();
            return Err(RelayError::Bus(format!("publish to {} failed: {}", topic, e)));
        }

        let timeout = self.publish_timeout;
        match self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, done_rx).await })
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RelayError::Bus(format!(
                "publish to {} dropped before completion",
                topic
            ))),
            Err(_) => Err(RelayError::Timeout(format!(
                "publish to {} not acknowledged within {:?}",
                topic, timeout
            ))),
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        let result = client
            .try_disconnect()
            .map_err(|e| RelayError::Bus(format!("disconnect failed: {}", e)));

        if let Some(mut driver) = self.driver.take() {
            let stopped = self
                .runtime
                .block_on(async { tokio::time::timeout(DISCONNECT_TIMEOUT, &mut driver).await });
            if stopped.is_err() {
                tracing::warn!(
                    "MQTT connection did not close within {:?}; dropping it",
                    DISCONNECT_TIMEOUT
                );
                driver.abort();
            }
        }

        let (pending, abandoned) = {
            let tracker = lock(&self.tracker);
            (tracker.pending(), tracker.abandoned())
        };
        if pending + abandoned > 0 {
            tracing::debug!(
                "{} publish(es) unacknowledged at disconnect ({} already timed out)",
                pending + abandoned,
                abandoned
            );
        }
        tracing::info!("Disconnected from MQTT broker {}", self.broker);
        result
    }
}

/// Poll the event loop until disconnect, feeding the ack tracker
async fn drive(
    mut eventloop: EventLoop,
    tracker: Arc<Mutex<AckTracker>>,
    connect_tx: oneshot::Sender<ConnectResult>,
) {
    let mut connect_tx = Some(connect_tx);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    let reason = format!("broker refused connection: {:?}", ack.code);
                    match connect_tx.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(reason));
                            return;
                        }
                        None => tracing::warn!("{}", reason),
                    }
                    continue;
                }
                match connect_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    None => tracing::info!("Reconnected to MQTT broker"),
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => lock(&tracker).acknowledged(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => lock(&tracker).acknowledged(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => lock(&tracker).sent(pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => return,
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = connect_tx.take() {
                    let _ = tx.send(Err(e.to_string()));
                    return;
                }
                tracing::warn!("MQTT connection error: {}; retrying", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> RelayConfig {
        RelayConfig::from_toml_str(&format!(
            "[mqtt]\nserver_address = \"tcp://broker.local:1884\"\nclient_id = \"relay-test\"\n{}",
            extra
        ))
        .unwrap()
    }

    #[test]
    fn test_qos1_completes_on_puback() {
        let mut tracker = AckTracker::new();
        let (tx, mut rx) = oneshot::channel();
        tracker.push(QosLevel::AtLeastOnce, tx);

        tracker.sent(7);
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.pending(), 1);

        tracker.acknowledged(7);
        assert!(rx.try_recv().is_ok());
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_qos0_completes_when_written() {
        let mut tracker = AckTracker::new();
        let (tx, mut rx) = oneshot::channel();
        tracker.push(QosLevel::AtMostOnce, tx);

        tracker.sent(0);
        assert!(rx.try_recv().is_ok());
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_retransmit_does_not_consume_next_waiter() {
        let mut tracker = AckTracker::new();
        let (first_tx, mut first_rx) = oneshot::channel();
        let (second_tx, mut second_rx) = oneshot::channel();
        tracker.push(QosLevel::ExactlyOnce, first_tx);
        tracker.sent(3);
        tracker.push(QosLevel::ExactlyOnce, second_tx);

        // pkid 3 written again after a reconnect
        tracker.sent(3);
        tracker.acknowledged(3);
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_err());

        tracker.sent(4);
        tracker.acknowledged(4);
        assert!(second_rx.try_recv().is_ok());
    }

    #[test]
    fn test_cancel_and_prune() {
        let mut tracker = AckTracker::new();
        let (tx, _rx) = oneshot::channel();
        tracker.push(QosLevel::AtLeastOnce, tx);
        tracker.cancel_last();
        assert_eq!(tracker.pending(), 0);

        let (tx, rx) = oneshot::channel();
        tracker.push(QosLevel::AtLeastOnce, tx);
        tracker.sent(9);
        drop(rx);
        tracker.prune();
        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.abandoned(), 1);

        tracker.acknowledged(9);
        assert_eq!(tracker.abandoned(), 0);
    }

    #[test]
    fn test_resend_of_abandoned_publish_keeps_next_waiter_queued() {
        let mut tracker = AckTracker::new();
        let (first_tx, first_rx) = oneshot::channel();
        tracker.push(QosLevel::AtLeastOnce, first_tx);
        tracker.sent(1);

        // The first caller times out before the broker answers
        drop(first_rx);
        tracker.prune();

        let (second_tx, mut second_rx) = oneshot::channel();
        tracker.push(QosLevel::AtLeastOnce, second_tx);

        // pkid 1 is resent after a reconnect, then acknowledged
        tracker.sent(1);
        tracker.acknowledged(1);
        assert!(second_rx.try_recv().is_err());
        assert_eq!(tracker.pending(), 1);
        assert_eq!(tracker.abandoned(), 0);

        tracker.sent(2);
        assert!(second_rx.try_recv().is_err());
        tracker.acknowledged(2);
        assert!(second_rx.try_recv().is_ok());
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn test_options_from_config() {
        let options = mqtt_options(&config("")).unwrap();
        assert_eq!(options.client_id(), "relay-test");
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 1884)
        );
        assert!(options.credentials().is_none());
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let options = mqtt_options(&config("username = \"sensor\"\npassword = \"secret\"")).unwrap();
        assert_eq!(
            options.credentials(),
            Some(("sensor".to_string(), "secret".to_string()))
        );

        let options = mqtt_options(&config("username = \"sensor\"")).unwrap();
        assert!(options.credentials().is_none());
    }

    #[test]
    fn test_publish_without_connect_fails() {
        let mut bus = MqttBus::from_config(&config("")).unwrap();
        let err = bus
            .publish("weatherstation/1/temperature", "20.0", QosLevel::AtLeastOnce)
            .unwrap_err();
        assert!(matches!(err, RelayError::Bus(_)));
        assert!(bus.disconnect().is_ok());
    }
}
