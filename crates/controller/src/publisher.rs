use anyhow::{Context, Result};
use chrono::Utc;
use link::ModulePosition;
use rumqttc::{Client, ConnectionError, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

/// Binary detection flag carried in every outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    Detected,
    Clear,
}

impl DetectionStatus {
    pub fn flag(self) -> u8 {
        match self {
            DetectionStatus::Detected => 1,
            DetectionStatus::Clear => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionStatus::Detected => "detected",
            DetectionStatus::Clear => "clear",
        }
    }
}

/// Transport connectivity change, polled synchronously by the main loop
/// instead of being delivered from the connection thread as a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Connected,
    Failed(i32),
}

// Connectivity slot codes written by the connection thread.
const CONN_NONE: i32 = 0;
const CONN_UP: i32 = 1;
const CONN_ERR_IO: i32 = -1;
const CONN_ERR_TIMEOUT: i32 = -2;
const CONN_ERR_OTHER: i32 = -3;

/// Wire payload for one module: `(<module_id>,<lat>,<lon>,<flag>)`.
pub fn format_payload(position: &ModulePosition, status: DetectionStatus) -> String {
    format!(
        "({},{},{},{})",
        position.module_id,
        position.latitude,
        position.longitude,
        status.flag()
    )
}

/// JSON summary document published alongside the per-module payloads.
#[derive(Debug, Serialize)]
struct StatusSummary<'a> {
    timestamp: String,
    status: &'a str,
    modules: usize,
}

/// Publish gateway over MQTT.
///
/// The rumqttc connection is driven by a background thread with jittered
/// exponential reconnect backoff; the main loop never blocks on the
/// transport. Publishing enqueues into the client's channel and returns.
pub struct MqttPublisher {
    client: Client,
    topic: String,
    connected: Arc<AtomicBool>,
    conn_event: Arc<AtomicI32>,
}

impl MqttPublisher {
    pub fn new(broker_host: &str, broker_port: u16, topic: String) -> Result<Self> {
        let mut mqtt_options = MqttOptions::new("firewatch-controller", broker_host, broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut connection) = Client::new(mqtt_options, 10);
        let connected = Arc::new(AtomicBool::new(false));
        let conn_event = Arc::new(AtomicI32::new(CONN_NONE));
        let connected_clone = Arc::clone(&connected);
        let event_clone = Arc::clone(&conn_event);

        std::thread::spawn(move || {
            let mut reconnect_attempts = 0u32;

            loop {
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected_clone.store(true, Ordering::Release);
                            event_clone.store(CONN_UP, Ordering::Release);
                            reconnect_attempts = 0;
                        }
                        Ok(Event::Incoming(Packet::PingResp)) => {
                            tracing::trace!("MQTT ping response received");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            connected_clone.store(false, Ordering::Release);
                            let code = match &e {
                                ConnectionError::Io(_) => CONN_ERR_IO,
                                ConnectionError::NetworkTimeout => CONN_ERR_TIMEOUT,
                                _ => CONN_ERR_OTHER,
                            };
                            event_clone.store(code, Ordering::Release);

                            reconnect_attempts = reconnect_attempts.saturating_add(1);
                            let backoff = calculate_backoff(reconnect_attempts);
                            tracing::warn!(
                                error = %e,
                                attempt = reconnect_attempts,
                                backoff_ms = backoff.as_millis(),
                                "MQTT connection lost, reconnecting"
                            );
                            std::thread::sleep(backoff);
                        }
                    }
                }

                // Connection iterator ended - happens on disconnect.
                // rumqttc reconnects when we iterate again.
                connected_clone.store(false, Ordering::Release);
                reconnect_attempts = reconnect_attempts.saturating_add(1);
                let backoff = calculate_backoff(reconnect_attempts);
                tracing::warn!(
                    attempt = reconnect_attempts,
                    backoff_ms = backoff.as_millis(),
                    "MQTT connection closed, attempting reconnect"
                );
                std::thread::sleep(backoff);
            }
        });

        tracing::info!(
            broker = %format!("{}:{}", broker_host, broker_port),
            topic = %topic,
            "MQTT publisher initialized"
        );

        Ok(Self {
            client,
            topic,
            connected,
            conn_event,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Drain the connectivity slot written by the connection thread.
    ///
    /// Returns at most one event per call; `None` when nothing changed
    /// since the last poll.
    pub fn poll_connectivity(&self) -> Option<ConnectivityEvent> {
        match self.conn_event.swap(CONN_NONE, Ordering::AcqRel) {
            CONN_NONE => None,
            CONN_UP => Some(ConnectivityEvent::Connected),
            code => Some(ConnectivityEvent::Failed(code)),
        }
    }

    /// Send one status message per known module position, plus a JSON
    /// summary document.
    ///
    /// An empty position list is a warn-level no-op, never an error.
    /// Returns the number of module messages enqueued.
    pub fn publish_status(
        &self,
        status: DetectionStatus,
        positions: &[ModulePosition],
    ) -> Result<usize> {
        if positions.is_empty() {
            tracing::warn!("No module positions known, skipping status publish");
            return Ok(0);
        }

        for position in positions {
            let payload = format_payload(position, status);
            self.client
                .publish(&self.topic, QoS::AtLeastOnce, false, payload.as_bytes())
                .with_context(|| {
                    format!("Failed to publish status for {}", position.module_id)
                })?;
            tracing::debug!(
                module = %position.module_id,
                payload = %payload,
                "Status published"
            );
        }

        let summary = StatusSummary {
            timestamp: Utc::now().to_rfc3339(),
            status: status.as_str(),
            modules: positions.len(),
        };
        let summary_topic = format!("{}/state", self.topic);
        let body =
            serde_json::to_string(&summary).context("Failed to serialize status summary")?;
        self.client
            .publish(&summary_topic, QoS::AtLeastOnce, true, body.as_bytes())
            .context("Failed to publish status summary")?;

        Ok(positions.len())
    }

    /// Ask the transport to disconnect. Errors are logged, not propagated:
    /// shutdown must keep releasing the remaining resources.
    pub fn disconnect(&self) {
        if let Err(e) = self.client.disconnect() {
            tracing::warn!("MQTT disconnect failed: {}", e);
        }
    }
}

/// Exponential backoff with jitter, capped at 30 seconds.
fn calculate_backoff(attempt: u32) -> Duration {
    const BASE_MS: u64 = 100;
    const MAX_MS: u64 = 30_000;

    let exp_backoff = BASE_MS.saturating_mul(2u64.saturating_pow(attempt.min(10)));
    let capped = exp_backoff.min(MAX_MS);

    let jitter = (capped / 10).max(1);
    let jittered = capped.saturating_add(fastrand::u64(0..jitter));

    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(id: &str, lat: &str, lon: &str) -> ModulePosition {
        ModulePosition {
            module_id: id.to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
        }
    }

    #[test]
    fn payload_matches_wire_format() {
        let p = pos("Modulo_A", "-23.5505", "-46.6333");
        assert_eq!(
            format_payload(&p, DetectionStatus::Detected),
            "(Modulo_A,-23.5505,-46.6333,1)"
        );
        assert_eq!(
            format_payload(&p, DetectionStatus::Clear),
            "(Modulo_A,-23.5505,-46.6333,0)"
        );
    }

    #[test]
    fn coordinates_are_republished_verbatim() {
        // Values stay exactly as received, including trailing zeros.
        let p = pos("Modulo_B", "10.500", "020.0");
        assert_eq!(
            format_payload(&p, DetectionStatus::Clear),
            "(Modulo_B,10.500,020.0,0)"
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        let early = calculate_backoff(1);
        let late = calculate_backoff(20);
        assert!(early < late);
        // Cap plus maximum jitter.
        assert!(late <= Duration::from_millis(33_000));
    }
}
