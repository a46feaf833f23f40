use crate::domain::MessageHandler;
use anyhow::{anyhow, Result};
use common::domain::RawMessage;
use common::RetryPolicy;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

/// Capacity of the request channel between the client handle and the event loop
const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Broker connection settings for the ingestion subscriber
#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `tcp`/`mqtt` for plain connections, `ssl`/`tls`/`mqtts` for TLS
    pub protocol: String,
    /// Topic filter to subscribe to, wildcards allowed
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Largest packet accepted from or sent to the broker, in bytes
    pub max_packet_size: usize,
    pub retry_policy: RetryPolicy,
}

enum SessionEnd {
    Cancelled,
    Failed { connected: bool, error: anyhow::Error },
}

/// Run the MQTT subscriber until cancelled.
///
/// Every publish is handed to `handler` on its own task. Connection errors are
/// retried with the configured backoff; the attempt count starts over after a
/// session that got as far as ConnAck. Returns an error once retries run out.
///
/// Messages still being handled when the subscriber stops are awaited before
/// it returns, so nothing in flight outlives the store it writes to.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(host = %config.host, port = config.port, topic = %config.topic)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    handler: Arc<dyn MessageHandler>,
    token: CancellationToken,
) -> Result<()> {
    serve(config, handler, token, TaskTracker::new()).await
}

async fn serve(
    config: MqttSubscriberConfig,
    handler: Arc<dyn MessageHandler>,
    token: CancellationToken,
    in_flight: TaskTracker,
) -> Result<()> {
    let result = run_sessions(&config, handler, &token, &in_flight).await;

    in_flight.close();
    if !in_flight.is_empty() {
        info!(in_flight = in_flight.len(), "waiting for in-flight messages");
    }
    in_flight.wait().await;

    result
}

async fn run_sessions(
    config: &MqttSubscriberConfig,
    handler: Arc<dyn MessageHandler>,
    token: &CancellationToken,
    in_flight: &TaskTracker,
) -> Result<()> {
    let transport = parse_transport(&config.protocol)?;

    info!(
        host = %config.host,
        port = config.port,
        protocol = %config.protocol,
        topic = %config.topic,
        "starting MQTT subscriber"
    );

    let mut failed_attempts = 0u32;

    loop {
        if token.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break;
        }

        let options = build_mqtt_options(config, transport.clone());

        match run_mqtt_session(options, &config.topic, token, Arc::clone(&handler), in_flight).await {
            SessionEnd::Cancelled => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            SessionEnd::Failed { connected, error } => {
                error!(error = %error, "MQTT connection error");

                if connected {
                    failed_attempts = 0;
                }
                failed_attempts += 1;

                if config.retry_policy.is_exhausted(failed_attempts) {
                    error!(
                        max_retries = config.retry_policy.max_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(error.context(format!(
                        "MQTT broker {}:{} unreachable after {} attempts",
                        config.host, config.port, failed_attempts
                    )));
                }

                let delay = config.retry_policy.delay_for_attempt(failed_attempts);
                warn!(
                    attempt = failed_attempts,
                    max_attempts = config.retry_policy.max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// Run a single connection session until cancellation or an event loop error
async fn run_mqtt_session(
    options: MqttOptions,
    topic: &str,
    token: &CancellationToken,
    handler: Arc<dyn MessageHandler>,
    in_flight: &TaskTracker,
) -> SessionEnd {
    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

    // Queued now, sent by the event loop right after the connection is up
    if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
        return SessionEnd::Failed {
            connected: false,
            error: anyhow!("failed to queue subscription: {}", e),
        };
    }

    let mut connected = false;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return SessionEnd::Cancelled;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = RawMessage::new(publish.topic, publish.payload.to_vec());
                        in_flight.spawn(handle_mqtt_message(Arc::clone(&handler), message));
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected = true;
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %topic, "subscribed to MQTT topic");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return SessionEnd::Failed {
                            connected,
                            error: anyhow!("MQTT event loop error: {}", e),
                        };
                    }
                }
            }
        }
    }
}

/// Handle one incoming message in its own trace
pub(crate) async fn handle_mqtt_message(handler: Arc<dyn MessageHandler>, message: RawMessage) {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %message.topic,
        payload_size = message.payload.len(),
    );

    async move {
        debug!(payload = %message.payload_text(), "received MQTT message");
        handler.handle_message(message).await;
    }
    .instrument(span)
    .await
}

pub fn parse_transport(protocol: &str) -> Result<Transport> {
    match protocol.trim().to_ascii_lowercase().as_str() {
        "" | "tcp" | "mqtt" => Ok(Transport::Tcp),
        "ssl" | "tls" | "mqtts" => Ok(Transport::tls_with_default_config()),
        other => Err(anyhow!(
            "unsupported MQTT protocol '{}', expected one of tcp, mqtt, ssl, tls, mqtts",
            other
        )),
    }
}

pub fn build_mqtt_options(config: &MqttSubscriberConfig, transport: Transport) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_max_packet_size(config.max_packet_size, config.max_packet_size);
    options.set_clean_session(true);
    options.set_transport(transport);
    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }
    options
}
