use crate::config::MqttConfig;
use crate::p1::DecodedTelegram;
use log::{debug, error, info};
use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Packet, QoS};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Unable to serialize telegram: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Unable to publish telegram: {0}")]
    Publish(#[from] ClientError),
}

/// Destination for decoded telegrams
pub trait TelegramSink: Send + Sync {
    fn publish(&self, telegram: &DecodedTelegram) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Publishes every telegram as a retained JSON document on one topic
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl MqttSink {
    /// Connects to the broker, the returned task drives the MQTT event loop.
    pub fn new(config: &MqttConfig) -> (Self, JoinHandle<()>) {
        info!("MQTT connection starting up");
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 10);
        let handle = tokio::spawn(run_event_loop(eventloop));

        return (Self::from_client(client, config.topic.clone()), handle);
    }

    pub fn from_client(client: AsyncClient, topic: String) -> Self {
        MqttSink { client, topic }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl TelegramSink for MqttSink {
    async fn publish(&self, telegram: &DecodedTelegram) -> Result<(), SinkError> {
        let payload = telegram.to_json()?;
        debug!("Publishing {} values to {}", telegram.len(), self.topic);

        /* never wait for the event loop, a full queue while the broker is away is an error */
        match self.client.try_publish(self.topic.clone(), QoS::AtLeastOnce, true, payload) {
            Ok(_) => {
                info!("Telegram published on MQTT");
                Ok(())
            }
            Err(e) => {
                error!("Telegram not published: {e}");
                Err(e.into())
            }
        }
    }
}

async fn run_event_loop(mut eventloop: EventLoop) {
    info!("MQTT Eventloop started");
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                /* the next poll reconnects, don't hammer the broker */
                error!("Error in MQTT {:?}, reconnecting", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
