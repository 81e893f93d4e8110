//! P1 port reader publishing smart meter telegrams to MQTT
//!
//! Telegrams are read from a P1 port exposed over TCP, checked against their
//! CRC, decoded with an OBIS field table and published as JSON.

pub mod config;
pub mod mqtt;
pub mod obis_table;
pub mod p1;

// Re-export common types for easier access
pub use config::Config;
pub use mqtt::{MqttSink, SinkError, TelegramSink};
pub use obis_table::{ObisFieldSpec, ObisFieldTable, ValueKind};
pub use p1::{DecodedTelegram, P1Error, P1Reader, Telegram};
