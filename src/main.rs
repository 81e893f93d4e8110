use p12mqtt::{Config, MqttSink, ObisFieldTable, P1Reader};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Unable to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging, RUST_LOG still wins over the configured level
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(config.log_level.clone()));

    let table = match ObisFieldTable::load(config.obis_table.as_deref()) {
        Ok(t) => t,
        Err(e) => {
            error!("Unable to load OBIS field table: {e}");
            std::process::exit(1);
        }
    };
    info!("Loaded {} OBIS field definitions", table.len());

    let (sink, mqtt) = MqttSink::new(&config.mqtt);
    let reader = P1Reader::new(config.p1.clone(), Arc::new(table), sink);

    tokio::select! {
        _ = async { reader.start_thread().await; } => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, exiting");
        }
    }

    mqtt.abort();
}
