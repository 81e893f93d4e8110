use crate::config::P1Config;
use crate::mqtt::{SinkError, TelegramSink};
use crate::obis_table::{ObisFieldTable, ValueKind};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::TcpStream;

pub mod assembler;
pub mod coercer;
pub mod crc;
pub mod decoder;
pub mod structs;

pub use assembler::FrameAssembler;
pub use decoder::TelegramDecoder;
pub use structs::{DecodedTelegram, Telegram};

#[derive(Error, Debug)]
pub enum P1Error {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),
    #[error("Exceeded iteration limit: {0} iteration(s)")]
    FrameLimitExceeded(usize),
    #[error("CRC check failed, expected {expected:04X} calculated {calculated:04X}")]
    ChecksumMismatch { expected: u16, calculated: u16 },
    #[error("Invalid checksum field `{0}`")]
    InvalidChecksum(String),
    #[error("Can't decode `{value}` as {kind:?}")]
    Decode { value: String, kind: ValueKind },
    #[error("Invalid data line `{0}`")]
    InvalidDataLine(String),
    #[error("No telegram received within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Periodically reads one telegram from a P1 port and hands it to a sink.
pub struct P1Reader<S: TelegramSink> {
    config: P1Config,
    decoder: TelegramDecoder,
    sink: S,
}

impl<S: TelegramSink> P1Reader<S> {
    pub fn new(config: P1Config, table: Arc<ObisFieldTable>, sink: S) -> Self {
        Self {
            config,
            decoder: TelegramDecoder::new(table),
            sink,
        }
    }

    #[cfg(test)]
    fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn start_thread(&self) -> ! {
        info!("Starting P1 reader for {}:{}", self.config.host, self.config.port);
        loop {
            if let Err(e) = self.run_cycle().await {
                error!("Unable to read data from {}: {}", self.config.host, e);
            }
        }
    }

    /// One read, paced so it takes at least the configured interval.
    pub async fn run_cycle(&self) -> Result<(), P1Error> {
        info!("Read P1 reader");
        let work = async {
            let telegram = self.read_guarded().await?;
            self.sink.publish(&telegram).await?;
            Ok::<(), P1Error>(())
        };

        let (_, result) = tokio::join!(tokio::time::sleep(self.config.interval()), work);
        result
    }

    async fn read_guarded(&self) -> Result<DecodedTelegram, P1Error> {
        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, self.read_telegram()).await {
            Ok(result) => result,
            Err(_) => Err(P1Error::Timeout(timeout)),
        }
    }

    /* The stream lives inside this future, a timeout drops and closes it too */
    async fn read_telegram(&self) -> Result<DecodedTelegram, P1Error> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        debug!("Connected to {}:{}", self.config.host, self.config.port);

        let mut reader = BufReader::new(stream);
        let result = self.read_from(&mut reader).await;
        drop(reader);
        debug!("Connection to {} closed", self.config.host);
        result
    }

    /// Assembles, verifies and decodes the next telegram of `reader`.
    pub async fn read_from<R>(&self, reader: &mut R) -> Result<DecodedTelegram, P1Error>
    where
        R: AsyncBufRead + Unpin,
    {
        let (telegram, iterations) = assembler::read_frame(reader, self.config.reset_limit).await?;

        match crc::verify_crc(&telegram, self.config.allow_missing_checksum)? {
            Some(crc) => info!("CRC verified ({:#x}) after {} iteration(s)", crc, iterations),
            None => warn!("Telegram carries no CRC, accepted unverified"),
        }

        self.decoder.decode(&telegram)
    }
}
