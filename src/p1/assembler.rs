use super::{structs::Telegram, P1Error};
use log::{debug, trace};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

enum AssemblerState {
    Idle,
    Accumulating(Telegram),
}

/// Collects lines into telegrams.
///
/// A `/` line always starts over, dropping whatever was collected so far. Every
/// restart counts against `limit` so a stream that never delivers a terminator
/// cannot keep us busy forever.
pub struct FrameAssembler {
    state: AssemblerState,
    resets: usize,
    limit: usize,
}

impl FrameAssembler {
    pub fn new(limit: usize) -> Self {
        FrameAssembler {
            state: AssemblerState::Idle,
            resets: 0,
            limit,
        }
    }

    /// Number of telegram starts seen so far
    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, AssemblerState::Idle)
    }

    /// Feeds one line, returning the telegram once its terminator arrived.
    pub fn push_line(&mut self, line: Vec<u8>) -> Result<Option<Telegram>, P1Error> {
        if line.starts_with(b"/") {
            self.resets += 1;
            if self.resets > self.limit {
                self.state = AssemblerState::Idle;
                return Err(P1Error::FrameLimitExceeded(self.limit));
            }
            debug!("New telegram");
            self.state = AssemblerState::Accumulating(Telegram::new());
        }

        let AssemblerState::Accumulating(telegram) = &mut self.state else {
            trace!("Dropping line outside of a telegram");
            return Ok(None);
        };

        let complete = line.starts_with(b"!");
        telegram.push_line(line);
        if !complete {
            return Ok(None);
        }

        match std::mem::replace(&mut self.state, AssemblerState::Idle) {
            AssemblerState::Accumulating(telegram) => Ok(Some(telegram)),
            AssemblerState::Idle => Ok(None),
        }
    }
}

/// Splits a buffer into lines and assembles the first complete telegram in it.
pub fn assemble_bytes(data: &[u8], limit: usize) -> Result<Option<Telegram>, P1Error> {
    let mut assembler = FrameAssembler::new(limit);
    for line in data.split_inclusive(|b| *b == b'\n') {
        if let Some(telegram) = assembler.push_line(line.to_vec())? {
            return Ok(Some(telegram));
        }
    }
    Ok(None)
}

/// Reads lines until a telegram is complete.
///
/// Returns the telegram together with the number of starts it took.
pub async fn read_frame<R>(reader: &mut R, limit: usize) -> Result<(Telegram, usize), P1Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut assembler = FrameAssembler::new(limit);
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(P1Error::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed before the telegram was complete",
            )));
        }
        debug!("{:?}", String::from_utf8_lossy(&line));

        if let Some(telegram) = assembler.push_line(line)? {
            return Ok((telegram, assembler.resets()));
        }
    }
}
