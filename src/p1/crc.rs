use super::{structs::Telegram, P1Error};
use crc16::{State, ARC};

/// CRC16 as used by DSMR: reflected polynomial 0xA001, initial value 0
pub fn crc16(data: &[u8]) -> u16 {
    State::<ARC>::calculate(data)
}

/// CRC over every byte in front of the terminator plus the `!` itself
pub fn calculate_crc(telegram: &Telegram) -> u16 {
    let mut state = State::<ARC>::new();
    for line in telegram.body() {
        state.update(line);
    }
    state.update(b"!");
    state.get()
}

/// Reads the checksum following `!`, `None` if the terminator carries none.
pub fn expected_crc(telegram: &Telegram) -> Result<Option<u16>, P1Error> {
    let terminator = telegram
        .terminator()
        .ok_or_else(|| P1Error::InvalidChecksum("telegram has no terminator".to_string()))?;

    let text = String::from_utf8_lossy(&terminator[1..]);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    u16::from_str_radix(text, 16)
        .map(Some)
        .map_err(|_| P1Error::InvalidChecksum(text.to_string()))
}

/// Checks the telegram, returning the verified checksum.
///
/// A terminator without checksum is only accepted with `allow_missing`, the
/// result is `None` then.
pub fn verify_crc(telegram: &Telegram, allow_missing: bool) -> Result<Option<u16>, P1Error> {
    let expected = match expected_crc(telegram)? {
        Some(crc) => crc,
        None if allow_missing => return Ok(None),
        None => return Err(P1Error::InvalidChecksum(String::new())),
    };

    let calculated = calculate_crc(telegram);
    if calculated != expected {
        return Err(P1Error::ChecksumMismatch { expected, calculated });
    }
    Ok(Some(calculated))
}
