use super::P1Error;
use crate::obis_table::ValueKind;
use chrono::{Local, LocalResult, NaiveDateTime, TimeZone};
use serde_json::{Number, Value};

/// Cuts the `*unit` annotation off a raw value group
pub fn strip_unit(raw: &str) -> &str {
    match raw.split_once('*') {
        Some((value, _)) => value,
        None => raw,
    }
}

/* Units like kWh or kW are published in their base unit */
fn is_kilo(unit: Option<&str>) -> bool {
    unit.is_some_and(|u| u.starts_with('k'))
}

fn decode_error(raw: &str, kind: ValueKind) -> P1Error {
    P1Error::Decode { value: raw.to_string(), kind }
}

/// Converts a raw value into the kind declared for its field, using local time
/// for timestamps.
pub fn coerce_value(raw: &str, kind: ValueKind, unit: Option<&str>) -> Result<Value, P1Error> {
    coerce_value_in(raw, kind, unit, &Local)
}

pub fn coerce_value_in<Tz: TimeZone>(
    raw: &str,
    kind: ValueKind,
    unit: Option<&str>,
    tz: &Tz,
) -> Result<Value, P1Error> {
    let factor = if is_kilo(unit) { 1000 } else { 1 };

    match kind {
        ValueKind::Float => {
            let value = raw.trim().parse::<f64>().map_err(|_| decode_error(raw, kind))?;
            Number::from_f64(value * factor as f64)
                .map(Value::Number)
                .ok_or_else(|| decode_error(raw, kind))
        }
        ValueKind::Int => {
            let value = raw.trim().parse::<i64>().map_err(|_| decode_error(raw, kind))?;
            value
                .checked_mul(factor)
                .map(Value::from)
                .ok_or_else(|| decode_error(raw, kind))
        }
        ValueKind::Timestamp => parse_timestamp(raw, tz).map(Value::from),
        ValueKind::String => Ok(Value::String(decode_hex_text(raw))),
        ValueKind::Unknown => Ok(Value::String(raw.to_string())),
    }
}

/// Parses `YYMMDDhhmmssX` into epoch seconds.
///
/// `X` marks summer (`S`) or winter (`W`) time and only matters for the hour
/// that exists twice when the clocks go back.
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<i64, P1Error> {
    let error = || decode_error(raw, ValueKind::Timestamp);

    let digits = raw.get(..12).ok_or_else(error)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(error());
    }
    let summer = raw[12..].starts_with('S');

    let naive = NaiveDateTime::parse_from_str(&format!("20{digits}"), "%Y%m%d%H%M%S")
        .map_err(|_| error())?;

    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(dst, standard) => if summer { dst } else { standard },
        LocalResult::None => return Err(error()),
    };
    Ok(local.timestamp())
}

/// Hex encoded text as sent for equipment ids and messages, anything else is
/// returned as is.
pub fn decode_hex_text(raw: &str) -> String {
    hex::decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeDelta, Utc};
    use serde_json::json;

    #[test]
    fn test_strip_unit() {
        assert_eq!(strip_unit("000123.456*kWh"), "000123.456");
        assert_eq!(strip_unit("00012.345*m3"), "00012.345");
        assert_eq!(strip_unit("0002"), "0002");
    }

    #[test]
    fn test_float_with_kilo_unit_is_scaled() {
        let v = coerce_value(strip_unit("000123.456*kWh"), ValueKind::Float, Some("kWh")).unwrap();
        assert_eq!(v, json!(123456.0));
        assert_eq!(v.to_string(), "123456.0");
    }

    #[test]
    fn test_numbers_without_kilo_unit() {
        assert_eq!(coerce_value("230.1", ValueKind::Float, Some("V")).unwrap(), json!(230.1));
        assert_eq!(coerce_value("00012.345", ValueKind::Float, Some("m3")).unwrap(), json!(12.345));
        assert_eq!(coerce_value("0002", ValueKind::Int, None).unwrap(), json!(2));
        assert_eq!(coerce_value("-5", ValueKind::Int, Some("A")).unwrap(), json!(-5));
    }

    #[test]
    fn test_int_with_kilo_unit() {
        assert_eq!(coerce_value("0012", ValueKind::Int, Some("kW")).unwrap(), json!(12000));
        assert!(matches!(
            coerce_value("9223372036854775807", ValueKind::Int, Some("kW")),
            Err(P1Error::Decode { kind: ValueKind::Int, .. })
        ));
    }

    #[test]
    fn test_kilo_scaling_only_for_numbers() {
        assert_eq!(coerce_value("abc", ValueKind::Unknown, Some("kWh")).unwrap(), json!("abc"));
        assert_eq!(coerce_value("12", ValueKind::String, Some("kWh")).unwrap(), json!("\u{12}"));
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(matches!(
            coerce_value("12,5", ValueKind::Float, None),
            Err(P1Error::Decode { kind: ValueKind::Float, .. })
        ));
        assert!(coerce_value("1.5", ValueKind::Int, None).is_err());
        assert!(coerce_value("NaN", ValueKind::Float, None).is_err());
    }

    #[test]
    fn test_timestamp() {
        /* 2023-01-01 12:00:00 UTC */
        assert_eq!(parse_timestamp("230101120000W", &Utc).unwrap(), 1672574400);
        assert_eq!(
            coerce_value_in("230101120000W", ValueKind::Timestamp, None, &Utc).unwrap(),
            json!(1672574400)
        );

        let cet = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(parse_timestamp("230101130000W", &cet).unwrap(), 1672574400);

        /* the flag is optional */
        assert_eq!(parse_timestamp("230101120000", &Utc).unwrap(), 1672574400);
    }

    /* Central European time for 2023: CEST from 03-26 01:00 UTC until 10-29 01:00 UTC */
    #[derive(Clone, Debug)]
    struct Cet2023;

    impl Cet2023 {
        fn offset_at(utc: &NaiveDateTime) -> FixedOffset {
            let ts = utc.and_utc().timestamp();
            let hours = if (1679792400..1698541200).contains(&ts) { 2 } else { 1 };
            FixedOffset::east_opt(hours * 3600).unwrap()
        }
    }

    impl TimeZone for Cet2023 {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            Cet2023
        }

        fn offset_from_local_date(&self, _: &NaiveDate) -> LocalResult<FixedOffset> {
            LocalResult::Single(FixedOffset::east_opt(3600).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let valid: Vec<FixedOffset> = [7200, 3600]
                .into_iter()
                .map(|secs| FixedOffset::east_opt(secs).unwrap())
                .filter(|off| {
                    let utc = *local - TimeDelta::seconds(off.local_minus_utc() as i64);
                    Self::offset_at(&utc) == *off
                })
                .collect();
            match valid[..] {
                [summer, winter] => LocalResult::Ambiguous(summer, winter),
                [single] => LocalResult::Single(single),
                _ => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            Self::offset_at(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            Self::offset_at(utc)
        }
    }

    #[test]
    fn test_timestamp_around_dst_changes() {
        /* 02:30 happens twice on 2023-10-29, first in CEST then in CET */
        let summer = parse_timestamp("231029023000S", &Cet2023).unwrap();
        let winter = parse_timestamp("231029023000W", &Cet2023).unwrap();
        assert_eq!(summer, 1698539400);
        assert_eq!(winter, 1698543000);
        assert_eq!(winter - summer, 3600);

        /* 02:30 never happens on 2023-03-26 */
        assert!(matches!(
            parse_timestamp("230326023000W", &Cet2023),
            Err(P1Error::Decode { kind: ValueKind::Timestamp, .. })
        ));

        /* outside the transitions the flag changes nothing */
        assert_eq!(parse_timestamp("230701120000S", &Cet2023).unwrap(), 1688205600);
        assert_eq!(parse_timestamp("230701120000W", &Cet2023).unwrap(), 1688205600);
    }

    #[test]
    fn test_invalid_timestamps() {
        for raw in ["2301011200", "23010112000AW", "231301120000W", "230101250000S", ""] {
            assert!(
                matches!(parse_timestamp(raw, &Utc), Err(P1Error::Decode { kind: ValueKind::Timestamp, .. })),
                "{raw} was accepted"
            );
        }
    }

    #[test]
    fn test_hex_strings() {
        assert_eq!(decode_hex_text("4530303330303433"), "E0030043");
        /* odd length */
        assert_eq!(decode_hex_text("453"), "453");
        /* not hex */
        assert_eq!(decode_hex_text("XYZW"), "XYZW");
        /* not utf-8 */
        assert_eq!(decode_hex_text("FFFE"), "FFFE");
        assert_eq!(decode_hex_text(""), "");
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(coerce_value("50", ValueKind::Unknown, None).unwrap(), json!("50"));
    }
}
