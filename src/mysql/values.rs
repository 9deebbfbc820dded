//! Mapping from MySQL wire values to the pump's neutral scalar type.
//!
//! Temporal values are rendered as text in the formats ClickHouse parses
//! for Date/DateTime columns; everything else passes through as the closest
//! scalar.

use mysql_async::Value;

use crate::reader::SourceValue;

pub(crate) fn from_mysql(value: Value) -> SourceValue {
    match value {
        Value::NULL => SourceValue::Null,
        Value::Bytes(bytes) => SourceValue::Bytes(bytes),
        Value::Int(i) => SourceValue::Int(i),
        Value::UInt(u) => SourceValue::UInt(u),
        Value::Float(f) => SourceValue::Float(f as f64),
        Value::Double(d) => SourceValue::Float(d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            SourceValue::Text(format_date(year, month, day, hour, minute, second, micros))
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            SourceValue::Text(format_time(negative, days, hours, minutes, seconds, micros))
        }
    }
}

fn format_date(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> String {
    if hour == 0 && minute == 0 && second == 0 && micros == 0 {
        format!("{:04}-{:02}-{:02}", year, month, day)
    } else if micros == 0 {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            year, month, day, hour, minute, second, micros
        )
    }
}

fn format_time(negative: bool, days: u32, hours: u8, minutes: u8, seconds: u8, micros: u32) -> String {
    let sign = if negative { "-" } else { "" };
    let total_hours = days * 24 + u32::from(hours);
    if micros == 0 {
        format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds)
    } else {
        format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            sign, total_hours, minutes, seconds, micros
        )
    }
}
