//! Format decoded records for display (the `ipfix_dump` text output).
//! Timestamps render as UTC, counters carry their units, lists nest.

use crate::list::{BasicList, SubTemplateList, SubTemplateMultiList};
use crate::model::{DataType, InfoElement, Units};
use crate::record::Record;
use crate::value::{format_mac, Value};
use chrono::{DateTime, Utc};

/// Seconds between the NTP era (1900) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// Format an IPFIX timestamp as `YYYY-MM-DD HH:MM:SS[.fraction]` UTC; `None`
/// for non-temporal types or out-of-range values.
pub fn format_timestamp(dt: DataType, raw: u64) -> Option<String> {
    let (secs, nanos, pattern) = match dt {
        DataType::DateTimeSeconds => (raw, 0, "%Y-%m-%d %H:%M:%S"),
        DataType::DateTimeMilliseconds => (
            raw / 1000,
            (raw % 1000) as u32 * 1_000_000,
            "%Y-%m-%d %H:%M:%S%.3f",
        ),
        DataType::DateTimeMicroseconds | DataType::DateTimeNanoseconds => {
            // NTP layout: seconds since 1900 in the high word, fraction in the low word
            let nanos = (((raw & 0xffff_ffff) * 1_000_000_000) >> 32) as u32;
            let pattern = if dt == DataType::DateTimeMicroseconds {
                "%Y-%m-%d %H:%M:%S%.6f"
            } else {
                "%Y-%m-%d %H:%M:%S%.9f"
            };
            ((raw >> 32).saturating_sub(NTP_UNIX_OFFSET), nanos, pattern)
        }
        _ => return None,
    };
    let at = DateTime::<Utc>::from_timestamp(i64::try_from(secs).ok()?, nanos)?;
    Some(at.format(pattern).to_string())
}

/// Raw scalar string (no units).
pub fn format_scalar_raw(v: &Value) -> String {
    match v {
        Value::U8(x) => x.to_string(),
        Value::U16(x) => x.to_string(),
        Value::U32(x) => x.to_string(),
        Value::U64(x) => x.to_string(),
        Value::I8(x) => x.to_string(),
        Value::I16(x) => x.to_string(),
        Value::I32(x) => x.to_string(),
        Value::I64(x) => x.to_string(),
        Value::Bool(x) => x.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Double(x) => x.to_string(),
        Value::Ipv4(a) => a.to_string(),
        Value::Ipv6(a) => a.to_string(),
        Value::Mac(m) => format_mac(m),
        Value::String(s) => format!("{:?}", s),
        Value::Bytes(b) if b.is_empty() => "<empty>".to_string(),
        Value::Bytes(b) => format!("hex({})", hex_string(b)),
        _ => format!("{:?}", v),
    }
}

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// A scalar of `ie`, with its timestamp or units rendering.
pub fn format_scalar(ie: &InfoElement, v: &Value) -> String {
    if let Some(raw) = v.as_u64() {
        if let Some(ts) = format_timestamp(ie.data_type, raw) {
            return ts;
        }
    }
    let raw = format_scalar_raw(v);
    if ie.units == Units::None || !(ie.data_type.is_integral() || ie.data_type.is_float()) {
        raw
    } else {
        format!("{} {}", raw, ie.units.name())
    }
}

fn basic_list_to_dump(bl: &BasicList, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let Some(ie) = bl.element() else {
        return format!("{}[]", pad);
    };
    if bl.is_empty() {
        return format!("{}{}[] ({})", pad, ie.name, bl.semantic().name());
    }
    let mut lines = vec![format!("{}{}[{}] ({}) [", pad, ie.name, bl.len(), bl.semantic().name())];
    for (i, item) in bl.iter().enumerate() {
        lines.push(format!("{}  [{}] {}", pad, i, format_scalar(ie, item)));
    }
    lines.push(format!("{}]", pad));
    lines.join("\n")
}

fn records_to_dump(template_id: u16, records: &[Record], indent: usize) -> Vec<String> {
    let pad = "  ".repeat(indent);
    let mut lines = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        lines.push(format!("{}[{}] template {} {{", pad, i, template_id));
        lines.push(record_to_dump(rec, indent + 1));
        lines.push(format!("{}}}", pad));
    }
    lines
}

fn sub_template_list_to_dump(stl: &SubTemplateList, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    if stl.is_empty() {
        return format!("{}template {} [] ({})", pad, stl.template_id(), stl.semantic().name());
    }
    let mut lines = vec![format!("{}({}) [", pad, stl.semantic().name())];
    lines.extend(records_to_dump(stl.template_id(), stl.records(), indent + 1));
    lines.push(format!("{}]", pad));
    lines.join("\n")
}

fn sub_template_multi_list_to_dump(stml: &SubTemplateMultiList, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    if stml.is_empty() {
        return format!("{}[] ({})", pad, stml.semantic().name());
    }
    let mut lines = vec![format!("{}({}) [", pad, stml.semantic().name())];
    for entry in stml.iter() {
        lines.extend(records_to_dump(entry.template_id(), entry.records(), indent + 1));
    }
    lines.push(format!("{}]", pad));
    lines.join("\n")
}

/// Multi-line rendering of every field of `rec`, nested lists indented.
pub fn record_to_dump(rec: &Record, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let mut lines = Vec::with_capacity(rec.len());
    for (f, (key, v)) in rec.fields().iter().zip(rec.iter()) {
        let text = match &v {
            Value::BasicList(bl) => format!("\n{}", basic_list_to_dump(bl, indent + 1)),
            Value::SubTemplateList(stl) => {
                format!("\n{}", sub_template_list_to_dump(stl, indent + 1))
            }
            Value::SubTemplateMultiList(stml) => {
                format!("\n{}", sub_template_multi_list_to_dump(stml, indent + 1))
            }
            scalar => format!(" {}", format_scalar(&f.ie, scalar)),
        };
        if key.index == 0 {
            lines.push(format!("{}{}:{}", pad, key.name, text));
        } else {
            lines.push(format!("{}{}[{}]:{}", pad, key.name, key.index, text));
        }
    }
    lines.join("\n")
}

/// One line per record: `name=value` pairs, lists summarized by length.
pub fn record_summary_line(rec: &Record) -> String {
    rec.fields()
        .iter()
        .zip(rec.iter())
        .map(|(f, (key, v))| {
            let text = match &v {
                Value::BasicList(bl) => format!("<{} items>", bl.len()),
                Value::SubTemplateList(stl) => format!("<{} records>", stl.len()),
                Value::SubTemplateMultiList(stml) => format!("<{} groups>", stml.len()),
                scalar => format_scalar(&f.ie, scalar),
            };
            format!("{}={}", key, text)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(
            format_timestamp(DataType::DateTimeSeconds, 0).as_deref(),
            Some("1970-01-01 00:00:00")
        );
        assert_eq!(
            format_timestamp(DataType::DateTimeMilliseconds, 1_700_000_000_123).as_deref(),
            Some("2023-11-14 22:13:20.123")
        );
        assert_eq!(format_timestamp(DataType::Unsigned64, 5), None);
    }

    #[test]
    fn ntp_timestamps_keep_their_precision() {
        let secs = (NTP_UNIX_OFFSET + 1) << 32;
        assert_eq!(
            format_timestamp(DataType::DateTimeMicroseconds, secs | 0x8000_0000).as_deref(),
            Some("1970-01-01 00:00:01.500000")
        );
        // 5 / 2^32 s rounds down to one nanosecond
        assert_eq!(
            format_timestamp(DataType::DateTimeNanoseconds, secs | 5).as_deref(),
            Some("1970-01-01 00:00:01.000000001")
        );
    }

    #[test]
    fn scalars_carry_units() {
        let ie = InfoElement::new("octetTotalCount", 0, 85)
            .data_type(DataType::Unsigned64)
            .units(Units::Octets);
        assert_eq!(format_scalar(&ie, &Value::U64(1500)), "1500 octets");
        assert_eq!(format_scalar_raw(&Value::Bytes(vec![1, 0xab])), "hex(01 ab)");
    }
}
