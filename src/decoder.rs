use crate::drivers::EngineError;
use crate::types::{RawSample, SampleValue};

/// Line the DPV firmware sends when it finishes before the expected count.
pub const END_MARKER: &str = "END";

/// Split a `;`-separated device line into a sample.
///
/// The leading field is the tag (index, time or frequency) and must be finite.
/// The remaining fields may carry the `inf` sentinel.
pub fn decode_line(line: &str, seq: usize, min_fields: usize) -> Result<RawSample, EngineError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(EngineError::malformed(line, "empty line"));
    }
    let fields: Vec<&str> = trimmed.split(';').map(str::trim).collect();
    if fields.len() < min_fields.max(2) {
        return Err(EngineError::malformed(
            line,
            format!("expected at least {} fields, got {}", min_fields.max(2), fields.len()),
        ));
    }

    let tag = match parse_field(fields[0]) {
        Some(SampleValue::Finite(v)) => v,
        Some(SampleValue::Infinite) => {
            return Err(EngineError::malformed(line, "leading field is infinite"))
        }
        None => return Err(EngineError::malformed(line, "leading field is not numeric")),
    };

    let values = fields[1..]
        .iter()
        .map(|f| {
            parse_field(f)
                .ok_or_else(|| EngineError::malformed(line, format!("{f:?} is not numeric")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawSample { seq, tag, values })
}

fn parse_field(field: &str) -> Option<SampleValue> {
    let unsigned = field.strip_prefix('+').unwrap_or(field);
    if unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity") {
        return Some(SampleValue::Infinite);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(SampleValue::Finite(v)),
        Ok(v) if v.is_infinite() => Some(SampleValue::Infinite),
        _ => None,
    }
}

pub fn is_end_marker(line: &str) -> bool {
    line.trim() == END_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_index_and_value() {
        let s = decode_line("12;-3.25\r\n", 4, 2).unwrap();
        assert_eq!(s.seq, 4);
        assert_eq!(s.tag, 12.0);
        assert_eq!(s.values, vec![SampleValue::Finite(-3.25)]);
        assert_eq!(s.index_tag(), Some(12));
    }

    #[test]
    fn inf_is_a_sentinel_in_either_case() {
        let s = decode_line("1000;inf;INF", 0, 3).unwrap();
        assert_eq!(s.values, vec![SampleValue::Infinite, SampleValue::Infinite]);
    }

    #[test]
    fn rejects_short_and_non_numeric_lines() {
        assert!(matches!(
            decode_line("1000;12.0", 0, 3),
            Err(EngineError::MalformedSample { .. })
        ));
        assert!(decode_line("abc;1.0", 0, 2).is_err());
        assert!(decode_line("1;nan", 0, 2).is_err());
        assert!(decode_line("1;x", 0, 2).is_err());
        assert!(decode_line("inf;1", 0, 2).is_err());
        assert!(decode_line("   ", 0, 2).is_err());
        assert!(decode_line("42", 0, 1).is_err());
    }

    #[test]
    fn end_marker_is_exact() {
        assert!(is_end_marker("END\r\n"));
        assert!(!is_end_marker("END;1"));
    }
}
