//! Stream events: one timestamped utterance each
//!
//! Wire format (one JSON object per record):
//!
//!   { "t_start": 12.5, "t_end": 14.0, "text": "sats dropping to 85", "speaker": "anesthesia" }
//!
//! `t_start`, `t_end` and `text` are required. Any other keys are kept
//! verbatim in `raw` and never interpreted by the engine.

use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// One timestamped utterance. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamEvent {
    #[serde(rename = "t_start")]
    start_offset: f64,
    #[serde(rename = "t_end")]
    end_offset: f64,
    text: String,
    #[serde(skip)]
    raw: Value,
}

impl StreamEvent {
    /// Build an event from offsets in seconds. Position 0 means "not from a stream".
    pub fn new(start_offset: f64, end_offset: f64, text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let raw = serde_json::json!({
            "t_start": start_offset,
            "t_end": end_offset,
            "text": text,
        });
        Self::validated(0, start_offset, end_offset, text, raw)
    }

    /// Parse one ingestion record. `position` is the record's ordinal (1-based),
    /// reported back in errors.
    pub fn from_json(payload: &Value, position: usize) -> Result<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| Error::malformed(position, "record is not a JSON object"))?;

        let start = read_offset(obj, "t_start", position)?;
        let end = read_offset(obj, "t_end", position)?;
        let text = match obj.get("text") {
            None => return Err(Error::malformed(position, "missing required key 'text'")),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => return Err(Error::malformed(position, "'text' must be a string")),
        };

        Self::validated(position, start, end, text, payload.clone())
    }

    /// Parse one JSONL line.
    pub fn from_json_line(line: &str, position: usize) -> Result<Self> {
        let payload: Value = serde_json::from_str(line)
            .map_err(|e| Error::malformed(position, format!("invalid JSON: {}", e)))?;
        Self::from_json(&payload, position)
    }

    fn validated(position: usize, start: f64, end: f64, text: String, raw: Value) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(Error::malformed(position, "time offsets must be finite"));
        }
        if end < start {
            return Err(Error::malformed(
                position,
                format!("t_end ({}) precedes t_start ({})", end, start),
            ));
        }
        Ok(Self {
            start_offset: start,
            end_offset: end,
            text,
            raw,
        })
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn end_offset(&self) -> f64 {
        self.end_offset
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The original record, extra keys included.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn duration(&self) -> f64 {
        self.end_offset - self.start_offset
    }
}

fn read_offset(obj: &serde_json::Map<String, Value>, key: &str, position: usize) -> Result<f64> {
    match obj.get(key) {
        None => Err(Error::malformed(position, format!("missing required key '{}'", key))),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::malformed(position, format!("'{}' is not representable", key))),
        // Numeric strings are tolerated ("12.5"), anything else is not.
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::malformed(position, format!("'{}' is not numeric: {:?}", key, s))),
        Some(other) => Err(Error::malformed(
            position,
            format!("'{}' is not numeric: {}", key, other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_keys_and_keeps_extras() {
        let payload = serde_json::json!({
            "t_start": 1.0, "t_end": 2.5, "text": "sat 92", "noise_level": "high"
        });
        let event = StreamEvent::from_json(&payload, 1).unwrap();
        assert_eq!(event.start_offset(), 1.0);
        assert_eq!(event.end_offset(), 2.5);
        assert_eq!(event.text(), "sat 92");
        assert_eq!(event.raw()["noise_level"], "high");
    }

    #[test]
    fn rejects_end_before_start() {
        let err = StreamEvent::new(5.0, 4.0, "x").unwrap_err();
        assert!(matches!(err, Error::MalformedEvent { .. }));
    }

    #[test]
    fn numeric_string_offsets_are_accepted() {
        let payload = serde_json::json!({"t_start": "3", "t_end": "4.5", "text": "ok"});
        let event = StreamEvent::from_json(&payload, 7).unwrap();
        assert_eq!(event.start_offset(), 3.0);
    }
}
