//! Parser module for order book feed messages
//!
//! Handles the subscribe request, the `{ topic, data }` envelope and the
//! snapshot/delta book payload. Price and size arrive as decimal strings;
//! a level that does not parse is skipped instead of failing the message.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{Result, SyncError};

/// Subscription request sent once per successful connection open
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    pub op: &'static str,
    pub args: &'a [String],
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(topics: &'a [String]) -> Self {
        Self {
            op: "subscribe",
            args: topics,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound message envelope
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEnvelope {
    /// Topic the payload belongs to
    pub topic: String,

    /// Topic-specific payload
    #[serde(default)]
    pub data: Value,
}

/// Kind of book update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Snapshot,
    Delta,
}

/// Price level change (price, size pair); `size <= 0` removes the level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpdate {
    pub price: Decimal,
    pub size: Decimal,
}

/// Book payload as it appears on the wire
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookPayload {
    #[serde(rename = "type")]
    kind: UpdateKind,
    #[serde(default)]
    bids: Vec<Value>,
    #[serde(default)]
    asks: Vec<Value>,
    seq_num: u64,
    #[serde(default)]
    prev_seq_num: u64,
    #[serde(default)]
    timestamp: u64,
}

/// Validated snapshot or delta
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub kind: UpdateKind,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
    /// Sequence number of this update
    pub seq_num: u64,
    /// Sequence number the sender applied before this delta
    pub prev_seq_num: u64,
    /// Exchange timestamp (milliseconds)
    pub timestamp: u64,
    /// Levels skipped because price or size was not numeric
    pub rejected_levels: usize,
}

impl BookUpdate {
    /// Parse a book payload (the envelope's `data` field)
    pub fn from_value(data: Value) -> Result<Self> {
        let payload: BookPayload = serde_json::from_value(data)?;

        let mut rejected_levels = 0;
        let bids = parse_levels(&payload.bids, &mut rejected_levels);
        let asks = parse_levels(&payload.asks, &mut rejected_levels);

        Ok(Self {
            kind: payload.kind,
            bids,
            asks,
            seq_num: payload.seq_num,
            prev_seq_num: payload.prev_seq_num,
            timestamp: payload.timestamp,
            rejected_levels,
        })
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind == UpdateKind::Snapshot
    }
}

/// Book update tagged with the topic it arrived on
#[derive(Debug, Clone)]
pub struct BookMessage {
    pub topic: String,
    pub update: BookUpdate,
}

/// Parsed feed message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Book(BookMessage),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw text frame
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Classify an already-decoded frame.
    ///
    /// Frames without a `topic` (subscription acks, errors) and payloads
    /// without a `type` field come back as `Unknown`. A payload that claims
    /// to be a book update but has the wrong shape is an error.
    pub fn from_value(value: Value) -> Result<Self> {
        let has_topic = value.get("topic").map(Value::is_string).unwrap_or(false);
        if !has_topic {
            return Ok(ParsedMessage::Unknown(value.to_string()));
        }

        let envelope: FeedEnvelope = serde_json::from_value(value)?;
        if envelope.data.get("type").is_none() {
            return Ok(ParsedMessage::Unknown(envelope.topic));
        }

        let update = BookUpdate::from_value(envelope.data).map_err(|e| {
            SyncError::ParseError(format!("topic {}: {}", envelope.topic, e))
        })?;

        Ok(ParsedMessage::Book(BookMessage {
            topic: envelope.topic,
            update,
        }))
    }
}

fn parse_levels(raw: &[Value], rejected: &mut usize) -> Vec<LevelUpdate> {
    let mut levels = Vec::with_capacity(raw.len());
    for entry in raw {
        match parse_level(entry) {
            Some(level) => levels.push(level),
            None => *rejected += 1,
        }
    }
    levels
}

fn parse_level(entry: &Value) -> Option<LevelUpdate> {
    let pair = entry.as_array()?;
    if pair.len() < 2 {
        return None;
    }
    Some(LevelUpdate {
        price: parse_decimal(&pair[0])?,
        size: parse_size(&pair[1])?,
    })
}

/// Size from the wire; an empty string reads as zero, i.e. a removal
fn parse_size(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) if s.trim().is_empty() => Some(Decimal::ZERO),
        other => parse_decimal(other),
    }
}

/// Decimal from a JSON string or number
fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
