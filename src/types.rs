//! Value types passed through to the wire codec

use std::collections::HashMap;

/// An AMQP field table, used for method arguments and message headers.
///
/// Byte-level encoding is the connection codec's job; the channel layer only
/// carries tables through.
pub type FieldTable = HashMap<String, FieldValue>;

/// A value stored in a [`FieldTable`].
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum FieldValue {
    Boolean(bool),
    ShortShortInt(i8),
    ShortInt(i16),
    LongInt(i32),
    LongLongInt(i64),
    Float(f32),
    Double(f64),
    LongString(String),
    Timestamp(u64),
    Table(FieldTable),
    Void,
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::LongLongInt(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(value)
    }
}

/// The `basic` class property set, carried by content headers.
///
/// All fields are optional; the channel layer passes them through opaquely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    /// MIME content type.
    pub content_type: Option<String>,
    /// MIME content encoding.
    pub content_encoding: Option<String>,
    /// Application message headers.
    pub headers: Option<FieldTable>,
    /// 1 for non-persistent, 2 for persistent.
    pub delivery_mode: Option<u8>,
    /// Message priority, 0 to 9.
    pub priority: Option<u8>,
    /// Application correlation identifier.
    pub correlation_id: Option<String>,
    /// Address to reply to.
    pub reply_to: Option<String>,
    /// Message expiration.
    pub expiration: Option<String>,
    /// Application message identifier.
    pub message_id: Option<String>,
    /// Message timestamp.
    pub timestamp: Option<u64>,
    /// Message type name.
    pub kind: Option<String>,
    /// Creating user id.
    pub user_id: Option<String>,
    /// Creating application id.
    pub app_id: Option<String>,
    /// Intra-cluster routing identifier.
    pub cluster_id: Option<String>,
}

/// The kind of an exchange, as passed to `exchange_declare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Routes to the queues bound with the exact routing key.
    Direct,
    /// Routes to every bound queue, ignoring the routing key.
    Fanout,
    /// Routes on message header values.
    Headers,
    /// Routes on routing-key pattern matches.
    Topic,
    /// A broker-specific exchange type.
    Custom(String),
}

impl ExchangeKind {
    /// The wire name of this exchange kind.
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Custom(name) => name.as_str(),
        }
    }
}

impl Default for ExchangeKind {
    fn default() -> Self {
        ExchangeKind::Direct
    }
}
