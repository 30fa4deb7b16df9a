//! Connection protocol envelopes
//!
//! Inbound topics are shared and noisy: registrations, unrelated protocols and
//! malformed payloads all land next to genuine connection requests. Decoding is
//! therefore an explicit step that yields `None` for anything that is not
//! connection-protocol traffic, instead of an error.
//!
//! Wire shapes (JSON):
//!
//! ```text
//! {"protocol":"hcs-10","op":"connection_request","account_id":"0.0.1","inbound_topic":"0.0.2","m":"hi"}
//! {"protocol":"hcs-10","op":"connection_created","account_id":"0.0.9","connected_account_id":"0.0.1","connection_topic":"0.0.5"}
//! {"protocol":"hcs-10","op":"connection_close"}
//! {"from":"0.0.1","content":"hello"}
//! ```
//!
//! Request fields are read leniently: a numeric `account_id` or `inbound_topic` is
//! taken in its decimal form, and any other non-string value counts as absent, so
//! the request still surfaces (from `"unknown"` when the account is unusable).

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{AccountId, TopicId};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Protocol tag carried by every connection envelope
pub const CONNECTION_PROTOCOL: &str = "hcs-10";

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// A tagged connection-protocol payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol tag; `p` is accepted on decode for compact senders
    #[serde(alias = "p")]
    pub protocol: String,
    #[serde(flatten)]
    pub operation: Operation,
}

/// Operations understood by the connection lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// A peer asks to open a connection
    ConnectionRequest {
        #[serde(
            default,
            deserialize_with = "lenient_string",
            skip_serializing_if = "Option::is_none"
        )]
        account_id: Option<AccountId>,
        #[serde(
            default,
            deserialize_with = "lenient_string",
            skip_serializing_if = "Option::is_none"
        )]
        inbound_topic: Option<TopicId>,
        /// Free-text note from the requester
        #[serde(
            default,
            deserialize_with = "lenient_string",
            skip_serializing_if = "Option::is_none"
        )]
        m: Option<String>,
    },
    /// Acknowledgement naming the dedicated topic for an accepted request
    ConnectionCreated {
        account_id: AccountId,
        connected_account_id: AccountId,
        connection_topic: TopicId,
    },
    /// One side retired the connection
    ConnectionClose {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Strings pass through, numbers become their decimal text, anything else is `None`
fn lenient_string<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => Some(T::from(text)),
        Some(serde_json::Value::Number(number)) => Some(T::from(number.to_string())),
        _ => None,
    })
}

impl Operation {
    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ConnectionRequest { .. } => "connection_request",
            Operation::ConnectionCreated { .. } => "connection_created",
            Operation::ConnectionClose { .. } => "connection_close",
        }
    }
}

impl Envelope {
    fn tagged(operation: Operation) -> Self {
        Self {
            protocol: CONNECTION_PROTOCOL.to_string(),
            operation,
        }
    }

    /// Build a connection request
    pub fn connection_request(
        account_id: AccountId,
        inbound_topic: Option<TopicId>,
        message: Option<String>,
    ) -> Self {
        Self::tagged(Operation::ConnectionRequest {
            account_id: Some(account_id),
            inbound_topic,
            m: message,
        })
    }

    /// Build the acknowledgement for an accepted request
    pub fn connection_created(
        account_id: AccountId,
        connected_account_id: AccountId,
        connection_topic: TopicId,
    ) -> Self {
        Self::tagged(Operation::ConnectionCreated {
            account_id,
            connected_account_id,
            connection_topic,
        })
    }

    /// Build a closure notice
    pub fn connection_close(reason: Option<String>) -> Self {
        Self::tagged(Operation::ConnectionClose { reason })
    }

    /// Decode a raw topic payload
    ///
    /// Returns `None` for malformed JSON, a foreign protocol tag, or an operation this
    /// protocol does not define.
    pub fn parse(payload: &str) -> Option<Self> {
        let envelope: Envelope = serde_json::from_str(payload).ok()?;
        (envelope.protocol == CONNECTION_PROTOCOL).then_some(envelope)
    }

    /// Encode for publishing
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_connection_request(&self) -> bool {
        matches!(self.operation, Operation::ConnectionRequest { .. })
    }
}

// ----------------------------------------------------------------------------
// Application Messages
// ----------------------------------------------------------------------------

/// Application payload exchanged on a dedicated connection topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub from: AccountId,
    pub content: String,
}

impl ApplicationMessage {
    pub fn new(from: AccountId, content: impl Into<String>) -> Self {
        Self {
            from,
            content: content.into(),
        }
    }

    pub fn parse(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ----------------------------------------------------------------------------
// Payload Classification
// ----------------------------------------------------------------------------

/// What a raw payload on a connection topic turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPayload {
    /// Protocol traffic such as `connection_close`
    Protocol(Envelope),
    Application(ApplicationMessage),
    /// Anything else, kept verbatim
    Opaque(String),
}

impl TopicPayload {
    pub fn classify(payload: &str) -> Self {
        if let Some(envelope) = Envelope::parse(payload) {
            TopicPayload::Protocol(envelope)
        } else if let Some(message) = ApplicationMessage::parse(payload) {
            TopicPayload::Application(message)
        } else {
            TopicPayload::Opaque(payload.to_string())
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection_request() {
        let payload = r#"{"protocol":"hcs-10","op":"connection_request","account_id":"0.0.remote","inbound_topic":"0.0.77","m":"hello there"}"#;
        let envelope = Envelope::parse(payload).expect("valid request");

        assert!(envelope.is_connection_request());
        assert_eq!(
            envelope.operation,
            Operation::ConnectionRequest {
                account_id: Some(AccountId::from("0.0.remote")),
                inbound_topic: Some(TopicId::from("0.0.77")),
                m: Some("hello there".into()),
            }
        );
    }

    #[test]
    fn test_parse_request_without_optional_fields() {
        let envelope = Envelope::parse(r#"{"protocol":"hcs-10","op":"connection_request"}"#)
            .expect("minimal request");
        assert_eq!(
            envelope.operation,
            Operation::ConnectionRequest {
                account_id: None,
                inbound_topic: None,
                m: None,
            }
        );
    }

    #[test]
    fn test_request_fields_are_read_leniently() {
        let numeric = Envelope::parse(
            r#"{"protocol":"hcs-10","op":"connection_request","account_id":42,"inbound_topic":7}"#,
        )
        .expect("numeric ids");
        assert_eq!(
            numeric.operation,
            Operation::ConnectionRequest {
                account_id: Some(AccountId::from("42")),
                inbound_topic: Some(TopicId::from("7")),
                m: None,
            }
        );

        let unusable = Envelope::parse(
            r#"{"protocol":"hcs-10","op":"connection_request","account_id":{"shard":0},"m":null}"#,
        )
        .expect("unusable fields");
        assert_eq!(
            unusable.operation,
            Operation::ConnectionRequest {
                account_id: None,
                inbound_topic: None,
                m: None,
            }
        );
    }

    #[test]
    fn test_short_protocol_alias() {
        let envelope = Envelope::parse(r#"{"p":"hcs-10","op":"connection_close"}"#).unwrap();
        assert_eq!(envelope.operation, Operation::ConnectionClose { reason: None });
    }

    #[test]
    fn test_non_connection_traffic_is_ignored() {
        // Foreign protocol tag
        assert!(Envelope::parse(r#"{"protocol":"hcs-2","op":"connection_request"}"#).is_none());
        // Operation this protocol does not define
        assert!(Envelope::parse(r#"{"protocol":"hcs-10","op":"register","account_id":"0.0.5"}"#).is_none());
        // Unrelated shape
        assert!(Envelope::parse(r#"{"temperature":21.5}"#).is_none());
        // Not JSON at all
        assert!(Envelope::parse("hello world").is_none());
        assert!(Envelope::parse("").is_none());
    }

    #[test]
    fn test_created_envelope_wire_shape() {
        let envelope = Envelope::connection_created(
            AccountId::from("0.0.self"),
            AccountId::from("0.0.peer"),
            TopicId::from("0.0.500"),
        );
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(value["protocol"], "hcs-10");
        assert_eq!(value["op"], "connection_created");
        assert_eq!(value["account_id"], "0.0.self");
        assert_eq!(value["connected_account_id"], "0.0.peer");
        assert_eq!(value["connection_topic"], "0.0.500");
    }

    #[test]
    fn test_close_envelope_omits_missing_reason() {
        let json = Envelope::connection_close(None).to_json().unwrap();
        assert_eq!(json, r#"{"protocol":"hcs-10","op":"connection_close"}"#);
    }

    #[test]
    fn test_classify_topic_payloads() {
        let app = ApplicationMessage::new(AccountId::from("0.0.remote"), "ping")
            .to_json()
            .unwrap();
        assert_eq!(
            TopicPayload::classify(&app),
            TopicPayload::Application(ApplicationMessage::new(AccountId::from("0.0.remote"), "ping"))
        );

        let close = Envelope::connection_close(Some("done".into())).to_json().unwrap();
        assert!(matches!(TopicPayload::classify(&close), TopicPayload::Protocol(_)));

        assert_eq!(
            TopicPayload::classify("raw bytes"),
            TopicPayload::Opaque("raw bytes".into())
        );
    }
}
