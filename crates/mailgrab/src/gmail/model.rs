//! Wire types for the Gmail REST API (`users.messages.*`).

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// One entry from a `messages.list` page: just the identifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub result_size_estimate: Option<u64>,
}

/// A full message with headers and its MIME part tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Epoch milliseconds as a decimal string.
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// A node in the MIME tree. Containers carry `parts`; attachment
/// leaves carry a non-empty `filename` and a body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Part payload: small bodies come inline as urlsafe base64 in
/// `data`; large ones only carry an `attachment_id` for a follow-up
/// `attachments.get` call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Response from `messages.attachments.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl Message {
    /// Case-insensitive header lookup on the top-level part.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref()?.headers.iter().find_map(|h| {
            if h.name.eq_ignore_ascii_case(name) {
                Some(h.value.as_str())
            } else {
                None
            }
        })
    }

    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or("")
    }

    /// Raw From header, e.g. `Alice Example <alice@example.com>`.
    pub fn from_header(&self) -> &str {
        self.header("From").unwrap_or("")
    }

    /// Sender name used for the per-sender folder: the display-name
    /// portion of the From header when present, else the bare address.
    pub fn sender_name(&self) -> String {
        sender_name_from_header(self.from_header())
    }

    /// Message timestamp: internalDate (epoch millis) when present,
    /// else the Date header verbatim, else empty.
    pub fn timestamp(&self) -> String {
        if let Some(ts) = self
            .internal_date
            .as_deref()
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|millis| parse_epoch_millis(millis))
        {
            return ts.to_rfc3339();
        }
        self.header("Date").unwrap_or("").to_string()
    }
}

fn parse_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Extracts the sender name from a From header value.
///
/// `Alice Example <alice@example.com>` yields `Alice Example`;
/// a bare `alice@example.com` yields itself; quotes are stripped.
pub fn sender_name_from_header(from: &str) -> String {
    let name = match from.split_once('<') {
        Some((display, _)) => display.trim(),
        None => from.trim(),
    };
    name.trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_json(headers: &str) -> Message {
        let json = format!(
            r#"{{"id":"m1","internalDate":"1706745600000","payload":{{"mimeType":"multipart/mixed","headers":[{}],"parts":[]}}}}"#,
            headers
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let msg = message_json(r#"{"name":"From","value":"a@b.com"},{"name":"Subject","value":"Hi"}"#);
        assert_eq!(msg.header("from"), Some("a@b.com"));
        assert_eq!(msg.header("SUBJECT"), Some("Hi"));
        assert_eq!(msg.header("To"), None);
    }

    #[test]
    fn test_sender_name_with_display_name() {
        assert_eq!(
            sender_name_from_header("Alice Example <alice@example.com>"),
            "Alice Example"
        );
        assert_eq!(
            sender_name_from_header("\"Bob, Jr.\" <bob@example.com>"),
            "Bob, Jr."
        );
    }

    #[test]
    fn test_sender_name_bare_address() {
        assert_eq!(
            sender_name_from_header("alice@example.com"),
            "alice@example.com"
        );
        assert_eq!(sender_name_from_header(""), "");
    }

    #[test]
    fn test_timestamp_from_internal_date() {
        let msg = message_json(r#"{"name":"Date","value":"Thu, 01 Feb 2024 00:00:00 +0000"}"#);
        assert_eq!(msg.timestamp(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn test_timestamp_falls_back_to_date_header() {
        let json = r#"{"id":"m2","payload":{"headers":[{"name":"Date","value":"Thu, 01 Feb 2024 00:00:00 +0000"}]}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.timestamp(), "Thu, 01 Feb 2024 00:00:00 +0000");
    }

    #[test]
    fn test_nested_parts_deserialize() {
        let json = r#"{
            "id": "m3",
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    {"mimeType": "multipart/alternative", "parts": [
                        {"mimeType": "text/plain", "body": {"size": 12}}
                    ]},
                    {"mimeType": "application/pdf", "filename": "invoice.pdf",
                     "body": {"attachmentId": "att-1", "size": 2048}}
                ]
            }
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        let payload = msg.payload.unwrap();
        assert_eq!(payload.parts.len(), 2);
        assert_eq!(payload.parts[0].parts.len(), 1);
        assert_eq!(payload.parts[1].filename, "invoice.pdf");
        assert_eq!(
            payload.parts[1].body.as_ref().unwrap().attachment_id.as_deref(),
            Some("att-1")
        );
    }

    #[test]
    fn test_empty_message_list() {
        let list: MessageList = serde_json::from_str(r#"{"resultSizeEstimate":0}"#).unwrap();
        assert!(list.messages.is_empty());
        assert!(list.next_page_token.is_none());
    }
}
