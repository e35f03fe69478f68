//! Attachment extraction from a message's MIME part tree.
//!
//! The tree may nest multipart containers arbitrarily deep; candidates
//! are the leaf parts that carry a filename. Payload bytes are only
//! fetched once a candidate has passed the extension filter, so
//! filtered parts cost nothing.

use log::debug;

use crate::error::ExtractError;

use super::client::{decode_body_data, GmailClient};
use super::model::{Message, MessagePart};

/// A filenamed MIME part that passed the extension filter. Payload is
/// fetched lazily via [`fetch_payload`](Self::fetch_payload).
#[derive(Debug)]
pub struct AttachmentCandidate<'a> {
    pub filename: String,
    part: &'a MessagePart,
}

/// Walks the part tree in traversal order and returns the candidates
/// whose extension is in `allow_list`. An empty allow-list accepts
/// every part with a filename.
pub fn candidates<'a>(message: &'a Message, allow_list: &[String]) -> Vec<AttachmentCandidate<'a>> {
    let mut found = Vec::new();
    if let Some(payload) = &message.payload {
        collect(payload, allow_list, &mut found);
    }
    debug!(
        "Message {}: {} qualifying attachment(s)",
        message.id,
        found.len()
    );
    found
}

fn collect<'a>(
    part: &'a MessagePart,
    allow_list: &[String],
    found: &mut Vec<AttachmentCandidate<'a>>,
) {
    if !part.filename.is_empty() && extension_matches(&part.filename, allow_list) {
        found.push(AttachmentCandidate {
            filename: part.filename.clone(),
            part,
        });
    }

    for child in &part.parts {
        collect(child, allow_list, found);
    }
}

/// Case-insensitive extension check against the allow-list. Entries
/// carry a leading dot (`.pdf`); a filename without an extension only
/// qualifies when the allow-list is empty.
pub fn extension_matches(filename: &str, allow_list: &[String]) -> bool {
    if allow_list.is_empty() {
        return true;
    }

    let Some(dot) = filename.rfind('.') else {
        return false;
    };
    let extension = filename[dot..].to_ascii_lowercase();
    allow_list.iter().any(|allowed| allowed == &extension)
}

impl AttachmentCandidate<'_> {
    /// Fetches the payload bytes: inline `body.data` when the server
    /// embedded it, else a `attachments.get` round trip. Failures are
    /// scoped to this attachment.
    pub async fn fetch_payload(
        &self,
        client: &GmailClient,
        message_id: &str,
    ) -> Result<Vec<u8>, ExtractError> {
        let body = self.part.body.as_ref().ok_or_else(|| ExtractError::MissingPayload {
            filename: self.filename.clone(),
        })?;

        if let Some(data) = &body.data {
            return decode_body_data(data).map_err(|e| ExtractError::Decode {
                filename: self.filename.clone(),
                reason: e.to_string(),
            });
        }

        let attachment_id =
            body.attachment_id
                .as_deref()
                .ok_or_else(|| ExtractError::MissingPayload {
                    filename: self.filename.clone(),
                })?;

        client
            .get_attachment(message_id, attachment_id)
            .await
            .map_err(|e| ExtractError::Fetch {
                filename: self.filename.clone(),
                source: e,
            })
    }

    /// Declared size from the part body, before any fetch.
    pub fn declared_size(&self) -> u64 {
        self.part.body.as_ref().map(|b| b.size).unwrap_or(0)
    }
}
