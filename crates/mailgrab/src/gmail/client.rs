//! Typed client for the Gmail REST API.

use std::collections::VecDeque;
use std::time::Duration;

use base64::Engine;
use log::debug;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

use super::model::{AttachmentBody, Message, MessageList, MessageRef};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type Result<T> = std::result::Result<T, ApiError>;

/// Gmail API client bound to one access token. All calls are plain
/// blocking-style awaits; retry policy is left to the operator.
pub struct GmailClient {
    http: Client,
    access_token: SecretString,
    base_url: String,
}

impl GmailClient {
    pub fn new(access_token: SecretString) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            access_token,
            base_url: API_BASE.to_string(),
        })
    }

    /// Points the client at a different API root. Test hook.
    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One page of `messages.list` for the query.
    pub async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessageList> {
        let url = format!("{}/messages", self.base_url);
        let mut params = vec![("q", query)];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        debug!("Listing messages for query '{}' (page token: {:?})", query, page_token);
        self.get_json(&url, &params).await
    }

    /// Full message fetch: headers plus the MIME part tree.
    pub async fn get_message(&self, id: &str) -> Result<Message> {
        let url = format!("{}/messages/{}", self.base_url, id);
        self.get_json(&url, &[("format", "full")]).await
    }

    /// Fetches and decodes one attachment body.
    pub async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/messages/{}/attachments/{}",
            self.base_url, message_id, attachment_id
        );
        let body: AttachmentBody = self.get_json(&url, &[]).await?;

        let data = body
            .data
            .ok_or_else(|| ApiError::Decode("Attachment response carried no data".to_string()))?;
        decode_body_data(&data)
    }

    /// Lazy, restartable pager over all messages matching `query`.
    pub fn search<'a>(&'a self, query: &str) -> SearchStream<'a> {
        SearchStream {
            client: self,
            query: query.to_string(),
            buffer: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, params: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(url)
            .query(params)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Decodes Gmail's urlsafe base64 body data (padding optional).
pub fn decode_body_data(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| ApiError::Decode(format!("Invalid base64 body data: {}", e)))
}

/// Pages through `messages.list` results one page at a time, yielding
/// one [`MessageRef`] per call without materializing the full result
/// set. A fresh stream from [`GmailClient::search`] restarts from the
/// first page.
pub struct SearchStream<'a> {
    client: &'a GmailClient,
    query: String,
    buffer: VecDeque<MessageRef>,
    next_page_token: Option<String>,
    exhausted: bool,
}

impl SearchStream<'_> {
    /// Yields the next matching message id, fetching the next page
    /// on demand. Page failures surface immediately; no retry.
    pub async fn next(&mut self) -> Result<Option<MessageRef>> {
        loop {
            if let Some(message) = self.buffer.pop_front() {
                return Ok(Some(message));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .client
                .list_messages(&self.query, self.next_page_token.as_deref())
                .await?;

            self.buffer.extend(page.messages);
            self.next_page_token = page.next_page_token;
            if self.next_page_token.is_none() {
                self.exhausted = true;
            }

            // An empty page with no continuation ends the stream on
            // the next loop iteration.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_data_urlsafe() {
        // "PDF-1.4" encoded with the urlsafe alphabet.
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(b"PDF-1.4");
        assert_eq!(decode_body_data(&encoded).unwrap(), b"PDF-1.4");
    }

    #[test]
    fn test_decode_body_data_without_padding() {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"hello");
        assert_eq!(decode_body_data(&encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_decode_body_data_invalid() {
        assert!(matches!(
            decode_body_data("!!not base64!!"),
            Err(ApiError::Decode(_))
        ));
    }
}
