//! `WhatsApp` channel adapter
//!
//! Uses the `WhatsApp` Business (Graph) API for messaging and media.
//! Inbound messages arrive through the webhook endpoint; this module owns the
//! webhook envelope types and every call back into the platform.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::retry::{self, RetryPolicy};
use super::{MediaTransfer, MessageKind, Outbound};
use crate::{Error, Result};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// `WhatsApp` channel adapter
pub struct WhatsAppChannel {
    /// `WhatsApp` Business API access token
    access_token: String,
    /// Phone number ID for sending messages
    phone_number_id: String,
    client: Client,
    retry: RetryPolicy,
}

impl WhatsAppChannel {
    /// Create a new `WhatsApp` channel adapter
    ///
    /// Every call through this adapter carries the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(access_token: String, phone_number_id: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            access_token,
            phone_number_id,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Execute a request, retrying recoverable failures with backoff
    async fn execute_with_retry<F>(
        &self,
        build: F,
        what: &str,
        wrap: fn(String) -> Error,
    ) -> Result<reqwest::Response>
    where
        F: Fn() -> Result<reqwest::RequestBuilder>,
    {
        let mut attempt = 0;
        loop {
            match build()?.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = retry::parse_retry_after(
                        response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok()),
                    );
                    let body = response.text().await.unwrap_or_default();

                    if attempt < self.retry.max_retries && retry::is_recoverable(status, &body) {
                        let delay = retry::delay_for_attempt(&self.retry, attempt, retry_after);
                        tracing::warn!(what, status, attempt, "Graph API call failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(wrap(format!("{what} failed: {status} - {body}")));
                }
                Err(e) => {
                    if attempt < self.retry.max_retries && (e.is_timeout() || e.is_connect()) {
                        let delay = retry::delay_for_attempt(&self.retry, attempt, None);
                        tracing::warn!(what, error = %e, attempt, "Graph API request error, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(wrap(format!("{what} failed: {e}")));
                }
            }
        }
    }

    async fn post_message(&self, body: serde_json::Value, what: &str) -> Result<()> {
        let url = format!("{GRAPH_API_BASE}/{}/messages", self.phone_number_id);

        let response = self
            .execute_with_retry(
                || {
                    Ok(self
                        .client
                        .post(&url)
                        .bearer_auth(&self.access_token)
                        .json(&body))
                },
                what,
                Error::Channel,
            )
            .await?;

        // The platform response is logged, not inspected further
        let reply = response.text().await.unwrap_or_default();
        tracing::debug!(what, reply = %reply, "WhatsApp API responded");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Outbound for WhatsAppChannel {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text }
        });

        self.post_message(body, "send text").await
    }

    async fn send_media(&self, to: &str, media_id: &str, caption: &str) -> Result<()> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "image",
            "image": { "id": media_id, "caption": caption }
        });

        self.post_message(body, "send media").await
    }
}

#[async_trait::async_trait]
impl MediaTransfer for WhatsAppChannel {
    async fn resolve_download_url(&self, media_id: &str) -> Result<String> {
        let url = format!("{GRAPH_API_BASE}/{media_id}");

        let response = self
            .execute_with_retry(
                || Ok(self.client.get(&url).bearer_auth(&self.access_token)),
                "media lookup",
                Error::Media,
            )
            .await?;

        let value: serde_json::Value = response.json().await?;
        value
            .get("url")
            .and_then(|u| u.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Media("media lookup response missing url".to_string()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .execute_with_retry(
                || Ok(self.client.get(url).bearer_auth(&self.access_token)),
                "media download",
                Error::Media,
            )
            .await?;

        let data = response
            .bytes()
            .await
            .map_err(|e| Error::Media(format!("media download read failed: {e}")))?;
        Ok(data.to_vec())
    }

    async fn upload(&self, data: Vec<u8>, mime_type: &str) -> Result<String> {
        let url = format!("{GRAPH_API_BASE}/{}/media", self.phone_number_id);
        let mime = mime_type.to_string();

        let response = self
            .execute_with_retry(
                || {
                    let part = Part::bytes(data.clone())
                        .file_name("image.jpg")
                        .mime_str(&mime)
                        .map_err(|e| Error::Media(format!("invalid upload mime type: {e}")))?;
                    let form = Form::new()
                        .part("file", part)
                        .text("messaging_product", "whatsapp");
                    Ok(self
                        .client
                        .post(&url)
                        .bearer_auth(&self.access_token)
                        .multipart(form))
                },
                "media upload",
                Error::Media,
            )
            .await?;

        let value: serde_json::Value = response.json().await?;
        value
            .get("id")
            .and_then(|i| i.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Media("media upload response missing id".to_string()))
    }
}

/// `WhatsApp` webhook payload from the Cloud API
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Webhook entries
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

/// `WhatsApp` webhook entry
#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    /// Changes in this entry
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

/// `WhatsApp` webhook change
#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    /// The change value
    pub value: WebhookValue,
}

/// `WhatsApp` webhook value containing messages
#[derive(Debug, Deserialize)]
pub struct WebhookValue {
    /// Incoming messages (absent for e.g. delivery-status callbacks)
    pub messages: Option<Vec<InboundMessage>>,
}

/// One inbound `WhatsApp` message
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// Sender phone number
    pub from: String,
    /// Message ID
    pub id: String,
    /// Message timestamp
    pub timestamp: Option<String>,
    /// Message type tag
    #[serde(rename = "type")]
    pub message_type: String,
    /// Text content (for text messages)
    pub text: Option<TextContent>,
    /// Image content (for image messages)
    pub image: Option<MediaContent>,
}

/// `WhatsApp` text message content
#[derive(Debug, Deserialize)]
pub struct TextContent {
    /// Message body
    pub body: String,
}

/// `WhatsApp` media object
#[derive(Debug, Deserialize)]
pub struct MediaContent {
    /// Media ID (use to fetch the download URL)
    pub id: String,
    /// MIME type
    pub mime_type: Option<String>,
    /// Caption
    pub caption: Option<String>,
}

impl WebhookEvent {
    /// The single message carried by this event, if any
    #[must_use]
    pub fn first_message(&self) -> Option<&InboundMessage> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .find_map(|c| c.value.messages.as_deref().and_then(<[InboundMessage]>::first))
    }
}

impl InboundMessage {
    /// Classify the message by its type tag
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self.message_type.as_str() {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            other => MessageKind::Other(other.to_string()),
        }
    }

    /// Text body trimmed and lowercased, for command matching
    #[must_use]
    pub fn normalized_text(&self) -> Option<String> {
        self.text.as_ref().map(|t| t.body.trim().to_lowercase())
    }
}
