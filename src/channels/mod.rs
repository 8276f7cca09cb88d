//! Messaging platform adapters
//!
//! The router talks to the platform only through the `Outbound` and
//! `MediaTransfer` traits; `WhatsAppChannel` implements both against the
//! Graph API.

pub mod retry;
mod whatsapp;

use async_trait::async_trait;

pub use whatsapp::{
    InboundMessage, MediaContent, TextContent, WebhookChange, WebhookEntry, WebhookEvent,
    WebhookValue, WhatsAppChannel,
};

use crate::Result;

/// Classification of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Plain text message
    Text,
    /// Image message carrying a media reference
    Image,
    /// Any other message type, with the raw type tag
    Other(String),
}

/// Outbound reply dispatch
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a text reply to a sender
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;

    /// Send a previously uploaded media item with a caption
    async fn send_media(&self, to: &str, media_id: &str, caption: &str) -> Result<()>;
}

/// Media subsystem of the messaging platform
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    /// Resolve a media id into a short-lived download URL
    async fn resolve_download_url(&self, media_id: &str) -> Result<String>;

    /// Download media bytes from a resolved URL
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Upload media bytes, returning the platform media id
    async fn upload(&self, data: Vec<u8>, mime_type: &str) -> Result<String>;
}
