//! Message dispatch state machine
//!
//! One inbound webhook event enters, is classified, passes (or fails) the
//! registration gate, and fans out to the reply generator or the anomaly
//! pipeline. Each call is independent; the only cross-call state lives in
//! the identity and capture stores.

use std::sync::Arc;

use crate::channels::{InboundMessage, MediaTransfer, MessageKind, Outbound, WebhookEvent};
use crate::db::{CaptureRepo, UserRepo};
use crate::inference::AnomalyPipeline;
use crate::llm::ReplyGenerator;
use crate::{Error, Result};

/// Normalized registration command
pub const REGISTRATION_COMMAND: &str = "sign up";

/// Reply when the sender is already registered
pub const REPLY_ALREADY_REGISTERED: &str = "El usuario ya esta registrado.";

/// Reply on successful registration
pub const REPLY_REGISTERED: &str = "Registro esta completado con exito!";

/// Reply instructing an unregistered sender how to register
pub const REPLY_UNREGISTERED: &str =
    "El usuario no esta registrado. Para registrarse, por favor, introduce: Sign Up";

/// Caption on the generator heatmap reply
pub const CAPTION_GENERATOR: &str = "gen_generated";

/// Caption on the discriminator heatmap reply
pub const CAPTION_DISCRIMINATOR: &str = "dis_generated";

/// Terminal state of routing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event carried no message (e.g. a delivery-status callback)
    NoMessage,
    /// A new sender identity was created
    Registered,
    /// The sender was already registered when the command arrived
    AlreadyRegistered,
    /// The sender is not registered; a registration instruction was sent
    Unauthorized,
    /// A text message was answered by the reply generator
    Replied,
    /// An image ran through the anomaly pipeline
    ImageProcessed,
    /// The message type is not supported, with its raw type tag
    Unsupported(String),
}

/// Routes one inbound event through the dispatch state machine
pub struct MessageRouter {
    users: UserRepo,
    captures: CaptureRepo,
    outbound: Arc<dyn Outbound>,
    media: Arc<dyn MediaTransfer>,
    replies: Arc<dyn ReplyGenerator>,
    pipeline: AnomalyPipeline,
}

impl MessageRouter {
    /// Create a router over its injected collaborators
    #[must_use]
    pub fn new(
        users: UserRepo,
        captures: CaptureRepo,
        outbound: Arc<dyn Outbound>,
        media: Arc<dyn MediaTransfer>,
        replies: Arc<dyn ReplyGenerator>,
        pipeline: AnomalyPipeline,
    ) -> Self {
        Self {
            users,
            captures,
            outbound,
            media,
            replies,
            pipeline,
        }
    }

    /// Route one webhook event to its terminal outcome
    ///
    /// # Errors
    ///
    /// Returns error on store, media-transfer, inference, or outbound
    /// failures; the webhook handler decides what to do with it
    pub async fn route(&self, event: &WebhookEvent) -> Result<Outcome> {
        let Some(message) = event.first_message() else {
            return Ok(Outcome::NoMessage);
        };

        let sender = message.from.as_str();

        // The registration command short-circuits everything else
        if message.normalized_text().as_deref() == Some(REGISTRATION_COMMAND) {
            return self.handle_registration(sender).await;
        }

        if self.users.find(sender)?.is_none() {
            self.outbound.send_text(sender, REPLY_UNREGISTERED).await?;
            return Ok(Outcome::Unauthorized);
        }

        match message.kind() {
            MessageKind::Text => self.handle_text(sender, message).await,
            MessageKind::Image => self.handle_image(sender, message).await,
            MessageKind::Other(tag) => {
                let reply = format!("tipo de mensaje '{tag}' aún no compatible.");
                self.outbound.send_text(sender, &reply).await?;
                Ok(Outcome::Unsupported(tag))
            }
        }
    }

    async fn handle_registration(&self, sender: &str) -> Result<Outcome> {
        if self.users.find(sender)?.is_some() {
            self.outbound
                .send_text(sender, REPLY_ALREADY_REGISTERED)
                .await?;
            return Ok(Outcome::AlreadyRegistered);
        }

        match self.users.register(sender) {
            Ok(_) => {
                self.outbound.send_text(sender, REPLY_REGISTERED).await?;
                Ok(Outcome::Registered)
            }
            // Lost the check-then-insert race: the store's uniqueness
            // constraint fired
            Err(Error::AlreadyRegistered(_)) => {
                self.outbound
                    .send_text(sender, REPLY_ALREADY_REGISTERED)
                    .await?;
                Ok(Outcome::AlreadyRegistered)
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_text(&self, sender: &str, message: &InboundMessage) -> Result<Outcome> {
        let text = message
            .text
            .as_ref()
            .ok_or_else(|| Error::Classification("text message without a body".to_string()))?;

        // The generator receives the raw body, not the normalized form
        let reply = self.replies.generate(&text.body).await;
        self.outbound.send_text(sender, &reply).await?;
        Ok(Outcome::Replied)
    }

    async fn handle_image(&self, sender: &str, message: &InboundMessage) -> Result<Outcome> {
        let media = message.image.as_ref().ok_or_else(|| {
            Error::Classification("image message without a media reference".to_string())
        })?;

        let url = self.media.resolve_download_url(&media.id).await?;
        let raw_image = self.media.download(&url).await?;

        let pipeline = self.pipeline.clone();
        let input = raw_image.clone();
        let heatmaps = tokio::task::spawn_blocking(move || pipeline.run(&input))
            .await
            .map_err(|e| Error::Inference(format!("inference task failed: {e}")))??;

        let gen_media_id = self
            .media
            .upload(heatmaps.generator.clone(), "image/jpeg")
            .await?;
        let dis_media_id = self
            .media
            .upload(heatmaps.discriminator.clone(), "image/jpeg")
            .await?;

        // Outbound failures lose the reply but not the work already done
        if let Err(e) = self
            .outbound
            .send_media(sender, &gen_media_id, CAPTION_GENERATOR)
            .await
        {
            tracing::warn!(error = %e, sender, "generator heatmap send failed");
        }
        if let Err(e) = self
            .outbound
            .send_media(sender, &dis_media_id, CAPTION_DISCRIMINATOR)
            .await
        {
            tracing::warn!(error = %e, sender, "discriminator heatmap send failed");
        }

        self.captures.insert(
            sender,
            &raw_image,
            &heatmaps.generator,
            &heatmaps.discriminator,
        )?;

        Ok(Outcome::ImageProcessed)
    }
}
