//! Shared test utilities

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tract_onnx::prelude::*;

use telar_gateway::channels::{MediaTransfer, Outbound, WebhookEvent};
use telar_gateway::db::{self, CaptureRepo, DbPool, UserRepo};
use telar_gateway::inference::{AnomalyModel, AnomalyPipeline};
use telar_gateway::llm::ReplyGenerator;
use telar_gateway::{Error, MessageRouter, Result};

/// Set up an in-memory test database
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Records outbound sends; optionally fails every call
#[derive(Default)]
pub struct MockOutbound {
    pub texts: Mutex<Vec<(String, String)>>,
    pub media: Mutex<Vec<(String, String, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Outbound for MockOutbound {
    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Channel("send_text failed".to_string()));
        }
        self.texts
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_media(&self, to: &str, media_id: &str, caption: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Channel("send_media failed".to_string()));
        }
        self.media
            .lock()
            .unwrap()
            .push((to.to_string(), media_id.to_string(), caption.to_string()));
        Ok(())
    }
}

/// Serves a fixed image and hands out sequential media ids on upload
pub struct MockMediaTransfer {
    pub image: Vec<u8>,
    pub uploads: Mutex<Vec<Vec<u8>>>,
    pub fail_download: AtomicBool,
    pub fail_upload: AtomicBool,
}

impl MockMediaTransfer {
    pub fn serving(image: Vec<u8>) -> Self {
        Self {
            image,
            uploads: Mutex::new(Vec::new()),
            fail_download: AtomicBool::new(false),
            fail_upload: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MediaTransfer for MockMediaTransfer {
    async fn resolve_download_url(&self, media_id: &str) -> Result<String> {
        Ok(format!("https://cdn.test/{media_id}"))
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>> {
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(Error::Media("download failed".to_string()));
        }
        Ok(self.image.clone())
    }

    async fn upload(&self, data: Vec<u8>, _mime_type: &str) -> Result<String> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(Error::Media("upload failed".to_string()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(data);
        Ok(format!("media-{}", uploads.len()))
    }
}

/// Returns a canned reply and records every utterance it saw
pub struct MockReplyGenerator {
    pub reply: String,
    pub calls: Mutex<Vec<String>>,
}

impl MockReplyGenerator {
    pub fn canned(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ReplyGenerator for MockReplyGenerator {
    async fn generate(&self, user_text: &str) -> String {
        self.calls.lock().unwrap().push(user_text.to_string());
        self.reply.clone()
    }
}

/// Passes its input through unchanged (stands in for the generator)
pub struct PassthroughModel;

impl AnomalyModel for PassthroughModel {
    fn label(&self) -> &str {
        "passthrough"
    }

    fn forward(&self, input: Tensor) -> Result<Tensor> {
        Ok(input)
    }
}

/// Emits a fixed patch-score map (stands in for the discriminator)
pub struct PatchScoreModel;

impl AnomalyModel for PatchScoreModel {
    fn label(&self) -> &str {
        "patch-score"
    }

    fn forward(&self, _input: Tensor) -> Result<Tensor> {
        let scores = tract_ndarray::Array4::from_shape_fn((1, 1, 26, 26), |(_, _, y, x)| {
            (x + y) as f32 / 50.0
        });
        Ok(scores.into())
    }
}

/// Fails every forward pass
pub struct FailingModel;

impl AnomalyModel for FailingModel {
    fn label(&self) -> &str {
        "failing"
    }

    fn forward(&self, _input: Tensor) -> Result<Tensor> {
        Err(Error::Inference("forward pass failed".to_string()))
    }
}

pub fn stub_pipeline() -> AnomalyPipeline {
    AnomalyPipeline::new(Arc::new(PassthroughModel), Arc::new(PatchScoreModel))
}

/// A router wired to mocks, with handles kept for assertions
pub struct TestRouter {
    pub router: MessageRouter,
    pub users: UserRepo,
    pub captures: CaptureRepo,
    pub outbound: Arc<MockOutbound>,
    pub media: Arc<MockMediaTransfer>,
    pub replies: Arc<MockReplyGenerator>,
}

pub fn build_test_router(image: Vec<u8>, reply: &str) -> TestRouter {
    build_test_router_with_pipeline(image, reply, stub_pipeline())
}

pub fn build_test_router_with_pipeline(
    image: Vec<u8>,
    reply: &str,
    pipeline: AnomalyPipeline,
) -> TestRouter {
    let pool = setup_test_db();
    let users = UserRepo::new(pool.clone());
    let captures = CaptureRepo::new(pool);
    let outbound = Arc::new(MockOutbound::default());
    let media = Arc::new(MockMediaTransfer::serving(image));
    let replies = Arc::new(MockReplyGenerator::canned(reply));

    let router = MessageRouter::new(
        users.clone(),
        captures.clone(),
        outbound.clone(),
        media.clone(),
        replies.clone(),
        pipeline,
    );

    TestRouter {
        router,
        users,
        captures,
        outbound,
        media,
        replies,
    }
}

/// A small JPEG buffer for image-message tests
pub fn sample_jpeg() -> Vec<u8> {
    let img = image::RgbImage::from_fn(64, 64, |x, y| {
        image::Rgb([(x * 3) as u8, (y * 3) as u8, 128])
    });
    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 90);
    encoder
        .encode_image(&image::DynamicImage::ImageRgb8(img))
        .unwrap();
    bytes
}

/// Build a webhook event carrying one text message
pub fn text_event(from: &str, body: &str) -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": from,
                        "id": "wamid.test",
                        "timestamp": "1722470000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    }))
    .unwrap()
}

/// Build a webhook event carrying one image message
pub fn image_event(from: &str, media_id: &str) -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": from,
                        "id": "wamid.test",
                        "timestamp": "1722470000",
                        "type": "image",
                        "image": { "id": media_id, "mime_type": "image/jpeg" }
                    }]
                }
            }]
        }]
    }))
    .unwrap()
}

/// Build a webhook event with an arbitrary message type tag
pub fn typed_event(from: &str, message_type: &str) -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "entry": [{
            "changes": [{
                "value": {
                    "messages": [{
                        "from": from,
                        "id": "wamid.test",
                        "type": message_type
                    }]
                }
            }]
        }]
    }))
    .unwrap()
}

/// Build a message-less event (e.g. a delivery-status callback)
pub fn status_event() -> WebhookEvent {
    serde_json::from_value(serde_json::json!({
        "entry": [{ "changes": [{ "value": {} }] }]
    }))
    .unwrap()
}
