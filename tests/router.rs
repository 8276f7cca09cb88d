//! Message router integration tests

use std::sync::atomic::Ordering;
use std::sync::Arc;

use telar_gateway::router::{
    CAPTION_DISCRIMINATOR, CAPTION_GENERATOR, REPLY_ALREADY_REGISTERED, REPLY_REGISTERED,
    REPLY_UNREGISTERED,
};
use telar_gateway::{Error, Outcome};

mod common;
use common::{
    build_test_router, build_test_router_with_pipeline, image_event, sample_jpeg, status_event,
    text_event, typed_event, FailingModel, PassthroughModel,
};

const SENDER: &str = "5215550000001";

// -- registration gate --------------------------------------------------------

#[tokio::test]
async fn unregistered_text_gets_registration_instruction_only() {
    let test = build_test_router(sample_jpeg(), "hola");

    let outcome = test
        .router
        .route(&text_event(SENDER, "¿Qué telas usan?"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Unauthorized);

    let texts = test.outbound.texts.lock().unwrap();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0], (SENDER.to_string(), REPLY_UNREGISTERED.to_string()));

    // Neither the LLM nor the media pipeline ran
    assert!(test.replies.calls.lock().unwrap().is_empty());
    assert!(test.media.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unregistered_image_gets_registration_instruction_only() {
    let test = build_test_router(sample_jpeg(), "hola");

    let outcome = test
        .router
        .route(&image_event(SENDER, "media-abc"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Unauthorized);
    assert!(test.media.uploads.lock().unwrap().is_empty());
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 0);
}

// -- registration command -----------------------------------------------------

#[tokio::test]
async fn registration_command_creates_identity_once() {
    let test = build_test_router(sample_jpeg(), "hola");

    // Command matching is trim + lowercase
    let first = test
        .router
        .route(&text_event(SENDER, "  Sign Up  "))
        .await
        .unwrap();
    assert_eq!(first, Outcome::Registered);

    let second = test
        .router
        .route(&text_event(SENDER, "sign up"))
        .await
        .unwrap();
    assert_eq!(second, Outcome::AlreadyRegistered);

    assert_eq!(test.users.count().unwrap(), 1);

    let texts = test.outbound.texts.lock().unwrap();
    assert_eq!(texts[0].1, REPLY_REGISTERED);
    assert_eq!(texts[1].1, REPLY_ALREADY_REGISTERED);
}

#[tokio::test]
async fn concurrent_registration_keeps_identity_unique() {
    let test = build_test_router(sample_jpeg(), "hola");
    let router = Arc::new(test.router);

    let a = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.route(&text_event(SENDER, "Sign Up")).await })
    };
    let b = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.route(&text_event(SENDER, "Sign Up")).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(test.users.count().unwrap(), 1);
}

#[tokio::test]
async fn registration_command_never_reaches_the_llm() {
    let test = build_test_router(sample_jpeg(), "hola");

    test.router
        .route(&text_event(SENDER, "SIGN UP"))
        .await
        .unwrap();

    assert!(test.replies.calls.lock().unwrap().is_empty());
}

// -- text dispatch ------------------------------------------------------------

#[tokio::test]
async fn registered_text_is_relayed_through_the_reply_generator() {
    let test = build_test_router(sample_jpeg(), "Usamos algodón y lino.");
    test.users.register(SENDER).unwrap();

    let outcome = test
        .router
        .route(&text_event(SENDER, "¿Qué telas usan?"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Replied);

    // The generator saw the literal text exactly once
    let calls = test.replies.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), ["¿Qué telas usan?"]);

    // Its return value went out verbatim as the single reply
    let texts = test.outbound.texts.lock().unwrap();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].1, "Usamos algodón y lino.");
}

// -- image dispatch -----------------------------------------------------------

#[tokio::test]
async fn registered_image_produces_two_media_sends_and_one_capture() {
    let test = build_test_router(sample_jpeg(), "hola");
    test.users.register(SENDER).unwrap();

    let outcome = test
        .router
        .route(&image_event(SENDER, "media-abc"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::ImageProcessed);

    let media = test.outbound.media.lock().unwrap();
    assert_eq!(media.len(), 2);
    assert_eq!(media[0].2, CAPTION_GENERATOR);
    assert_eq!(media[1].2, CAPTION_DISCRIMINATOR);
    assert_eq!(media[0].1, "media-1");
    assert_eq!(media[1].1, "media-2");

    // One capture row holding all three payloads
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 1);
    let capture = test.captures.latest_for_sender(SENDER).unwrap().unwrap();
    assert_eq!(capture.raw_image, sample_jpeg());

    let uploads = test.media.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(capture.heatmap_gen, uploads[0]);
    assert_eq!(capture.heatmap_dis, uploads[1]);

    // The uploaded heatmaps are real images
    assert!(image::load_from_memory(&uploads[0]).is_ok());
    assert!(image::load_from_memory(&uploads[1]).is_ok());
}

#[tokio::test]
async fn download_failure_aborts_image_pipeline() {
    let test = build_test_router(sample_jpeg(), "hola");
    test.users.register(SENDER).unwrap();
    test.media.fail_download.store(true, Ordering::SeqCst);

    let result = test.router.route(&image_event(SENDER, "media-abc")).await;

    assert!(matches!(result, Err(Error::Media(_))));
    assert!(test.outbound.media.lock().unwrap().is_empty());
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 0);
}

#[tokio::test]
async fn inference_failure_aborts_image_pipeline() {
    let pipeline = telar_gateway::inference::AnomalyPipeline::new(
        Arc::new(PassthroughModel),
        Arc::new(FailingModel),
    );
    let test = build_test_router_with_pipeline(sample_jpeg(), "hola", pipeline);
    test.users.register(SENDER).unwrap();

    let result = test.router.route(&image_event(SENDER, "media-abc")).await;

    assert!(matches!(result, Err(Error::Inference(_))));
    assert!(test.media.uploads.lock().unwrap().is_empty());
    assert!(test.outbound.media.lock().unwrap().is_empty());
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 0);
}

#[tokio::test]
async fn undecodable_image_aborts_pipeline_before_upload() {
    let test = build_test_router(b"not an image".to_vec(), "hola");
    test.users.register(SENDER).unwrap();

    let result = test.router.route(&image_event(SENDER, "media-abc")).await;

    assert!(matches!(result, Err(Error::Inference(_))));
    assert!(test.media.uploads.lock().unwrap().is_empty());
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 0);
}

#[tokio::test]
async fn upload_failure_aborts_before_sends_and_persistence() {
    let test = build_test_router(sample_jpeg(), "hola");
    test.users.register(SENDER).unwrap();
    test.media.fail_upload.store(true, Ordering::SeqCst);

    let result = test.router.route(&image_event(SENDER, "media-abc")).await;

    assert!(matches!(result, Err(Error::Media(_))));
    assert!(test.outbound.media.lock().unwrap().is_empty());
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 0);
}

#[tokio::test]
async fn media_send_failure_still_persists_the_capture() {
    let test = build_test_router(sample_jpeg(), "hola");
    test.users.register(SENDER).unwrap();
    test.outbound.fail.store(true, Ordering::SeqCst);

    let outcome = test
        .router
        .route(&image_event(SENDER, "media-abc"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::ImageProcessed);
    assert_eq!(test.captures.count_for_sender(SENDER).unwrap(), 1);
}

// -- other message types ------------------------------------------------------

#[tokio::test]
async fn unsupported_type_gets_literal_reply_with_raw_tag() {
    let test = build_test_router(sample_jpeg(), "hola");
    test.users.register(SENDER).unwrap();

    let outcome = test
        .router
        .route(&typed_event(SENDER, "audio"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Unsupported("audio".to_string()));

    let texts = test.outbound.texts.lock().unwrap();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].1, "tipo de mensaje 'audio' aún no compatible.");
}

#[tokio::test]
async fn status_callback_terminates_without_side_effects() {
    let test = build_test_router(sample_jpeg(), "hola");

    let outcome = test.router.route(&status_event()).await.unwrap();

    assert_eq!(outcome, Outcome::NoMessage);
    assert!(test.outbound.texts.lock().unwrap().is_empty());
    assert_eq!(test.users.count().unwrap(), 0);
}
