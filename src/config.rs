//! Configuration for the Telar gateway
//!
//! Secrets and endpoints are supplied through the environment; the process
//! refuses to start without the platform credentials.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default chat completion model
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WhatsApp Business API access token
    pub access_token: String,

    /// Phone number ID registered with WhatsApp Business
    pub phone_number_id: String,

    /// Webhook subscription verification secret
    pub verify_token: String,

    /// `OpenAI` API key for reply generation
    pub openai_api_key: String,

    /// Chat completion model identifier
    pub llm_model: String,

    /// Path to the generator ONNX artifact
    pub generator_model: PathBuf,

    /// Path to the discriminator ONNX artifact
    pub discriminator_model: PathBuf,

    /// Path to the sqlite database file
    pub db_path: PathBuf,

    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            access_token: required("ACCESS_TOKEN")?,
            phone_number_id: required("PHONE_NUMBER_ID")?,
            verify_token: required("VERIFY_TOKEN")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            llm_model: optional("TELAR_LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            generator_model: optional("TELAR_GENERATOR_MODEL")
                .map_or_else(|| PathBuf::from("model_gen.onnx"), PathBuf::from),
            discriminator_model: optional("TELAR_DISCRIMINATOR_MODEL")
                .map_or_else(|| PathBuf::from("model_dis.onnx"), PathBuf::from),
            db_path: optional("TELAR_DB_PATH")
                .map_or_else(|| PathBuf::from("telar.db"), PathBuf::from),
            http_timeout: Duration::from_secs(
                optional("TELAR_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Config(format!("{key} must be set")))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
