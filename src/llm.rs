//! LLM-backed reply generation
//!
//! One completion call per inbound text message; the provider failure mode is
//! a fixed Spanish fallback string, never an error to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// System instruction sent with every completion request
pub const SYSTEM_PROMPT: &str = "Eres un chatbot en español en WhatsApp para una empresa privada de fabricación de prendas de vestir. Todas tus respuestas deben estar en el idioma del usuario o en el idioma especificado por el usuario. Responde únicamente a mensajes relacionados con la fabricacion de las prendas, ropa y textil.
No se permite ningún lenguaje grosero o ilegal, ni del usuario ni del chatbot.
Para mensajes no relacionados con la informacion indicada anteriormente, mostrar: Estimado usuario, este es el chatbot unicamente de la tematica de prendas, ropa y textil.
Para mensajes con lenguaje grosero o ilegal, mostrar: De acuerdo con la política de chatbot, cualquier lenguaje grosero o ilegal está totalmente prohibido.";

/// Reply returned when the provider is unreachable
pub const FALLBACK_REPLY: &str = "Error al acceder a la IA. Inténtalo más tarde.";

/// Low temperature favors deterministic, on-topic replies
const SAMPLING_TEMPERATURE: f32 = 0.2;

/// Generates one reply per user utterance
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply for the user's literal message text
    async fn generate(&self, user_text: &str) -> String;
}

/// `OpenAI` chat-completions reply generator
pub struct OpenAiReplyGenerator {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiReplyGenerator {
    /// Create a new reply generator
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            model,
        })
    }

    fn build_request(&self, user_text: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_text.to_string(),
                },
            ],
            temperature: SAMPLING_TEMPERATURE,
        }
    }

    async fn complete(&self, user_text: &str) -> Result<String> {
        let request = self.build_request(user_text);

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("API error: {status} - {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| Error::Llm("response carried no completion".to_string()))
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn generate(&self, user_text: &str) -> String {
        match self.complete(user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "reply generation failed, using fallback");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
