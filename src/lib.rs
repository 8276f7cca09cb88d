//! Telar Gateway - WhatsApp gateway for a garment-factory assistant
//!
//! This library provides the core functionality for the Telar gateway:
//! - Webhook intake and the message dispatch state machine
//! - Registration gating against the sender identity store
//! - LLM-backed conversational replies
//! - Fabric anomaly detection (generator/discriminator heatmaps)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              WhatsApp Business Platform              │
//! │        webhook delivery  │  Graph API (send/media)   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Telar Gateway                       │
//! │  Router  │  Identity/Capture store  │  Channels      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │  OpenAI (replies)  │  ONNX models (anomaly heatmaps) │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod llm;
pub mod router;

pub use config::Config;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use router::{MessageRouter, Outcome};
