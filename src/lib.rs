//! Atelier: a terminal front-end for parallel coding agents
//!
//! A request typed by the user is split into tasks, each task runs in its own
//! agent process, and a small model periodically summarises what every agent
//! is doing.

pub mod adapter;
pub mod agent;
pub mod classify;
pub mod cli;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod tui;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtelierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Unsupported agent kind: {0}")]
    UnsupportedAgent(String),

    #[error("Terminal error: {0}")]
    Terminal(String),
}

pub type Result<T> = std::result::Result<T, AtelierError>;
