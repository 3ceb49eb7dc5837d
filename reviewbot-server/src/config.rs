use anyhow::{Context, Result};
use std::env;

use reviewbot_core::layers::ai::DEFAULT_MODEL;

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub webhook_secret: String,
    /// When absent the AI layer is not installed; the pattern and heuristic
    /// layers still run.
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token =
            env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable is required")?;

        let webhook_secret = env::var("WEBHOOK_SECRET")
            .context("WEBHOOK_SECRET environment variable is required")?;

        let groq_api_key = env::var("GROQ_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let groq_model = env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        Ok(Config {
            github_token,
            webhook_secret,
            groq_api_key,
            groq_model,
            port,
        })
    }
}
