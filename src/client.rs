use crate::config::Config;
use crate::streaming_executor::OpenRouterModel;
use anyhow::{Result, bail};
use openrouter_api::{OpenRouterClient, Ready};
use std::time::Duration;

/// Placeholder key for backends that do not authenticate (Ollama).
const NO_API_KEY: &str = "sk-or-v1-0000000000000000000000000000000000000000000000000000000000000000";

pub fn initialize_client(config: &Config) -> Result<OpenRouterClient<Ready>> {
    let api_key = match config.backend.config().api_key_env_var {
        Some(env_var) => match std::env::var(env_var) {
            Ok(val) => val,
            Err(_) => bail!("environment variable {} not set", env_var),
        },
        None => NO_API_KEY.to_string(),
    };
    let client = OpenRouterClient::new()
        .with_base_url(&config.effective_base_url())?
        .with_timeout(Duration::from_secs(config.timeout_seconds))
        .with_api_key(api_key)?;
    tracing::debug!(backend = ?config.backend, model = %config.model, "model client ready");
    Ok(client)
}

pub fn initialize_model(config: &Config) -> Result<OpenRouterModel> {
    Ok(OpenRouterModel::new(
        initialize_client(config)?,
        config.model.clone(),
    ))
}
