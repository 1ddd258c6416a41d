//! Text generation through an OpenAI-compatible LLM API.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function around
//!   one chat template (the template carries the system instructions)
//! - [`RetryAsk`]: Decorator that adds fixed-delay retries to any
//!   `AskAsync` implementation
//!
//! Each pipeline step gets its own asker, bound to its own template:
//! keyword research and content writing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ConfigError};
use crate::retry::retry_with_delay;

/// Trait for async LLM interaction.
///
/// Implementors send a user prompt to an LLM and return its raw text reply.
/// The system instructions are owned by the implementor.
#[async_trait(?Send)]
pub trait AskAsync {
    async fn ask(&self, prompt: &str) -> Result<String, ApiError>;
}

/// Wrapper that retries any [`AskAsync`] implementation with a fixed delay.
///
/// Text generation is rate limited upstream, so every retry waits exactly
/// `delay`; the last error is returned unchanged once retries run out.
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retries after the first attempt.
    max_retries: u32,
    /// Pause between attempts.
    delay: Duration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = AskFnWrapper::new(config, template, "trendpress_content_writer");
    /// let retry_client = RetryAsk::new(client, 2, Duration::from_secs(3));
    /// ```
    pub fn new(inner: T, max_retries: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            delay,
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait(?Send)]
impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<String, ApiError> {
        let t0 = Instant::now();
        let res = retry_with_delay("ask", self.max_retries, self.delay, || self.inner.ask(prompt)).await;
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &res {
            Ok(reply) => info!(elapsed_ms, reply_chars = reply.len(), "ask succeeded"),
            Err(e) => warn!(elapsed_ms, error = %e, "ask exhausted retries"),
        }
        res
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
pub struct AskFnWrapper {
    /// LLM configuration (API keys, endpoints, model settings), shared by all askers.
    config: Arc<AwfulJadeConfig>,
    /// Chat template carrying the system instructions for this step.
    template: ChatTemplate,
    /// Template name, for logs.
    template_name: String,
}

impl AskFnWrapper {
    pub fn new(config: Arc<AwfulJadeConfig>, template: ChatTemplate, template_name: &str) -> Self {
        Self {
            config,
            template,
            template_name: template_name.to_string(),
        }
    }
}

impl fmt::Debug for AskFnWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AskFnWrapper")
            .field("template", &self.template_name)
            .finish()
    }
}

#[async_trait(?Send)]
impl AskAsync for AskFnWrapper {
    #[instrument(level = "info", skip_all, fields(template = %self.template_name))]
    async fn ask(&self, prompt: &str) -> Result<String, ApiError> {
        let t0 = Instant::now();
        let res = ask(&self.config, prompt.to_string(), &self.template, None, None).await;
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        res.map_err(|e| {
            warn!(elapsed_ms, error = %e, "API call failed");
            ApiError::Generation(e.to_string())
        })
    }
}

/// Load the awful_aj configuration.
///
/// Uses `config_path` when given, otherwise `config.yaml` in the awful_aj
/// config directory.
pub fn load_llm_config(config_path: Option<&str>) -> Result<Arc<AwfulJadeConfig>, ConfigError> {
    let path = match config_path {
        Some(p) => PathBuf::from(p),
        None => config_dir()
            .map_err(|e| ConfigError::TextGenerator(e.to_string()))?
            .join("config.yaml"),
    };
    let path_str = path
        .to_str()
        .ok_or_else(|| ConfigError::TextGenerator(format!("not a valid config filename: {}", path.display())))?;
    let config = config::load_config(path_str).map_err(|e| ConfigError::TextGenerator(e.to_string()))?;
    info!(config_path = path_str, "Loaded LLM configuration");
    Ok(Arc::new(config))
}

/// Build a retrying asker bound to the named chat template.
pub async fn template_asker(
    config: Arc<AwfulJadeConfig>,
    template_name: &str,
    max_retries: u32,
    delay: Duration,
) -> Result<RetryAsk<AskFnWrapper>, ConfigError> {
    let template = template::load_template(template_name)
        .await
        .map_err(|e| ConfigError::TextGenerator(format!("template {template_name}: {e}")))?;
    info!(template = template_name, "Loaded chat template");
    Ok(RetryAsk::new(
        AskFnWrapper::new(config, template, template_name),
        max_retries,
        delay,
    ))
}
