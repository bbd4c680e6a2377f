//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` (optional) with
//! environment variable overrides. Validates all settings at startup so a
//! misconfigured process never starts serving chats.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Active LLM backend, selected once for the process
    #[serde(default)]
    pub provider: ProviderKind,

    /// OpenAI backend settings
    #[serde(default = "ProviderConfig::openai_defaults")]
    pub openai: ProviderConfig,

    /// Anthropic backend settings
    #[serde(default = "ProviderConfig::anthropic_defaults")]
    pub anthropic: ProviderConfig,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// System instruction sent with every turn
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Retry / timeout policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Telegram transport settings
    #[serde(default)]
    pub telegram: TelegramSettings,
}

fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_system_prompt() -> String {
    "You are a helpful, concise chat assistant. \
     Keep your answers short and to the point unless the user asks you to elaborate. \
     If you don't know something, say so honestly."
        .into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("openai", &self.openai)
            .field("anthropic", &self.anthropic)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("system_prompt", &self.system_prompt)
            .field("memory", &self.memory)
            .field("retry", &self.retry)
            .field("telegram", &self.telegram)
            .finish()
    }
}

/// Which hosted backend answers chats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::ValidationError(format!(
                "LLM_PROVIDER must be 'openai' or 'anthropic', got: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential and model for one backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the endpoint (proxies, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    pub model: String,
}

impl ProviderConfig {
    fn openai_defaults() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: "gpt-4o-mini".into(),
        }
    }

    fn anthropic_defaults() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: "claude-3-5-haiku-latest".into(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Messages kept per chat in the rolling window
    #[serde(default = "default_memory_size")]
    pub size: usize,

    /// SQLite file for long-term facts
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Extract facts from user messages after each successful turn
    #[serde(default = "default_true")]
    pub extract_facts: bool,
}

fn default_memory_size() -> usize {
    10
}
fn default_db_path() -> String {
    "parley.db".into()
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: default_memory_size(),
            db_path: default_db_path(),
            extract_facts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per turn, including the first
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound on a single provider call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_timeout_secs() -> u64 {
    60
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Bot token from @BotFather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Allowed sender IDs. Empty = deny all, ["*"] = allow all.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
fn default_poll_timeout() -> u64 {
    30
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `path` (or the default location), apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(path)?;
        config.validate()?;
        Ok(config)
    }

    /// File plus environment overrides, without validation. Used by
    /// diagnostics that want to report problems rather than stop on them.
    pub fn load_unvalidated(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::default_path();
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// `~/.parley/config.toml`
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from a specific file path without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(users) = var("TELEGRAM_ALLOWED_USERS") {
            self.telegram.allowed_users = users
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
        }
        if let Some(provider) = var("LLM_PROVIDER") {
            self.provider = provider.parse()?;
        }

        if let Some(key) = var("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(model) = var("OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.openai.api_url = Some(url);
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(key);
        }
        if let Some(model) = var("ANTHROPIC_MODEL") {
            self.anthropic.model = model;
        }
        if let Some(url) = var("ANTHROPIC_BASE_URL") {
            self.anthropic.api_url = Some(url);
        }

        if let Some(prompt) = var("SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(path) = var("MEMORY_DB_PATH") {
            self.memory.db_path = path;
        }

        if let Some(raw) = var("MEMORY_SIZE") {
            self.memory.size = parse_number("MEMORY_SIZE", &raw)?;
        }
        if let Some(raw) = var("LLM_MAX_TOKENS") {
            self.max_tokens = parse_number("LLM_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = var("LLM_RETRY_ATTEMPTS") {
            self.retry.max_attempts = parse_number("LLM_RETRY_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = var("LLM_RETRY_BASE_MS") {
            self.retry.base_delay_ms = parse_number("LLM_RETRY_BASE_MS", &raw)?;
        }
        if let Some(raw) = var("LLM_RETRY_MAX_MS") {
            self.retry.max_delay_ms = parse_number("LLM_RETRY_MAX_MS", &raw)?;
        }
        if let Some(raw) = var("LLM_TIMEOUT_SECS") {
            self.retry.timeout_secs = parse_number("LLM_TIMEOUT_SECS", &raw)?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Settings of the active backend.
    pub fn active_provider(&self) -> &ProviderConfig {
        match self.provider {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let active = self.active_provider();
        if active.api_key.is_none() {
            let var = match self.provider {
                ProviderKind::OpenAi => "OPENAI_API_KEY",
                ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            };
            return Err(ConfigError::ValidationError(format!(
                "{var} must be set when LLM_PROVIDER={}",
                self.provider
            )));
        }

        if active.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "model for provider '{}' must not be empty",
                self.provider
            )));
        }

        if self.memory.size == 0 {
            return Err(ConfigError::ValidationError("MEMORY_SIZE must be >= 1".into()));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be >= 1".into()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be >= 1".into(),
            ));
        }

        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(ConfigError::ValidationError(
                "retry.multiplier must be a finite number >= 1.0".into(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_delay_ms must be >= retry.base_delay_ms".into(),
            ));
        }

        if self.retry.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retry.timeout_secs must be >= 1".into(),
            ));
        }

        Ok(())
    }

    /// The Telegram bot token, required only when serving Telegram.
    pub fn require_telegram_token(&self) -> Result<&str, ConfigError> {
        self.telegram.bot_token.as_deref().ok_or_else(|| {
            ConfigError::ValidationError(
                "Required environment variable 'TELEGRAM_BOT_TOKEN' is not set".into(),
            )
        })
    }

    /// Generate a TOML rendering of this config with secrets removed.
    pub fn to_redacted_toml(&self) -> String {
        let mut redacted = self.clone();
        let mask = |s: &mut Option<String>| {
            if s.is_some() {
                *s = Some("[REDACTED]".into());
            }
        };
        mask(&mut redacted.openai.api_key);
        mask(&mut redacted.anthropic.api_key);
        mask(&mut redacted.telegram.bot_token);
        toml::to_string_pretty(&redacted).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            openai: ProviderConfig::openai_defaults(),
            anthropic: ProviderConfig::anthropic_defaults(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
            memory: MemoryConfig::default(),
            retry: RetryConfig::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| {
        ConfigError::ValidationError(format!("{name} must be a non-negative integer, got: {raw:?}"))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn configured(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();
        config.apply_env_with(env(pairs))?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.memory.size, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.openai.model, "gpt-4o-mini");
    }

    #[test]
    fn default_config_without_key_is_rejected() {
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn openai_from_env() {
        let config = configured(&[
            ("LLM_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("MEMORY_SIZE", "4"),
        ])
        .unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.active_provider().model, "gpt-4o");
        assert_eq!(config.memory.size, 4);
    }

    #[test]
    fn anthropic_requires_its_own_key() {
        let err = configured(&[("LLM_PROVIDER", "anthropic"), ("OPENAI_API_KEY", "sk-test")])
            .unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

        let config = configured(&[("LLM_PROVIDER", "anthropic"), ("ANTHROPIC_API_KEY", "sk-ant")])
            .unwrap();
        assert_eq!(config.active_provider().model, "claude-3-5-haiku-latest");
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = configured(&[("LLM_PROVIDER", "gemini")]).unwrap_err();
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn invalid_memory_size_rejected() {
        assert!(configured(&[("OPENAI_API_KEY", "k"), ("MEMORY_SIZE", "0")]).is_err());
        assert!(configured(&[("OPENAI_API_KEY", "k"), ("MEMORY_SIZE", "ten")]).is_err());
        assert!(configured(&[("OPENAI_API_KEY", "k"), ("MEMORY_SIZE", "-3")]).is_err());
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = configured(&[("OPENAI_API_KEY", "k"), ("OPENAI_MODEL", "  ")]).unwrap();
        assert_eq!(config.openai.model, "gpt-4o-mini");
    }

    #[test]
    fn retry_overrides() {
        let config = configured(&[
            ("OPENAI_API_KEY", "k"),
            ("LLM_RETRY_ATTEMPTS", "5"),
            ("LLM_RETRY_BASE_MS", "250"),
            ("LLM_RETRY_MAX_MS", "4000"),
            ("LLM_TIMEOUT_SECS", "15"),
        ])
        .unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(250));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(4));
        assert_eq!(config.retry.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(configured(&[("OPENAI_API_KEY", "k"), ("LLM_RETRY_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn allowed_users_parsed() {
        let config = configured(&[
            ("OPENAI_API_KEY", "k"),
            ("TELEGRAM_ALLOWED_USERS", "111, 222,,333"),
        ])
        .unwrap();
        assert_eq!(config.telegram.allowed_users, vec!["111", "222", "333"]);
    }

    #[test]
    fn telegram_token_required_on_demand() {
        let config = configured(&[("OPENAI_API_KEY", "k")]).unwrap();
        assert!(config.require_telegram_token().is_err());

        let config =
            configured(&[("OPENAI_API_KEY", "k"), ("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
        assert_eq!(config.require_telegram_token().unwrap(), "123:abc");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = configured(&[
            ("OPENAI_API_KEY", "sk-secret"),
            ("TELEGRAM_BOT_TOKEN", "123:secret"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("123:secret"));
        assert!(debug.contains("[REDACTED]"));

        let toml_str = config.to_redacted_toml();
        assert!(!toml_str.contains("sk-secret"));
        assert!(toml_str.contains("gpt-4o-mini"));
    }

    #[test]
    fn toml_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
provider = "anthropic"
system_prompt = "Answer like a pirate."

[anthropic]
api_key = "sk-ant-file"
model = "claude-3-5-sonnet-latest"

[memory]
size = 6
"#,
        )
        .unwrap();

        let mut config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.memory.size, 6);
        assert_eq!(config.openai.model, "gpt-4o-mini");

        config.apply_env_with(env(&[("MEMORY_SIZE", "2")])).unwrap();
        config.validate().unwrap();
        assert_eq!(config.memory.size, 2);
        assert_eq!(config.system_prompt, "Answer like a pirate.");
    }

    #[test]
    fn non_finite_multiplier_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for value in ["nan", "inf", "0.5"] {
            std::fs::write(&path, format!("[retry]\nmultiplier = {value}\n")).unwrap();
            let mut config = AppConfig::load_from(&path).unwrap();
            config.apply_env_with(env(&[("OPENAI_API_KEY", "k")])).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::ValidationError(_))),
                "multiplier {value} should be rejected"
            );
        }
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.memory.size, 10);
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
