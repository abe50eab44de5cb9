use crate::account::AccountId;
use crate::classifier::Thresholds;
use crate::dispatch::rate_limit::RateLimitStrategy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};

/// Recognised configuration surface (spec.md §6). Loading from file or
/// environment is owned by the out-of-scope CLI front-end; the core only
/// validates an already-constructed [`Config`].
#[derive(Clone, Deserialize, Serialize)]
pub struct Config {
    pub watched_accounts: Vec<AccountId>,
    pub upstream_url: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    pub channels: ChannelsConfig,
    #[serde(default = "default_dedup_window_seconds")]
    pub dedup_window_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_seconds")]
    pub retry_base_delay_seconds: u64,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

fn default_dedup_window_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_seconds() -> u64 {
    5
}

fn default_ring_capacity() -> usize {
    1000
}

impl Config {
    /// Validate static invariants that must hold before [`crate::Core`]
    /// is constructed. The only fatal error kind (spec.md §7).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watched_accounts.is_empty() {
            return Err(ConfigError::EmptyWatchedAccounts);
        }

        if !self.thresholds.validate() {
            return Err(ConfigError::InvalidThresholdOrdering(self.thresholds));
        }

        url::Url::parse(&self.upstream_url)
            .map_err(|err| ConfigError::InvalidUpstreamUrl(err.to_string()))?;

        self.channels.discord.validate("discord")?;
        self.channels.telegram.validate("telegram")?;
        self.channels.email.validate("email")?;
        self.channels.webhook.validate("webhook")?;

        Ok(())
    }
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Redacts credential fields; channel credentials must never be logged
/// (grounded in `core/config.py` of the original implementation).
macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* } secret: [$($secret:ident),*]) => {
        impl Debug for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    $(.field(stringify!($secret), &"<redacted>"))*
                    .finish()
            }
        }
    };
}

#[derive(Clone, Deserialize, Serialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitStrategy>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            rate_limit: None,
        }
    }
}

redacted_debug!(DiscordConfig { enabled, rate_limit } secret: [webhook_url]);

impl DiscordConfig {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.enabled && self.webhook_url.is_none() {
            return Err(ConfigError::MissingCredential {
                channel: name,
                field: "webhook_url",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitStrategy>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            rate_limit: None,
        }
    }
}

redacted_debug!(TelegramConfig { enabled, chat_id, rate_limit } secret: [bot_token]);

impl TelegramConfig {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.bot_token.is_none() {
            return Err(ConfigError::MissingCredential {
                channel: name,
                field: "bot_token",
            });
        }
        if self.chat_id.is_none() {
            return Err(ConfigError::MissingCredential {
                channel: name,
                field: "chat_id",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitStrategy>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: None,
            username: None,
            password: None,
            to: None,
            rate_limit: None,
        }
    }
}

redacted_debug!(EmailConfig { enabled, smtp_server, to, rate_limit } secret: [username, password]);

impl EmailConfig {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.smtp_server.is_none() {
            return Err(ConfigError::MissingCredential {
                channel: name,
                field: "smtp_server",
            });
        }
        if self.to.is_none() {
            return Err(ConfigError::MissingCredential {
                channel: name,
                field: "to",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitStrategy>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            headers: Default::default(),
            rate_limit: None,
        }
    }
}

redacted_debug!(WebhookConfig { enabled, headers, rate_limit } secret: [url]);

impl WebhookConfig {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.enabled && self.url.is_none() {
            return Err(ConfigError::MissingCredential {
                channel: name,
                field: "url",
            });
        }
        Ok(())
    }
}
