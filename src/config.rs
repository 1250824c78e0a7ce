use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to build OAuth redirect URIs
    #[serde(default)]
    pub public_url: Option<String>,
}

impl ServerConfig {
    /// Returns the configured public URL, or `https://{host}:{port}` when
    /// none is set.
    pub fn effective_public_url(&self) -> String {
        match self.public_url.as_deref() {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("https://{}:{}", self.host, self.port),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub app_id: String,
    pub app_secret: String,
    pub webhook_secret: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_api_url() -> String {
    "https://api.watsonwork.ibm.com".to_string()
}

fn default_log_level() -> String {
    "info,workspace_bot=debug".to_string()
}

fn env_any(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content, |name| std::env::var(name).ok())
    }

    /// Single-bot configuration from `APP_ID`, `APP_SECRET` and
    /// `WEBHOOK_SECRET`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_toml(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.apply_server_overrides(&lookup, false)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot = BotConfig {
            app_id: env_any(&lookup, &["APP_ID"]).context("APP_ID is not set")?,
            app_secret: env_any(&lookup, &["APP_SECRET"]).context("APP_SECRET is not set")?,
            webhook_secret: env_any(&lookup, &["WEBHOOK_SECRET"])
                .context("WEBHOOK_SECRET is not set")?,
        };

        let mut config = Config {
            server: ServerConfig::default(),
            workspace: WorkspaceConfig::default(),
            logging: LoggingConfig::default(),
            bots: vec![bot],
        };
        if let Some(api_url) = env_any(&lookup, &["WORKSPACE_API_URL"]) {
            config.workspace.api_url = api_url;
        }
        if let Some(level) = env_any(&lookup, &["LOG_LEVEL"]) {
            config.logging.level = level;
        }
        config.apply_server_overrides(&lookup, true)?;
        config.validate()?;
        Ok(config)
    }

    // Hosting platforms hand out the bind address through the environment,
    // upper or lower case. HOSTNAME is only honoured without a config file since
    // most shells export it as the machine name.
    fn apply_server_overrides(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
        with_host: bool,
    ) -> Result<()> {
        if with_host {
            if let Some(host) = env_any(lookup, &["HOSTNAME", "hostname"]) {
                self.server.host = host;
            }
        }
        if let Some(port) = env_any(lookup, &["PORT", "port"]) {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(url) = env_any(lookup, &["PUBLIC_URL"]) {
            self.server.public_url = Some(url);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.bots.is_empty() {
            bail!("No bots configured; add a [[bots]] section or set APP_ID");
        }
        for bot in &self.bots {
            if bot.app_id.is_empty() {
                bail!("A configured bot has an empty app_id");
            }
            if bot.app_id.contains('/') {
                bail!("Bot app_id '{}' must not contain '/'", bot.app_id);
            }
        }
        let mut seen = std::collections::HashSet::new();
        for bot in &self.bots {
            if !seen.insert(bot.app_id.as_str()) {
                bail!("Bot '{}' is configured more than once", bot.app_id);
            }
        }
        Ok(())
    }
}
