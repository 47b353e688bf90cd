//! Configuration loading.
//!
//! Settings come either from the command line (see [`Flags`]) or, when no token was given there,
//! from a configuration file. The file is YAML unless its extension is `.toml`:
//!
//! ```yaml
//! token: sk-...
//! httpProxyUrl: http://127.0.0.1:7890
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{Api, conversation::Conversation, openai, transport::TransportConfig};

/// Configuration file read when no token is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Errors that can occur while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile { path: String, source: io::Error },

    #[error("failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Neither the command line nor the config file provided a token.
    #[error("no API token given, pass --token or set `token` in '{path}'")]
    MissingToken { path: String },

    #[error("invalid proxy URL '{url}': {source}")]
    InvalidProxy {
        url: String,
        source: url::ParseError,
    },
}

/// Command-line settings.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct Flags {
    /// API token; when given, no config file is read
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub token: Option<String>,

    /// Proxy for all requests, e.g. http://127.0.0.1:7890
    #[arg(long = "http-proxy-url", alias = "httpProxyUrl", value_name = "URL")]
    pub http_proxy_url: Option<String>,

    /// Config file read when no token is given
    #[arg(short, long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: PathBuf,

    /// Model to use
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum number of tokens per reply
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// API host, for OpenAI-compatible services
    #[arg(long)]
    pub endpoint_host: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
}

/// Contents of a configuration file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    pub token: Option<String>,
    pub http_proxy_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub endpoint_host: Option<String>,
    pub system_prompt: Option<String>,
    pub insecure_skip_verify: bool,
}

impl FileConfig {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a config file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;

        debug!(path = %path.display(), "loaded config file");
        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml(&content)
        } else {
            Self::from_yaml(&content)
        }
    }
}

/// Fully resolved settings.
#[derive(Clone, Debug, PartialEq)]
pub struct UserConfig {
    pub token: String,
    pub proxy: Option<Url>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub endpoint_host: Option<String>,
    pub system_prompt: Option<String>,
    pub insecure_skip_verify: bool,
}

impl UserConfig {
    /// Resolves the settings from the command line, falling back to the config file.
    ///
    /// A token on the command line means the file is not read at all. Otherwise the file must
    /// exist and provide a token. Remaining flags override file values.
    pub fn resolve(flags: Flags) -> Result<Self, ConfigError> {
        let mut config = match non_empty(flags.token) {
            Some(token) => {
                info!("using token from the command line");
                Self::with_token(token)
            }
            None => Self::from_file(FileConfig::load(&flags.config_path)?, &flags.config_path)?,
        };

        if let Some(proxy) = parse_proxy(flags.http_proxy_url)? {
            config.proxy = Some(proxy);
        }
        if let Some(model) = flags.model {
            config.model = Some(model);
        }
        if let Some(max_tokens) = flags.max_tokens {
            config.max_tokens = Some(max_tokens);
        }
        if let Some(endpoint_host) = flags.endpoint_host {
            config.endpoint_host = Some(endpoint_host);
        }
        config.insecure_skip_verify |= flags.insecure;

        Ok(config)
    }

    fn with_token(token: String) -> Self {
        Self {
            token,
            proxy: None,
            model: None,
            max_tokens: None,
            endpoint_host: None,
            system_prompt: None,
            insecure_skip_verify: false,
        }
    }

    fn from_file(file: FileConfig, path: &Path) -> Result<Self, ConfigError> {
        let token = non_empty(file.token).ok_or_else(|| ConfigError::MissingToken {
            path: path.display().to_string(),
        })?;

        Ok(Self {
            proxy: parse_proxy(file.http_proxy_url)?,
            model: file.model,
            max_tokens: file.max_tokens,
            endpoint_host: file.endpoint_host,
            system_prompt: file.system_prompt,
            insecure_skip_verify: file.insecure_skip_verify,
            ..Self::with_token(token)
        })
    }

    /// The API configuration to build requests with.
    pub fn api(&self) -> Api {
        let mut api = Api::new(self.token.as_str());
        if let Some(ref model) = self.model {
            api = api.default_model(model.as_str());
        }
        if let Some(max_tokens) = self.max_tokens {
            api = api.default_max_tokens(max_tokens);
        }
        if let Some(ref endpoint_host) = self.endpoint_host {
            api = api.endpoint_host(endpoint_host.as_str());
        }
        api
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            proxy: self.proxy.clone(),
            accept_invalid_certs: self.insecure_skip_verify,
            ..TransportConfig::default()
        }
    }

    /// A fresh conversation seeded with the configured system prompt.
    pub fn conversation(&self) -> Conversation {
        Conversation::new(
            self.system_prompt
                .as_deref()
                .unwrap_or(openai::DEFAULT_SYSTEM_PROMPT),
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_proxy(raw: Option<String>) -> Result<Option<Url>, ConfigError> {
    non_empty(raw)
        .map(|url| Url::parse(&url).map_err(|source| ConfigError::InvalidProxy { url, source }))
        .transpose()
}
