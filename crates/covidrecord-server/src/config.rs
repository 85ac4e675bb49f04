use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use covidrecord_providers::config::{DEFAULT_MAX_PAGES, DEFAULT_REQUEST_TIMEOUT};
use covidrecord_providers::ProviderConfig;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Outbound request settings shared by both providers
    #[serde(default)]
    pub http: HttpConfig,
    /// Authorization state lifetime
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default = "ProviderSettings::bluebutton_sandbox")]
    pub bluebutton: ProviderSettings,
    #[serde(default = "ProviderSettings::lighthouse_sandbox")]
    pub lighthouse: ProviderSettings,
    /// Synthetic records for demo patients
    #[serde(default)]
    pub demo: DemoConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
            state: StateConfig::default(),
            bluebutton: ProviderSettings::bluebutton_sandbox(),
            lighthouse: ProviderSettings::lighthouse_sandbox(),
            demo: DemoConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.http.request_timeout.is_zero() {
            return Err("http.request_timeout must be > 0".into());
        }
        if self.http.max_pages == 0 {
            return Err("http.max_pages must be > 0".into());
        }
        if self.state.ttl.is_zero() {
            return Err("state.ttl must be > 0".into());
        }
        self.bluebutton_config()?;
        self.lighthouse_config()?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Builds the Blue Button client configuration.
    pub fn bluebutton_config(&self) -> Result<ProviderConfig, String> {
        self.bluebutton.to_provider_config("bluebutton", &self.http)
    }

    /// Builds the Lighthouse client configuration.
    pub fn lighthouse_config(&self) -> Result<ProviderConfig, String> {
        self.lighthouse.to_provider_config("lighthouse", &self.http)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    6655
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}
fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}
fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}
fn default_state_ttl() -> Duration {
    covidrecord_providers::state::DEFAULT_STATE_TTL
}
impl Default for StateConfig {
    fn default() -> Self {
        Self {
            ttl: default_state_ttl(),
        }
    }
}

/// Client registration for one provider.
///
/// `fhir_url` defaults to `auth_url` for services that serve both from the
/// same host.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub auth_url: String,
    #[serde(default)]
    pub fhir_url: Option<String>,
    pub callback_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ProviderSettings {
    pub fn bluebutton_sandbox() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://sandbox.bluebutton.cms.gov".into(),
            fhir_url: None,
            callback_url: "http://localhost:6655/bbcallback".into(),
            scopes: Vec::new(),
        }
    }

    pub fn lighthouse_sandbox() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://sandbox-api.va.gov/oauth2/health/v1".into(),
            fhir_url: Some("https://sandbox-api.va.gov/services/fhir/v0/r4".into()),
            callback_url: "http://localhost:6655/callback".into(),
            scopes: Vec::new(),
        }
    }

    fn to_provider_config(&self, section: &str, http: &HttpConfig) -> Result<ProviderConfig, String> {
        let parse = |field: &str, value: &str| {
            Url::parse(value).map_err(|e| format!("{section}.{field} is not a valid URL: {e}"))
        };

        let auth_base_url = parse("auth_url", &self.auth_url)?;
        let fhir_base_url = match self.fhir_url.as_deref() {
            Some(url) if !url.is_empty() => parse("fhir_url", url)?,
            _ => auth_base_url.clone(),
        };
        let callback_url = parse("callback_url", &self.callback_url)?;

        let config = ProviderConfig::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            auth_base_url,
            fhir_base_url,
            callback_url,
        )
        .with_scopes(self.scopes.iter().cloned())
        .with_request_timeout(http.request_timeout)
        .with_max_pages(http.max_pages);

        config
            .validate()
            .map_err(|e| format!("{section} config error: {e}"))?;
        Ok(config)
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("fhir_url", &self.fhir_url)
            .field("callback_url", &self.callback_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Demo mode answers known sandbox patients with synthetic doses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Patient id to number of synthetic doses
    #[serde(default = "default_demo_patients")]
    pub patients: BTreeMap<String, usize>,
}

fn default_demo_patients() -> BTreeMap<String, usize> {
    BTreeMap::from([
        ("-19990000000001".to_string(), 2),
        ("-20000000001112".to_string(), 1),
    ])
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            patients: default_demo_patients(),
        }
    }
}

impl DemoConfig {
    /// Returns the synthetic dose count for `patient_id` when demo mode is on.
    pub fn doses_for(&self, patient_id: &str) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        self.patients.get(patient_id).copied()
    }
}

pub mod loader {
    use super::{AppConfig, ProviderSettings};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        // A section that only sets credentials keeps the sandbox URLs.
        for (section, settings) in [
            ("bluebutton", ProviderSettings::bluebutton_sandbox()),
            ("lighthouse", ProviderSettings::lighthouse_sandbox()),
        ] {
            builder = builder
                .set_default(format!("{section}.auth_url"), settings.auth_url)
                .and_then(|b| b.set_default(format!("{section}.callback_url"), settings.callback_url))
                .map_err(|e| format!("config default error: {e}"))?;
            if let Some(fhir_url) = settings.fhir_url {
                builder = builder
                    .set_default(format!("{section}.fhir_url"), fhir_url)
                    .map_err(|e| format!("config default error: {e}"))?;
            }
        }
        let pathbuf = PathBuf::from(path.unwrap_or("covidrecord.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., COVIDRECORD__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("COVIDRECORD")
                .try_parsing(true)
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("bluebutton.scopes")
                .with_list_parse_key("lighthouse.scopes"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
