use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const ENV_SMS_USERNAME: &str = "CLICKSEND_USERNAME";
pub const ENV_SMS_API_KEY: &str = "CLICKSEND_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which marketplace adapter drives the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// JSON inventory endpoint (`responseData[]`).
    StructuredApi,
    /// HTML page with the listing grid in a `<script>` payload.
    EmbeddedJson,
    /// Page rendered in a headless browser, listings read from DOM text.
    RenderedDom,
}

impl std::str::FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured_api" | "structured" | "api" => Ok(SourceKind::StructuredApi),
            "embedded_json" | "embedded" => Ok(SourceKind::EmbeddedJson),
            "rendered_dom" | "rendered" | "browser" => Ok(SourceKind::RenderedDom),
            other => Err(ConfigError::Invalid(format!("unknown source kind '{}'", other))),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::StructuredApi => write!(f, "structured_api"),
            SourceKind::EmbeddedJson => write!(f, "embedded_json"),
            SourceKind::RenderedDom => write!(f, "rendered_dom"),
        }
    }
}

/// Which unseen tickets get recorded in the dedup store once selection ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkPolicy {
    /// Only the cheapest ticket.
    Selected,
    /// Every unseen candidate of the batch, winner included.
    AllCandidates,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Marketplace endpoint or page polled every cycle.
    #[serde(default)]
    pub url: String,
    /// Group size a structured listing must be splittable into.
    #[serde(default = "default_required_split")]
    pub required_split: u32,
    /// Prefix of deep links sent in notifications (structured variant).
    #[serde(default = "default_link_base")]
    pub link_base: String,
    /// Element id of the `<script>` carrying the embedded payload.
    #[serde(default = "default_script_id")]
    pub script_id: String,
    /// CSS selector of one listing block on a rendered page.
    #[serde(default = "default_listing_selector")]
    pub listing_selector: String,
    /// CSS selector that must be visible before listings are read.
    #[serde(default = "default_ready_selector")]
    pub ready_selector: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Extra wait after the ready marker appears, for late XHR-driven rows.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Overrides the variant's default mark policy.
    #[serde(default)]
    pub mark: Option<MarkPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// Highest price (inclusive) worth a notification, in major units.
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// E.164 numbers, each notified independently.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Log messages instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
    /// Gateway username - loaded from env CLICKSEND_USERNAME
    #[serde(default)]
    pub username: String,
    /// Gateway API key - loaded from env CLICKSEND_KEY
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on one cycle (fetch through notify).
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_required_split() -> u32 {
    2
}
fn default_link_base() -> String {
    "https://www.twickets.live/app/block/".to_string()
}
fn default_script_id() -> String {
    "index-data".to_string()
}
fn default_listing_selector() -> String {
    ".details-container".to_string()
}
fn default_ready_selector() -> String {
    ".container.sort-filter-row.list-group-item".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_ready_timeout() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    500
}
fn default_max_price() -> Decimal {
    Decimal::from(115)
}
fn default_currency_symbol() -> String {
    "£".to_string()
}
fn default_gateway_url() -> String {
    "https://rest.clicksend.com/v3/sms/send".to_string()
}
fn default_interval_secs() -> u64 {
    10
}
fn default_cycle_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl SourceConfig {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            required_split: default_required_split(),
            link_base: default_link_base(),
            script_id: default_script_id(),
            listing_selector: default_listing_selector(),
            ready_selector: default_ready_selector(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            ready_timeout_secs: default_ready_timeout(),
            settle_ms: default_settle_ms(),
            mark: None,
        }
    }

    /// Effective mark policy: explicit override, else the variant default.
    pub fn mark_policy(&self) -> MarkPolicy {
        self.mark.unwrap_or(match self.kind {
            SourceKind::StructuredApi | SourceKind::RenderedDom => MarkPolicy::AllCandidates,
            SourceKind::EmbeddedJson => MarkPolicy::Selected,
        })
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_price: default_max_price(),
            currency_symbol: default_currency_symbol(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            recipients: Vec::new(),
            dry_run: false,
            username: String::new(),
            api_key: String::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a default config from environment variables only (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        let kind = match std::env::var("TICKETWATCH_SOURCE_KIND") {
            Ok(kind) => kind.parse()?,
            Err(_) => SourceKind::StructuredApi,
        };
        let mut config = Config {
            source: SourceConfig::new(kind, String::new()),
            selection: SelectionConfig::default(),
            notify: NotifyConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay deploy-time values and secrets. `lookup` is `std::env::var`
    /// outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("TICKETWATCH_SOURCE_KIND") {
            self.source.kind = kind.parse()?;
        }
        if let Some(url) = lookup("TICKETWATCH_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(base) = lookup("TICKETWATCH_LINK_BASE") {
            self.source.link_base = base;
        }
        if let Some(list) = lookup("TICKETWATCH_RECIPIENTS") {
            self.notify.recipients = list
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(max) = lookup("TICKETWATCH_MAX_PRICE") {
            self.selection.max_price = max
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("TICKETWATCH_MAX_PRICE={}", max)))?;
        }
        if let Some(secs) = lookup("TICKETWATCH_INTERVAL_SECS") {
            self.scheduler.interval_secs = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("TICKETWATCH_INTERVAL_SECS={}", secs)))?;
        }

        // Secrets are never read from the config file.
        self.notify.username = lookup(ENV_SMS_USERNAME).unwrap_or_default();
        self.notify.api_key = lookup(ENV_SMS_API_KEY).unwrap_or_default();
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        !self.notify.username.is_empty() && !self.notify.api_key.is_empty()
    }

    /// Startup gate. Anything returned here aborts the process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "source.url is empty (set it in the config file or TICKETWATCH_SOURCE_URL)".into(),
            ));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Invalid("scheduler.interval_secs must be > 0".into()));
        }
        if self.selection.max_price.is_sign_negative() {
            return Err(ConfigError::Invalid(format!(
                "selection.max_price must not be negative, got {}",
                self.selection.max_price
            )));
        }
        if self.notify.dry_run {
            return Ok(());
        }
        if !self.has_credentials() {
            let missing = if self.notify.username.is_empty() {
                ENV_SMS_USERNAME
            } else {
                ENV_SMS_API_KEY
            };
            return Err(ConfigError::MissingEnv(missing.to_string()));
        }
        if self.notify.recipients.is_empty() {
            return Err(ConfigError::Invalid("notify.recipients is empty".into()));
        }
        Ok(())
    }
}
