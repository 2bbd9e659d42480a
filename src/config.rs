use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub credits: CreditConfig,
    pub job: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Search provider (Serper-compatible) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub qps: u32,
    pub num: u32,
    pub timeout_secs: u64,
    pub cost_per_1k_usd: f64,
}

/// LLM provider (OpenAI-compatible chat completions) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_secs: f64,
    pub use_json_response_format: bool,
    pub timeout_secs: u64,
    pub input_cost_per_m_usd: f64,
    pub output_cost_per_m_usd: f64,
    pub openrouter_site_url: Option<String>,
    pub openrouter_app_name: Option<String>,
}

/// Credit-engine plan table and default expiry policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    pub topup_expiry_days: i64,
}

/// Job Runner + research-cache tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub concurrency: usize,
    pub max_people_per_company: usize,
    pub cache_max_items: usize,
    pub cache_ttl_secs: u64,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "decision-engine")]
#[command(version, about = "Decision-maker research engine")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g. "info,decision_engine=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Job-runner concurrency (overrides config file)
    #[arg(long, value_name = "N")]
    pub job_concurrency: Option<usize>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT / APP_DATABASE_URL / APP_LOG_LEVEL
    /// - SEARCH_API_KEY / SERPER_QPS / SERPER_NUM / SERPER_COST_PER_1K
    /// - LLM_API_KEY / LLM_CONCURRENCY / LLM_MAX_RETRIES / LLM_RETRY_BASE_S
    /// - LLM_INPUT_COST_PER_M / LLM_OUTPUT_COST_PER_M
    /// - JOB_CONCURRENCY / MAX_PEOPLE_PER_COMPANY
    /// - SCRAPER_CACHE_MAX_ITEMS / SCRAPER_CACHE_TTL_S
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
        }
        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(key) = std::env::var("SEARCH_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Ok(qps) = std::env::var("SERPER_QPS")
            && let Ok(qps) = qps.parse()
        {
            self.search.qps = qps;
        }
        if let Ok(num) = std::env::var("SERPER_NUM")
            && let Ok(num) = num.parse()
        {
            self.search.num = num;
        }
        if let Ok(v) = std::env::var("SERPER_COST_PER_1K")
            && let Ok(v) = v.parse()
        {
            self.search.cost_per_1k_usd = v;
        }

        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(v) = std::env::var("LLM_CONCURRENCY")
            && let Ok(v) = v.parse()
        {
            self.llm.concurrency = v;
        }
        if let Ok(v) = std::env::var("LLM_MAX_RETRIES")
            && let Ok(v) = v.parse()
        {
            self.llm.max_retries = v;
        }
        if let Ok(v) = std::env::var("LLM_RETRY_BASE_S")
            && let Ok(v) = v.parse()
        {
            self.llm.retry_base_secs = v;
        }
        if let Ok(v) = std::env::var("LLM_USE_JSON_RESPONSE_FORMAT")
            && let Ok(v) = v.parse()
        {
            self.llm.use_json_response_format = v;
        }
        if let Ok(v) = std::env::var("LLM_INPUT_COST_PER_M")
            && let Ok(v) = v.parse()
        {
            self.llm.input_cost_per_m_usd = v;
        }
        if let Ok(v) = std::env::var("LLM_OUTPUT_COST_PER_M")
            && let Ok(v) = v.parse()
        {
            self.llm.output_cost_per_m_usd = v;
        }

        if let Ok(v) = std::env::var("JOB_CONCURRENCY")
            && let Ok(v) = v.parse()
        {
            self.job.concurrency = clamp_usize(v, 1, 500);
        }
        if let Ok(v) = std::env::var("MAX_PEOPLE_PER_COMPANY")
            && let Ok(v) = v.parse()
        {
            self.job.max_people_per_company = clamp_usize(v, 1, 100);
        }
        if let Ok(v) = std::env::var("SCRAPER_CACHE_MAX_ITEMS")
            && let Ok(v) = v.parse()
        {
            self.job.cache_max_items = v;
        }
        if let Ok(v) = std::env::var("SCRAPER_CACHE_TTL_S")
            && let Ok(v) = v.parse()
        {
            self.job.cache_ttl_secs = v;
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.server_port {
            self.server.port = port;
        }
        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(n) = args.job_concurrency {
            self.job.concurrency = clamp_usize(n, 1, 500);
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.job.concurrency == 0 {
            anyhow::bail!("job.concurrency must be > 0");
        }
        if self.llm.concurrency == 0 {
            anyhow::bail!("llm.concurrency must be > 0");
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];
        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

fn clamp_usize(v: usize, lo: usize, hi: usize) -> usize {
    v.clamp(lo, hi)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/decision-engine.db".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,decision_engine=debug".to_string(),
            file: Some("logs/decision-engine.log".to_string()),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://google.serper.dev/search".to_string(),
            api_key: None,
            qps: 50,
            num: 10,
            timeout_secs: 20,
            cost_per_1k_usd: 1.0,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            concurrency: 50,
            max_retries: 4,
            retry_base_secs: 0.7,
            use_json_response_format: true,
            timeout_secs: 60,
            input_cost_per_m_usd: 0.15,
            output_cost_per_m_usd: 0.60,
            openrouter_site_url: None,
            openrouter_app_name: None,
        }
    }
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self { topup_expiry_days: 90 }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            concurrency: 25,
            max_people_per_company: 25,
            cache_max_items: 5000,
            cache_ttl_secs: 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_job_concurrency_is_invalid() {
        let mut config = Config::default();
        config.job.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamp_usize_bounds() {
        assert_eq!(clamp_usize(0, 1, 500), 1);
        assert_eq!(clamp_usize(10_000, 1, 500), 500);
        assert_eq!(clamp_usize(25, 1, 500), 25);
    }
}
