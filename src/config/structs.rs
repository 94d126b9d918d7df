use serde::{Deserialize, Serialize};

use crate::errors::{ClickGuardError, Result};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 服务器地址、端口、CPU 数量
/// - database: 数据库连接与重试配置
/// - logging: 日志配置
/// - api: 可信代理与 CORS
/// - fraud: 评分阈值
/// - auto_block: 自动封禁参数
/// - scheduler: 后台任务间隔与数据保留
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub fraud: FraudConfig,
    #[serde(default)]
    pub auto_block: AutoBlockConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：CG，分隔符：__
    /// 示例：CG__FRAUD__FRAUD_SCORE_THRESHOLD=80
    pub fn load(path: &str) -> Result<Self> {
        use config::{Config, Environment, File};

        let settings = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖
            .add_source(
                Environment::with_prefix("CG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.trusted_proxies")
                    .with_list_parse_key("api.cors_allowed_origins"),
            )
            .build()?;

        let config: StaticConfig = settings.try_deserialize()?;

        if std::path::Path::new(path).exists() {
            eprintln!("[INFO] Configuration loaded from: {}", path);
        }

        config.validate()?;
        Ok(config)
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClickGuardError::serialization(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" 或 "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// HTTP API 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// 可信反向代理（IP 或 CIDR），为空时对私有地址自动信任 X-Forwarded-For
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    /// 允许的跨域来源，"*" 表示任意来源，为空则不开启 CORS
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

/// 评分阈值（全局默认，站点可覆盖）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    #[serde(default = "default_max_clicks_per_hour")]
    pub max_clicks_per_hour: u32,
    /// 秒
    #[serde(default = "default_min_time_on_site")]
    pub min_time_on_site: f64,
    #[serde(default = "default_fraud_score_threshold")]
    pub fraud_score_threshold: u8,
    #[serde(default = "default_suspicious_floor")]
    pub suspicious_floor: u8,
    #[serde(default = "default_true")]
    pub auto_block_enabled: bool,
    /// 缺失/降级输入达到该数量时标记 low_confidence
    #[serde(default = "default_low_confidence_missing_inputs")]
    pub low_confidence_missing_inputs: u8,
}

/// 广告平台排除列表最多接受的 IP 数
pub const AD_NETWORK_EXPORT_CAP: u32 = 25;

/// 自动和手动封禁时长上限（天）
pub const MAX_BLOCK_DURATION_DAYS: u32 = 3650;

/// 自动封禁配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBlockConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_min_events")]
    pub min_events: u32,
    #[serde(default = "default_score_floor")]
    pub score_floor: u8,
    #[serde(default = "default_block_duration_days")]
    pub block_duration_days: u32,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: u32,
    /// 欺诈事件触发异步自动封禁所需的最少小时点击数
    #[serde(default = "default_trigger_min_clicks")]
    pub trigger_min_clicks: u64,
    #[serde(default = "default_export_limit")]
    pub export_limit: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// 后台任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_auto_block_interval_mins")]
    pub auto_block_interval_mins: u64,
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
    #[serde(default = "default_event_retention_days")]
    pub event_retention_days: u32,
    #[serde(default = "default_rate_limiter_gc_secs")]
    pub rate_limiter_gc_secs: u64,
}

// ============================================================
// Default value functions
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3001
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "sqlite://clickguard.db?mode=rwc".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_max_clicks_per_hour() -> u32 {
    5
}

fn default_min_time_on_site() -> f64 {
    3.0
}

fn default_fraud_score_threshold() -> u8 {
    70
}

fn default_suspicious_floor() -> u8 {
    40
}

fn default_low_confidence_missing_inputs() -> u8 {
    2
}

fn default_window_hours() -> u32 {
    24
}

fn default_min_events() -> u32 {
    3
}

fn default_score_floor() -> u8 {
    60
}

fn default_block_duration_days() -> u32 {
    7
}

fn default_max_candidates() -> u32 {
    50
}

fn default_trigger_min_clicks() -> u64 {
    3
}

fn default_export_limit() -> u32 {
    AD_NETWORK_EXPORT_CAP
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_auto_block_interval_mins() -> u64 {
    60
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_event_retention_days() -> u32 {
    30
}

fn default_rate_limiter_gc_secs() -> u64 {
    300
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            max_clicks_per_hour: default_max_clicks_per_hour(),
            min_time_on_site: default_min_time_on_site(),
            fraud_score_threshold: default_fraud_score_threshold(),
            suspicious_floor: default_suspicious_floor(),
            auto_block_enabled: true,
            low_confidence_missing_inputs: default_low_confidence_missing_inputs(),
        }
    }
}

impl Default for AutoBlockConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            min_events: default_min_events(),
            score_floor: default_score_floor(),
            block_duration_days: default_block_duration_days(),
            max_candidates: default_max_candidates(),
            trigger_min_clicks: default_trigger_min_clicks(),
            export_limit: default_export_limit(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_block_interval_mins: default_auto_block_interval_mins(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
            event_retention_days: default_event_retention_days(),
            rate_limiter_gc_secs: default_rate_limiter_gc_secs(),
        }
    }
}
