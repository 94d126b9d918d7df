use std::fmt;

#[derive(Debug, Clone)]
pub enum ClickGuardError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Validation(String),
    SiteNotFound(String),
    Blocked(String),
    Config(String),
    Serialization(String),
    FileOperation(String),
    Queue(String),
}

impl ClickGuardError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ClickGuardError::DatabaseConfig(_) => "E001",
            ClickGuardError::DatabaseConnection(_) => "E002",
            ClickGuardError::DatabaseOperation(_) => "E003",
            ClickGuardError::Validation(_) => "E004",
            ClickGuardError::SiteNotFound(_) => "E005",
            ClickGuardError::Blocked(_) => "E006",
            ClickGuardError::Config(_) => "E007",
            ClickGuardError::Serialization(_) => "E008",
            ClickGuardError::FileOperation(_) => "E009",
            ClickGuardError::Queue(_) => "E010",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ClickGuardError::DatabaseConfig(_) => "Database Configuration Error",
            ClickGuardError::DatabaseConnection(_) => "Database Connection Error",
            ClickGuardError::DatabaseOperation(_) => "Database Operation Error",
            ClickGuardError::Validation(_) => "Validation Error",
            ClickGuardError::SiteNotFound(_) => "Site Not Found",
            ClickGuardError::Blocked(_) => "Access Blocked",
            ClickGuardError::Config(_) => "Configuration Error",
            ClickGuardError::Serialization(_) => "Serialization Error",
            ClickGuardError::FileOperation(_) => "File Operation Error",
            ClickGuardError::Queue(_) => "Job Queue Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ClickGuardError::DatabaseConfig(msg)
            | ClickGuardError::DatabaseConnection(msg)
            | ClickGuardError::DatabaseOperation(msg)
            | ClickGuardError::Validation(msg)
            | ClickGuardError::SiteNotFound(msg)
            | ClickGuardError::Blocked(msg)
            | ClickGuardError::Config(msg)
            | ClickGuardError::Serialization(msg)
            | ClickGuardError::FileOperation(msg)
            | ClickGuardError::Queue(msg) => msg,
        }
    }

    /// 是否属于客户端错误（不应记录为服务端故障）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClickGuardError::Validation(_)
                | ClickGuardError::SiteNotFound(_)
                | ClickGuardError::Blocked(_)
        )
    }

    /// 格式化为彩色输出（用于 Server 模式）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ClickGuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ClickGuardError {}

// 便捷的构造函数
impl ClickGuardError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::DatabaseOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::Validation(msg.into())
    }

    pub fn site_not_found<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::SiteNotFound(msg.into())
    }

    pub fn blocked<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::Blocked(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::Config(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::Serialization(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::FileOperation(msg.into())
    }

    pub fn queue<T: Into<String>>(msg: T) -> Self {
        ClickGuardError::Queue(msg.into())
    }
}

impl From<sea_orm::DbErr> for ClickGuardError {
    fn from(err: sea_orm::DbErr) -> Self {
        ClickGuardError::DatabaseOperation(err.to_string())
    }
}

impl From<std::io::Error> for ClickGuardError {
    fn from(err: std::io::Error) -> Self {
        ClickGuardError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ClickGuardError {
    fn from(err: serde_json::Error) -> Self {
        ClickGuardError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ClickGuardError {
    fn from(err: config::ConfigError) -> Self {
        ClickGuardError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClickGuardError>;
