use std::fmt;

/// 定义错误类型的宏
///
/// 自动生成：
/// - enum 定义
/// - code() 方法
/// - error_type() 方法
/// - message() 方法
macro_rules! define_linkcut_errors {
    ($(
        $variant:ident($code:literal, $type_name:literal)
    ),* $(,)?) => {
        #[derive(Debug, Clone)]
        pub enum LinkcutError {
            $($variant(String),)*
        }

        impl LinkcutError {
            /// 获取错误代码
            pub fn code(&self) -> &'static str {
                match self {
                    $(LinkcutError::$variant(_) => $code,)*
                }
            }

            /// 获取错误类型名称
            pub fn error_type(&self) -> &'static str {
                match self {
                    $(LinkcutError::$variant(_) => $type_name,)*
                }
            }

            /// 获取错误详情
            pub fn message(&self) -> &str {
                match self {
                    $(LinkcutError::$variant(msg) => msg,)*
                }
            }
        }
    };
}

define_linkcut_errors! {
    InvalidUrl("E001", "Invalid URL"),
    NotFound("E002", "Not Found"),
    UrlConflict("E003", "URL Conflict"),
    HashCollision("E004", "Hash Collision"),
    NoAvailableHash("E005", "No Available Hash"),
    RateLimited("E006", "Rate Limited"),
    TransientBackend("E007", "Transient Backend Error"),
    Integrity("E008", "Integrity Violation"),
    Generation("E009", "Hash Generation Error"),
    CacheConnection("E010", "Cache Connection Error"),
    DatabaseConfig("E011", "Database Configuration Error"),
    DatabaseConnection("E012", "Database Connection Error"),
    DatabaseOperation("E013", "Database Operation Error"),
    Configuration("E014", "Configuration Error"),
}

impl LinkcutError {
    /// Whether the retry executor may re-run the failed operation.
    ///
    /// Transient I/O, connection loss and generation contract failures are
    /// retryable; validation, conflict and state errors are not. Unknown
    /// kinds default to non-retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkcutError::TransientBackend(_)
                | LinkcutError::DatabaseConnection(_)
                | LinkcutError::CacheConnection(_)
                | LinkcutError::Generation(_)
        )
    }

    /// Low-cardinality tag for failure counters.
    pub fn metric_kind(&self) -> &'static str {
        match self {
            LinkcutError::InvalidUrl(_) => "validation_error",
            LinkcutError::NotFound(_) => "not_found",
            LinkcutError::UrlConflict(_) => "url_conflict",
            LinkcutError::HashCollision(_) => "hash_collision",
            LinkcutError::NoAvailableHash(_) => "no_hash_available",
            LinkcutError::RateLimited(_) => "rate_limited",
            LinkcutError::Generation(_) => "generation_contract",
            LinkcutError::Integrity(_) => "integrity",
            LinkcutError::TransientBackend(_)
            | LinkcutError::DatabaseConnection(_)
            | LinkcutError::CacheConnection(_) => "transient_backend",
            LinkcutError::DatabaseOperation(_) => "database_operation",
            _ => "unknown_error",
        }
    }
}

impl fmt::Display for LinkcutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type(), self.message())
    }
}

impl std::error::Error for LinkcutError {}

// 便捷的构造函数
impl LinkcutError {
    pub fn invalid_url<T: Into<String>>(msg: T) -> Self {
        LinkcutError::InvalidUrl(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        LinkcutError::NotFound(msg.into())
    }

    pub fn url_conflict<T: Into<String>>(msg: T) -> Self {
        LinkcutError::UrlConflict(msg.into())
    }

    pub fn hash_collision<T: Into<String>>(msg: T) -> Self {
        LinkcutError::HashCollision(msg.into())
    }

    pub fn no_available_hash<T: Into<String>>(msg: T) -> Self {
        LinkcutError::NoAvailableHash(msg.into())
    }

    pub fn rate_limited<T: Into<String>>(msg: T) -> Self {
        LinkcutError::RateLimited(msg.into())
    }

    pub fn transient_backend<T: Into<String>>(msg: T) -> Self {
        LinkcutError::TransientBackend(msg.into())
    }

    pub fn integrity<T: Into<String>>(msg: T) -> Self {
        LinkcutError::Integrity(msg.into())
    }

    pub fn generation<T: Into<String>>(msg: T) -> Self {
        LinkcutError::Generation(msg.into())
    }

    pub fn cache_connection<T: Into<String>>(msg: T) -> Self {
        LinkcutError::CacheConnection(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        LinkcutError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        LinkcutError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        LinkcutError::DatabaseOperation(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        LinkcutError::Configuration(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for LinkcutError {
    fn from(err: sea_orm::DbErr) -> Self {
        match &err {
            // 连接问题可重试
            sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_) => {
                LinkcutError::TransientBackend(err.to_string())
            }
            _ => LinkcutError::DatabaseOperation(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for LinkcutError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() || err.is_connection_dropped() || err.is_io_error() {
            LinkcutError::TransientBackend(err.to_string())
        } else {
            LinkcutError::CacheConnection(err.to_string())
        }
    }
}

impl From<std::io::Error> for LinkcutError {
    fn from(err: std::io::Error) -> Self {
        LinkcutError::TransientBackend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinkcutError>;
