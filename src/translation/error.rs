//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。`Display` 输出面向用户的分类消息，
//! 调用方可以通过 [`TranslationError::category`]、[`TranslationError::code`]
//! 和 [`TranslationError::status_code`] 获取结构化的错误细节。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 配置错误（未配置或配置无效），不会重试
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// API 密钥无效
    #[error("API 密钥无效，请检查翻译服务配置")]
    AuthenticationFailed,

    /// 速率限制错误
    #[error("请求速率过快，已达到限制，请稍后重试")]
    RateLimitExceeded,

    /// 超时错误
    #[error("翻译请求超时: {0}")]
    TimeoutError(String),

    /// TLS 证书错误
    #[error("SSL 证书错误，可尝试开启 skip_ssl_verification 或联系网络管理员: {0}")]
    TlsError(String),

    /// 网络错误（DNS、连接被拒绝等）
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 服务端返回的非成功状态
    #[error("翻译服务返回错误 (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// 流式响应中断或格式错误
    #[error("翻译流错误: {0}")]
    StreamError(String),

    /// 翻译流正常结束但没有任何内容
    #[error("翻译服务未返回任何内容")]
    EmptyTranslation,

    /// 缓存错误
    #[error("缓存错误: {0}")]
    CacheError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 文件读写错误
    #[error("IO错误: {0}")]
    IoError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 只有建立连接阶段会参考该结果，流式传输过程中的错误一律不重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::ApiError { status, .. } => *status >= 500,
            TranslationError::RateLimitExceeded => false, // 需要等待
            TranslationError::ConfigError(_) => false,
            TranslationError::AuthenticationFailed => false,
            TranslationError::TlsError(_) => false,
            TranslationError::StreamError(_) => false,
            TranslationError::EmptyTranslation => false,
            TranslationError::CacheError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::IoError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::AuthenticationFailed => ErrorSeverity::Critical,
            TranslationError::RateLimitExceeded => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::TlsError(_) => ErrorSeverity::Error,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::ApiError { .. } => ErrorSeverity::Error,
            TranslationError::StreamError(_) => ErrorSeverity::Error,
            TranslationError::EmptyTranslation => ErrorSeverity::Warning,
            TranslationError::CacheError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::IoError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::AuthenticationFailed => ErrorCategory::Authentication,
            TranslationError::RateLimitExceeded => ErrorCategory::RateLimit,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::TlsError(_) => ErrorCategory::Tls,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::ApiError { .. } => ErrorCategory::Service,
            TranslationError::StreamError(_) => ErrorCategory::Stream,
            TranslationError::EmptyTranslation => ErrorCategory::Stream,
            TranslationError::CacheError(_) => ErrorCategory::Cache,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::IoError(_) => ErrorCategory::Io,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::ConfigError(_) => "config",
            TranslationError::AuthenticationFailed => "auth",
            TranslationError::RateLimitExceeded => "rate_limit",
            TranslationError::TimeoutError(_) => "timeout",
            TranslationError::TlsError(_) => "tls",
            TranslationError::NetworkError(_) => "network",
            TranslationError::ApiError { .. } => "api",
            TranslationError::StreamError(_) => "stream",
            TranslationError::EmptyTranslation => "empty_translation",
            TranslationError::CacheError(_) => "cache",
            TranslationError::SerializationError(_) => "serialization",
            TranslationError::InvalidInput(_) => "invalid_input",
            TranslationError::IoError(_) => "io",
            TranslationError::InternalError(_) => "internal",
        }
    }

    /// 对应的 HTTP 状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TranslationError::AuthenticationFailed => Some(401),
            TranslationError::RateLimitExceeded => Some(429),
            TranslationError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let append = |msg: &mut String| *msg = format!("{} (上下文: {})", msg, context);

        match &mut self {
            TranslationError::ConfigError(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::TlsError(msg)
            | TranslationError::NetworkError(msg)
            | TranslationError::StreamError(msg)
            | TranslationError::CacheError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::IoError(msg)
            | TranslationError::InternalError(msg)
            | TranslationError::ApiError { message: msg, .. } => append(msg),
            TranslationError::AuthenticationFailed
            | TranslationError::RateLimitExceeded
            | TranslationError::EmptyTranslation => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    RateLimit,
    Timeout,
    Tls,
    Network,
    Service,
    Stream,
    Cache,
    Serialization,
    Input,
    Io,
    Internal,
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::SerializationError(format!("TOML序列化错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return TranslationError::TimeoutError(error.to_string());
        }

        if error_chain_contains(&error, "certificate") {
            return TranslationError::TlsError(error.to_string());
        }

        if error.is_connect() {
            return TranslationError::NetworkError(format!("无法建立连接: {}", error));
        }

        if error.is_decode() || error.is_body() {
            return TranslationError::StreamError(error.to_string());
        }

        match error.status() {
            Some(status) => TranslationError::ApiError {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => TranslationError::NetworkError(error.to_string()),
        }
    }
}

/// 将 redb 的各类错误统一转换为缓存错误
pub fn storage_error<E: Into<redb::Error>>(error: E) -> TranslationError {
    TranslationError::CacheError(format!("存储操作失败: {}", error.into()))
}

/// 沿着 `source()` 链查找错误描述中的关键字
fn error_chain_contains(error: &(dyn std::error::Error + 'static), needle: &str) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if err.to_string().to_lowercase().contains(needle) {
            return true;
        }
        current = err.source();
    }
    false
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!(code = error.code(), "翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!(code = error.code(), "翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!(code = error.code(), "翻译错误: {}", error),
            ErrorSeverity::Critical => {
                tracing::error!(code = error.code(), "翻译严重错误: {}", error)
            }
        }
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ConfigError(msg.to_string())
    }

    /// 创建缓存错误
    pub fn cache_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::CacheError(msg.to_string())
    }

    /// 创建流错误
    pub fn stream_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::StreamError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_variants() {
        assert_eq!(TranslationError::AuthenticationFailed.status_code(), Some(401));
        assert_eq!(TranslationError::RateLimitExceeded.status_code(), Some(429));
        assert_eq!(
            TranslationError::ApiError {
                status: 503,
                message: "busy".to_string()
            }
            .status_code(),
            Some(503)
        );
        assert_eq!(TranslationError::EmptyTranslation.status_code(), None);
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(TranslationError::NetworkError("refused".into()).is_retryable());
        assert!(TranslationError::TimeoutError("slow".into()).is_retryable());
        assert!(TranslationError::ApiError {
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!TranslationError::ApiError {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!TranslationError::AuthenticationFailed.is_retryable());
        assert!(!TranslationError::ConfigError("missing key".into()).is_retryable());
    }

    #[test]
    fn context_is_appended_to_message() {
        let error = TranslationError::CacheError("写入失败".into()).with_context("key=abc");
        assert_eq!(
            error,
            TranslationError::CacheError("写入失败 (上下文: key=abc)".into())
        );

        // 无消息的变体保持不变
        assert_eq!(
            TranslationError::RateLimitExceeded.with_context("ignored"),
            TranslationError::RateLimitExceeded
        );
    }

    #[test]
    fn categories_and_codes_are_stable() {
        let error = TranslationError::TlsError("unable to get issuer certificate".into());
        assert_eq!(error.category(), ErrorCategory::Tls);
        assert_eq!(error.code(), "tls");
        assert_eq!(
            TranslationError::ConfigError(String::new()).severity(),
            ErrorSeverity::Critical
        );
    }
}
