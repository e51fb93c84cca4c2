//! 统一的环境变量管理
//!
//! 翻译配置本身通过 `SPECKIT_TRANSLATION_*` 由配置层读取；这里只放进程级开关。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => match Self::DEFAULT {
                Some(default) => Ok(default),
                None => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Required environment variable not set".to_string(),
                }),
            },
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 日志级别
pub struct LogLevel;
impl EnvVar<&'static str> for LogLevel {
    const NAME: &'static str = "SPECKIT_LOG_LEVEL";
    const DEFAULT: Option<&'static str> = Some("info");
    const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

    fn parse(value: &str) -> EnvResult<&'static str> {
        match value.to_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" => Ok("error"),
            _ => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: format!(
                    "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                    value
                ),
            }),
        }
    }
}

/// 禁用颜色输出
pub struct NoColor;
impl EnvVar<bool> for NoColor {
    const NAME: &'static str = "NO_COLOR";
    const DEFAULT: Option<bool> = Some(false);
    const DESCRIPTION: &'static str = "Disable colored output when set to any value";

    fn parse(value: &str) -> EnvResult<bool> {
        // NO_COLOR 约定：任何非空值都表示禁用颜色
        Ok(!value.is_empty())
    }
}

/// 强制使用离线替身翻译源
pub struct Offline;
impl EnvVar<bool> for Offline {
    const NAME: &'static str = "SPECKIT_OFFLINE";
    const DEFAULT: Option<bool> = Some(false);
    const DESCRIPTION: &'static str = "Use the offline mock translation source";

    fn parse(value: &str) -> EnvResult<bool> {
        parse_bool(value, Self::NAME)
    }
}

/// 替身翻译源每个分片之间的延迟
pub struct MockChunkDelay;
impl EnvVar<Duration> for MockChunkDelay {
    const NAME: &'static str = "SPECKIT_MOCK_DELAY_MS";
    const DEFAULT: Option<Duration> = Some(Duration::from_millis(100));
    const DESCRIPTION: &'static str = "Delay between mock translation chunks in milliseconds";

    fn parse(value: &str) -> EnvResult<Duration> {
        let millis: u64 = value.trim().parse().map_err(|_| EnvError {
            variable: Self::NAME.to_string(),
            message: format!("Invalid milliseconds value '{}'", value),
        })?;

        if millis > 10_000 {
            return Err(EnvError {
                variable: Self::NAME.to_string(),
                message: "Delay must be at most 10000ms".to_string(),
            });
        }

        Ok(Duration::from_millis(millis))
    }
}

fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

/// 环境变量配置汇总
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub log_level: &'static str,
    pub no_color: bool,
    pub offline: bool,
    pub mock_chunk_delay: Duration,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> EnvResult<Self> {
        Ok(Self {
            log_level: LogLevel::get()?,
            no_color: NoColor::get()?,
            offline: Offline::get()?,
            mock_chunk_delay: MockChunkDelay::get()?,
        })
    }
}

/// 命令行 `-v` 的次数叠加在配置的日志级别之上：`-v` 为 debug，`-vv` 及以上为 trace
pub fn verbosity_level(verbose: u8, configured: &'static str) -> &'static str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// 环境变量文档
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");

    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        LogLevel::NAME,
        LogLevel::DESCRIPTION,
        LogLevel::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        NoColor::NAME,
        NoColor::DESCRIPTION,
        NoColor::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        Offline::NAME,
        Offline::DESCRIPTION,
        Offline::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        MockChunkDelay::NAME,
        MockChunkDelay::DESCRIPTION,
        MockChunkDelay::DEFAULT
    ));
    docs.push_str(
        "- `SPECKIT_TRANSLATION_<FIELD>`: overrides any translation setting, e.g. `SPECKIT_TRANSLATION_API_KEY`\n",
    );

    docs
}
