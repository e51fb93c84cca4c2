//! 简化的配置管理器
//!
//! 配置按以下顺序叠加（后者覆盖前者）：内置默认值 → 配置文件 →
//! `.env` 文件 → `SPECKIT_TRANSLATION_*` 环境变量。

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::helpers::config_error;
use crate::translation::error::TranslationResult;

/// 翻译配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 基础配置
    pub api_key: String,
    pub base_url: String,
    pub model: String,

    // 传输配置（仅作用于当前翻译源实例）
    pub skip_ssl_verification: bool,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,

    // 生成参数
    pub temperature: f32,
    pub max_tokens: u32,

    // 缓存配置
    pub cache_path: Option<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            model: constants::DEFAULT_MODEL.to_string(),

            skip_ssl_verification: false,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: constants::DEFAULT_CONNECT_TIMEOUT_SECS,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY_MS,

            temperature: constants::DEFAULT_TEMPERATURE,
            max_tokens: constants::DEFAULT_MAX_TOKENS,

            cache_path: None,
        }
    }
}

impl TranslationConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            config_error(format!("base_url 无效 '{}': {}", self.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(config_error("base_url 必须以 http:// 或 https:// 开头"));
        }

        if self.model.trim().is_empty() {
            return Err(config_error("模型名称不能为空"));
        }

        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(config_error("超时时间必须大于0"));
        }

        if self.max_tokens == 0 {
            return Err(config_error("max_tokens 必须大于0"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(config_error("temperature 必须在 0 到 2 之间"));
        }

        Ok(())
    }

    /// 是否配置了 API 密钥
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// 缓存数据库路径
    ///
    /// 优先使用配置中的 `cache_path`（支持 `~` 展开），否则放在平台数据目录下。
    pub fn resolved_cache_path(&self) -> PathBuf {
        if let Some(path) = self.cache_path.as_deref().filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(shellexpand::tilde(path).as_ref());
        }

        match directories::ProjectDirs::from("dev", "speckit", "speckit-translator") {
            Some(dirs) => dirs.data_dir().join(constants::CACHE_FILE_NAME),
            None => PathBuf::from(constants::CACHE_FILE_NAME),
        }
    }

    /// 用于展示的设置摘要，API 密钥只显示是否已配置
    pub fn settings_summary(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "API Key",
                if self.has_api_key() {
                    "已配置".to_string()
                } else {
                    "未配置".to_string()
                },
            ),
            ("Base URL", self.base_url.clone()),
            ("Model", self.model.clone()),
            (
                "Skip SSL",
                if self.skip_ssl_verification { "是" } else { "否" }.to_string(),
            ),
            (
                "Cache",
                self.resolved_cache_path().display().to_string(),
            ),
        ]
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// 从默认搜索路径加载配置
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();

        let source_path = constants::CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        match &source_path {
            Some(path) => tracing::info!("加载配置文件: {}", path.display()),
            None => tracing::info!("未找到配置文件，使用默认配置"),
        }

        Self::build(source_path)
    }

    /// 从指定文件加载配置，文件必须存在
    pub fn from_path<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(config_error(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        Self::load_dotenv();
        tracing::info!("加载配置文件: {}", path.display());
        Self::build(Some(path.to_path_buf()))
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    /// 取出配置
    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    /// 实际加载的配置文件
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    fn build(source_path: Option<PathBuf>) -> TranslationResult<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&TranslationConfig::default())
                .map_err(|e| config_error(format!("默认配置错误: {}", e)))?,
        );

        if let Some(path) = &source_path {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(constants::ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config: TranslationConfig = builder
            .build()
            .map_err(|e| config_error(format!("构建配置失败: {}", e)))?
            .try_deserialize()
            .map_err(|e| config_error(format!("反序列化配置失败: {}", e)))?;

        config.validate()?;

        tracing::debug!(
            base_url = %config.base_url,
            model = %config.model,
            api_key_configured = config.has_api_key(),
            skip_ssl_verification = config.skip_ssl_verification,
            "翻译配置已加载"
        );

        Ok(Self {
            config,
            source_path,
        })
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let content = toml::to_string_pretty(&TranslationConfig::default())?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            config_error(format!("写入配置文件失败: {}", e))
        })?;

        Ok(())
    }
}
