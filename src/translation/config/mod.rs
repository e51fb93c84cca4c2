//! 翻译配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 默认API设置
    pub const DEFAULT_BASE_URL: &str = "https://friday-api.example.com";
    pub const DEFAULT_MODEL: &str = "LongCat-Flash-Chat-2512";
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_MAX_RETRIES: usize = 2;
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
    pub const DEFAULT_TEMPERATURE: f32 = 0.3;
    pub const DEFAULT_MAX_TOKENS: u32 = 8000;

    pub const SYSTEM_PROMPT: &str = "You are a professional translator. Translate the following English text to Chinese. \
Maintain the original formatting, structure, and markdown syntax. \
Only return the translated content without any additional comments or explanations.";

    // 替身翻译源
    pub const MOCK_MODEL: &str = "mock-model";
    pub const MOCK_TRANSLATION_PREFIX: &str = "[模拟翻译]";
    pub const MOCK_CHUNK_CHARS: usize = 20;
    pub const MOCK_CHUNK_DELAY: Duration = Duration::from_millis(100);

    // 缓存设置
    pub const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60); // 7天
    pub const MAX_CACHE_ENTRIES: usize = 1000;
    pub const CACHE_KEY_PREFIX: &str = "translation_cache_";
    pub const CACHE_FILE_NAME: &str = "translation-cache.redb";

    // 环境变量前缀，例如 SPECKIT_TRANSLATION_API_KEY
    pub const ENV_PREFIX: &str = "SPECKIT_TRANSLATION";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "speckit-translation.toml",
        ".speckit-translation.toml",
        "~/.config/speckit/translation.toml",
    ];
}

/// 加载配置，失败时回退到默认配置
pub fn load_translation_config() -> TranslationConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            TranslationConfig::default()
        }
    }
}
