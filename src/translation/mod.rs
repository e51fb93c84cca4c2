//! 翻译模块
//!
//! 为 Markdown 规格文档提供流式翻译预览，并缓存翻译结果以避免重复调用付费接口：
//! - **config**: 配置管理
//! - **error**: 错误处理
//! - **storage**: 内容寻址的持久化翻译缓存
//! - **source**: 远程翻译服务与离线替身
//! - **core**: 流式编排与单飞预览会话
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speckit_translator::translation::{
//!     create_translation_source, load_translation_config, StreamingOrchestrator,
//!     TranslationCache, TranslationRequest,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_translation_config();
//! let source = create_translation_source(&config, false)?;
//! let cache = Arc::new(TranslationCache::open(config.resolved_cache_path())?);
//!
//! let orchestrator = StreamingOrchestrator::new(source, cache);
//! let outcome = orchestrator
//!     .translate(&TranslationRequest::new("## Overview"), |_| {})
//!     .await?;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

/// 配置管理模块
pub mod config;

/// 流式编排与预览会话
pub mod core;

/// 错误处理模块
pub mod error;

/// 翻译源
pub mod source;

/// 缓存和持久化存储
pub mod storage;

pub use config::{constants, load_translation_config, ConfigManager, TranslationConfig};

pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};

pub use self::core::{
    is_poisoned_hit, PreviewEvent, PreviewEventKind, PreviewSession, RequestState,
    StreamingOrchestrator, TranslationOutcome, TranslationRequest, TranslationUpdate,
};

pub use source::{
    create_translation_source, ChunkStream, MockSource, RemoteSource, TranslationSource,
};

pub use storage::{
    derive_key, CacheEntry, CacheStats, Clock, KeyValueStore, ManualClock, MemoryStore,
    RedbStore, SystemClock, TranslationCache,
};
