//! 翻译核心
//!
//! - **orchestrator**: 串联缓存与翻译源，向调用方推送增量快照
//! - **session**: 面向预览面板的单飞会话，丢弃被替换请求的迟到事件
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speckit_translator::translation::{
//!     MockSource, StreamingOrchestrator, TranslationCache, TranslationRequest,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(TranslationCache::open("translation-cache.redb")?);
//! let orchestrator = StreamingOrchestrator::new(Arc::new(MockSource::new()), cache);
//!
//! let outcome = orchestrator
//!     .translate(&TranslationRequest::new("# Title"), |update| {
//!         println!("{} (streaming: {})", update.text, update.is_streaming);
//!     })
//!     .await?;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

pub mod orchestrator;
pub mod session;

pub use orchestrator::{
    is_poisoned_hit, OrchestratorStats, OrchestratorStatsSnapshot, RequestState,
    StreamingOrchestrator, TranslationOutcome, TranslationRequest, TranslationUpdate,
};
pub use session::{PreviewEvent, PreviewEventKind, PreviewSession};
