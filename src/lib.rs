//! # Speckit Translator
//!
//! Markdown 规格文档的流式翻译预览，带持久化的内容寻址翻译缓存。
//!
//! ## 模块组织
//!
//! - `translation` - 缓存、翻译源与流式编排
//! - `markdown` - 标题分节与可翻译锚点
//! - `env` - 进程级环境变量开关

pub mod env;
pub mod markdown;
pub mod translation;

pub use markdown::{extract_section, section_anchors, SectionAnchor};
pub use translation::{
    StreamingOrchestrator, TranslationCache, TranslationConfig, TranslationError,
    TranslationRequest, TranslationResult, TranslationUpdate,
};
