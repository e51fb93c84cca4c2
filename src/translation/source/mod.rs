//! 翻译源
//!
//! 翻译源把一段文本变成一个异步的文本分片流。目前有两种实现：
//!
//! - [`RemoteSource`]：OpenAI 兼容的流式接口
//! - [`MockSource`]：离线替身，输出带标记前缀的确定性分片

pub mod mock;
pub mod remote;

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

pub use mock::MockSource;
pub use remote::RemoteSource;

use crate::translation::config::TranslationConfig;
use crate::translation::error::TranslationResult;

/// 翻译分片流，流中出现错误即表示本次翻译失败
pub type ChunkStream = Pin<Box<dyn Stream<Item = TranslationResult<String>> + Send>>;

/// 翻译源接口
pub trait TranslationSource: Send + Sync {
    /// 开始翻译，返回分片流
    ///
    /// 未配置的翻译源不能返回空流，流的第一项必须是错误。
    fn translate(&self, text: &str, model: &str) -> ChunkStream;

    /// 是否已配置可用
    fn is_available(&self) -> bool;

    /// 默认模型
    fn default_model(&self) -> &str;

    /// 用于日志的名称
    fn name(&self) -> &'static str;
}

/// 根据配置选择翻译源
///
/// 远程服务已配置且没有要求离线时使用远程服务，否则回退到离线替身。
pub fn create_translation_source(
    config: &TranslationConfig,
    offline: bool,
) -> TranslationResult<Arc<dyn TranslationSource>> {
    if offline {
        tracing::info!("离线模式，使用模拟翻译源");
        return Ok(Arc::new(MockSource::new()));
    }

    let remote = RemoteSource::new(config.clone())?;
    if remote.is_available() {
        tracing::info!(model = %remote.default_model(), "使用远程翻译服务");
        Ok(Arc::new(remote))
    } else {
        tracing::warn!("翻译服务未配置 API 密钥，回退到模拟翻译源");
        Ok(Arc::new(MockSource::new()))
    }
}
