//! 离线替身翻译源

use std::time::Duration;

use futures::{stream, StreamExt};

use super::{ChunkStream, TranslationSource};
use crate::translation::config::constants::{
    MOCK_CHUNK_CHARS, MOCK_CHUNK_DELAY, MOCK_MODEL, MOCK_TRANSLATION_PREFIX,
};

/// 模拟翻译源
///
/// 输出 `"[模拟翻译] " + 原文`，按字符切成固定大小的分片，每个分片前等待一段延迟。
#[derive(Debug, Clone)]
pub struct MockSource {
    chunk_delay: Duration,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            chunk_delay: MOCK_CHUNK_DELAY,
        }
    }

    pub fn with_delay(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }

    /// 生成完整的模拟译文
    pub fn render(text: &str) -> String {
        format!("{} {}", MOCK_TRANSLATION_PREFIX, text)
    }

    fn chunks(text: &str) -> Vec<String> {
        let chars: Vec<char> = Self::render(text).chars().collect();
        chars
            .chunks(MOCK_CHUNK_CHARS)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }
}

impl TranslationSource for MockSource {
    fn translate(&self, text: &str, _model: &str) -> ChunkStream {
        let delay = self.chunk_delay;
        let chunks = Self::chunks(text);
        tracing::debug!(chunks = chunks.len(), "模拟翻译开始");

        Box::pin(stream::iter(chunks).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(chunk)
        }))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        MOCK_MODEL
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[test]
    fn chunks_split_by_characters() {
        let text = "这是一段需要被切分成多个分片的中文文本，用于检查按字符切分";
        let chunks = MockSource::chunks(text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= MOCK_CHUNK_CHARS));
        assert!(chunks[..chunks.len() - 1]
            .iter()
            .all(|c| c.chars().count() == MOCK_CHUNK_CHARS));
        assert_eq!(chunks.concat(), MockSource::render(text));
    }

    #[tokio::test]
    async fn stream_yields_prefixed_text() {
        let source = MockSource::with_delay(Duration::ZERO);
        let chunks: Vec<String> = source
            .translate("Hello world", MOCK_MODEL)
            .try_collect()
            .await
            .unwrap();

        let full = chunks.concat();
        assert!(full.starts_with(MOCK_TRANSLATION_PREFIX));
        assert!(full.ends_with("Hello world"));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_waits_before_each_chunk() {
        let source = MockSource::new();
        let start = tokio::time::Instant::now();

        let chunks: Vec<String> = source
            .translate(&"a".repeat(45), MOCK_MODEL)
            .try_collect()
            .await
            .unwrap();

        // "[模拟翻译] " 占 7 个字符，共 52 个字符，切成 3 片
        assert_eq!(chunks.len(), 3);
        assert!(start.elapsed() >= MOCK_CHUNK_DELAY * 3);
        assert!(start.elapsed() < MOCK_CHUNK_DELAY * 4);
    }
}
