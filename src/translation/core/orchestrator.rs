//! 流式翻译编排
//!
//! 每个请求的状态流转：
//!
//! ```text
//! Idle → CacheCheck → HitDelivered
//!                   → Streaming → Committed
//!                               → Failed
//! ```
//!
//! 流式阶段每收到一个分片就把目前为止的完整译文推送给调用方；流正常结束后先写入缓存，
//! 再推送一次非流式的最终结果，保证调用方最后看到的文本与缓存中的一致。流中途失败时
//! 不写入任何内容。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::task;

use crate::translation::config::constants::{MOCK_MODEL, MOCK_TRANSLATION_PREFIX};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::source::TranslationSource;
use crate::translation::storage::TranslationCache;

/// 翻译请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub text: String,
    /// 为空时使用翻译源的默认模型
    #[serde(default)]
    pub model: Option<String>,
    /// 跳过缓存查询，结果仍然会写入缓存
    #[serde(default)]
    pub force_bypass_cache: bool,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            force_bypass_cache: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn force_bypass_cache(mut self, force: bool) -> Self {
        self.force_bypass_cache = force;
        self
    }
}

/// 推送给调用方的译文快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationUpdate {
    /// 目前为止的完整译文
    pub text: String,
    pub is_streaming: bool,
}

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    CacheCheck,
    HitDelivered,
    Streaming,
    Committed,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::HitDelivered | RequestState::Committed | RequestState::Failed
        )
    }
}

/// 请求结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    CacheHit { text: String },
    Translated { text: String, chunks: usize },
}

impl TranslationOutcome {
    pub fn text(&self) -> &str {
        match self {
            TranslationOutcome::CacheHit { text } | TranslationOutcome::Translated { text, .. } => {
                text
            }
        }
    }

    pub fn from_cache(&self) -> bool {
        matches!(self, TranslationOutcome::CacheHit { .. })
    }
}

/// 缓存投毒检查
///
/// 模拟翻译源产生的译文带有标记前缀，在非模拟模型下查到这样的译文视为未命中。
pub fn is_poisoned_hit(cached: &str, model: &str) -> bool {
    model != MOCK_MODEL && cached.starts_with(MOCK_TRANSLATION_PREFIX)
}

/// 编排器统计
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    pub requests: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub poisoned_hits: AtomicUsize,
    pub translations_completed: AtomicUsize,
    pub failures: AtomicUsize,
    pub chunks_received: AtomicUsize,
    /// 流式阶段的累计耗时（微秒）
    pub streaming_time: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStatsSnapshot {
    pub requests: usize,
    pub cache_hits: usize,
    pub poisoned_hits: usize,
    pub translations_completed: usize,
    pub failures: usize,
    pub chunks_received: usize,
    pub streaming_time: std::time::Duration,
}

impl OrchestratorStats {
    pub fn snapshot(&self) -> OrchestratorStatsSnapshot {
        OrchestratorStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            poisoned_hits: self.poisoned_hits.load(Ordering::Relaxed),
            translations_completed: self.translations_completed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            streaming_time: std::time::Duration::from_micros(
                self.streaming_time.load(Ordering::Relaxed),
            ),
        }
    }
}

/// 流式翻译编排器
pub struct StreamingOrchestrator {
    source: Arc<dyn TranslationSource>,
    cache: Arc<TranslationCache>,
    stats: OrchestratorStats,
}

impl StreamingOrchestrator {
    pub fn new(source: Arc<dyn TranslationSource>, cache: Arc<TranslationCache>) -> Self {
        Self {
            source,
            cache,
            stats: OrchestratorStats::default(),
        }
    }

    pub fn source(&self) -> &Arc<dyn TranslationSource> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    pub fn stats(&self) -> OrchestratorStatsSnapshot {
        self.stats.snapshot()
    }

    /// 执行一次翻译请求
    ///
    /// `on_update` 按顺序收到所有快照。命中缓存时只收到一次非流式快照；否则先收到若干
    /// 流式快照，成功后再收到一次非流式快照。失败时返回错误，不会推送最终快照，也不会
    /// 自动重试。
    pub async fn translate<F>(
        &self,
        request: &TranslationRequest,
        mut on_update: F,
    ) -> TranslationResult<TranslationOutcome>
    where
        F: FnMut(TranslationUpdate),
    {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("translation_requests_total").increment(1);

        if request.text.trim().is_empty() {
            return Err(self.fail(TranslationError::InvalidInput(
                "待翻译的文本为空".to_string(),
            )));
        }

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.source.default_model().to_string());

        let mut state = RequestState::Idle;
        transition(&mut state, RequestState::CacheCheck);

        if request.force_bypass_cache {
            tracing::debug!("跳过缓存查询");
        } else if let Some(text) = self.cached(&request.text, &model).await {
            transition(&mut state, RequestState::HitDelivered);
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            on_update(TranslationUpdate {
                text: text.clone(),
                is_streaming: false,
            });
            return Ok(TranslationOutcome::CacheHit { text });
        }

        transition(&mut state, RequestState::Streaming);
        tracing::info!(source = self.source.name(), model = %model, "开始流式翻译");

        let started = Instant::now();
        let mut chunks = self.source.translate(&request.text, &model);
        let mut accumulated = String::new();
        let mut count = 0usize;

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) if chunk.is_empty() => {}
                Ok(chunk) => {
                    accumulated.push_str(&chunk);
                    count += 1;
                    on_update(TranslationUpdate {
                        text: accumulated.clone(),
                        is_streaming: true,
                    });
                }
                Err(e) => {
                    transition(&mut state, RequestState::Failed);
                    tracing::warn!(chunks = count, "翻译流中断，结果不写入缓存");
                    return Err(self.fail(e));
                }
            }
        }

        self.stats
            .streaming_time
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.stats
            .chunks_received
            .fetch_add(count, Ordering::Relaxed);

        if accumulated.is_empty() {
            transition(&mut state, RequestState::Failed);
            return Err(self.fail(TranslationError::EmptyTranslation));
        }

        if let Err(e) = self.commit(&request.text, &accumulated, &model).await {
            transition(&mut state, RequestState::Failed);
            return Err(self.fail(e));
        }

        transition(&mut state, RequestState::Committed);
        self.stats
            .translations_completed
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            chunks = count,
            chars = accumulated.chars().count(),
            elapsed = ?started.elapsed(),
            "翻译完成"
        );

        on_update(TranslationUpdate {
            text: accumulated.clone(),
            is_streaming: false,
        });

        Ok(TranslationOutcome::Translated {
            text: accumulated,
            chunks: count,
        })
    }

    /// 查询缓存并过滤空串和被投毒的条目
    ///
    /// 缓存读写会阻塞在磁盘 IO 上，放到阻塞线程池中执行。
    async fn cached(&self, text: &str, model: &str) -> Option<String> {
        let cache = self.cache.clone();
        let (key_text, key_model) = (text.to_string(), model.to_string());
        let lookup = task::spawn_blocking(move || cache.get(&key_text, &key_model));

        let cached = match lookup.await {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!("缓存查询任务异常，按未命中处理: {}", e);
                return None;
            }
        };

        if cached.is_empty() {
            tracing::debug!("缓存中的译文为空，按未命中处理");
            return None;
        }

        if is_poisoned_hit(&cached, model) {
            self.stats.poisoned_hits.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(model = %model, "缓存中是模拟翻译结果，重新翻译");
            return None;
        }

        tracing::debug!(model = %model, "命中翻译缓存");
        Some(cached)
    }

    /// 在阻塞线程池中写入缓存
    async fn commit(&self, text: &str, translated: &str, model: &str) -> TranslationResult<()> {
        let cache = self.cache.clone();
        let (text, translated, model) = (text.to_string(), translated.to_string(), model.to_string());

        task::spawn_blocking(move || cache.set(&text, &translated, &model))
            .await
            .map_err(|e| TranslationError::InternalError(format!("缓存写入任务异常: {}", e)))?
    }

    fn fail(&self, error: TranslationError) -> TranslationError {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("translation_failures_total").increment(1);
        crate::translation::error::helpers::log_error(&error);
        error
    }
}

fn transition(state: &mut RequestState, next: RequestState) {
    tracing::trace!(from = ?*state, to = ?next, "请求状态变更");
    *state = next;
}
