//! 预览会话
//!
//! 一个预览面板同一时间只关心最近一次请求。新请求不会中止旧请求（旧请求仍会把结果写入
//! 缓存），但旧请求迟到的事件会被丢弃，不会覆盖新请求已经推送的内容。

use std::sync::Arc;

use tokio::sync::mpsc;

use super::orchestrator::{
    StreamingOrchestrator, TranslationOutcome, TranslationRequest, TranslationUpdate,
};
use crate::translation::error::TranslationError;

/// 会话事件
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEvent {
    pub document: String,
    pub generation: u64,
    pub kind: PreviewEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEventKind {
    Update(TranslationUpdate),
    Completed(TranslationOutcome),
    Failed(TranslationError),
}

impl PreviewEventKind {
    /// 请求的最后一个事件
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PreviewEventKind::Update(_))
    }
}

/// 单飞预览会话
pub struct PreviewSession {
    orchestrator: Arc<StreamingOrchestrator>,
    generation: u64,
    current: Option<(String, TranslationRequest)>,
    sender: mpsc::UnboundedSender<PreviewEvent>,
    receiver: mpsc::UnboundedReceiver<PreviewEvent>,
}

impl PreviewSession {
    pub fn new(orchestrator: Arc<StreamingOrchestrator>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            generation: 0,
            current: None,
            sender,
            receiver,
        }
    }

    /// 发起新请求并返回它的代号，之前的请求全部过期
    ///
    /// 必须在 tokio 运行时中调用。
    pub fn request(&mut self, document: impl Into<String>, request: TranslationRequest) -> u64 {
        let document = document.into();
        self.generation += 1;
        let generation = self.generation;

        if let Some((previous, _)) = &self.current {
            tracing::debug!(previous = %previous, document = %document, generation, "替换正在进行的预览请求");
        }
        self.current = Some((document.clone(), request.clone()));

        let orchestrator = self.orchestrator.clone();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let result = orchestrator
                .translate(&request, |update| {
                    // 接收端随会话一起释放，发送失败说明没人再关心结果
                    let _ = sender.send(PreviewEvent {
                        document: document.clone(),
                        generation,
                        kind: PreviewEventKind::Update(update),
                    });
                })
                .await;

            let kind = match result {
                Ok(outcome) => PreviewEventKind::Completed(outcome),
                Err(e) => PreviewEventKind::Failed(e),
            };
            let _ = sender.send(PreviewEvent {
                document,
                generation,
                kind,
            });
        });

        generation
    }

    /// 重新发起最近一次请求（面板重新加载时使用）
    pub fn reload(&mut self) -> Option<u64> {
        let (document, request) = self.current.clone()?;
        Some(self.request(document, request))
    }

    /// 最近一次请求对应的文档
    pub fn current_document(&self) -> Option<&str> {
        self.current.as_ref().map(|(document, _)| document.as_str())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 等待属于最近一次请求的下一个事件，过期事件被静默丢弃
    pub async fn next_event(&mut self) -> Option<PreviewEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if event.generation == self.generation {
                return Some(event);
            }
            tracing::trace!(
                document = %event.document,
                generation = event.generation,
                "丢弃过期的预览事件"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::source::MockSource;
    use crate::translation::storage::{MemoryStore, TranslationCache};
    use std::time::Duration;

    fn session() -> PreviewSession {
        let orchestrator = StreamingOrchestrator::new(
            Arc::new(MockSource::with_delay(Duration::ZERO)),
            Arc::new(TranslationCache::new(Arc::new(MemoryStore::new()))),
        );
        PreviewSession::new(Arc::new(orchestrator))
    }

    #[tokio::test]
    async fn request_streams_until_completed() {
        let mut session = session();
        let generation = session.request("spec.md", TranslationRequest::new("Hello"));
        assert_eq!(session.current_document(), Some("spec.md"));

        let mut updates = 0;
        loop {
            let event = session.next_event().await.unwrap();
            assert_eq!(event.generation, generation);
            match event.kind {
                PreviewEventKind::Update(_) => updates += 1,
                PreviewEventKind::Completed(outcome) => {
                    assert!(outcome.text().ends_with("Hello"));
                    break;
                }
                PreviewEventKind::Failed(e) => panic!("unexpected failure: {}", e),
            }
        }
        assert!(updates >= 2);
    }

    #[tokio::test]
    async fn reload_reissues_last_request() {
        let mut session = session();
        assert_eq!(session.reload(), None);

        session.request("a.md", TranslationRequest::new("Hello"));
        let generation = session.reload().unwrap();
        assert_eq!(generation, 2);
        assert_eq!(session.current_document(), Some("a.md"));

        let event = session.next_event().await.unwrap();
        assert_eq!(event.generation, 2);
    }
}
