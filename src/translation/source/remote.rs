//! 远程翻译源
//!
//! 调用 OpenAI 兼容的 `POST {base_url}/chat/completions` 接口（`stream: true`），
//! 将 Server-Sent Events 响应解码为文本分片流。

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::{ChunkStream, TranslationSource};
use crate::translation::config::constants::SYSTEM_PROMPT;
use crate::translation::config::TranslationConfig;
use crate::translation::error::helpers::{config_error, stream_error};
use crate::translation::error::{TranslationError, TranslationResult};

const TRACE_HEADER: &str = "M-TraceId";
const DONE_SENTINEL: &str = "[DONE]";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// 远程翻译源
///
/// 每个实例持有自己的 HTTP 客户端，`skip_ssl_verification` 只影响该实例。
#[derive(Clone)]
pub struct RemoteSource {
    client: reqwest::Client,
    config: Arc<TranslationConfig>,
    endpoint: String,
}

impl RemoteSource {
    pub fn new(config: TranslationConfig) -> TranslationResult<Self> {
        config.validate()?;

        if config.skip_ssl_verification {
            tracing::warn!("已为翻译服务关闭证书校验: {}", config.base_url);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.skip_ssl_verification)
            .user_agent(concat!("speckit-translator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| config_error(format!("无法创建 HTTP 客户端: {}", e)))?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config: Arc::new(config),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 用一次简短的翻译测试连接
    ///
    /// 收到任意分片即视为成功；未配置时返回 `Ok(false)`。
    pub async fn test_connection(&self) -> TranslationResult<bool> {
        if !self.is_available() {
            return Ok(false);
        }

        let mut chunks = self.translate("Hello", self.default_model());
        match chunks.next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e),
            None => Ok(false),
        }
    }
}

impl TranslationSource for RemoteSource {
    fn translate(&self, text: &str, model: &str) -> ChunkStream {
        if !self.is_available() {
            return Box::pin(stream::once(async {
                Err::<String, _>(TranslationError::ConfigError(
                    "未配置 API 密钥，请在配置文件或 SPECKIT_TRANSLATION_API_KEY 中设置".to_string(),
                ))
            }));
        }

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: text.to_string(),
                },
            ],
            stream: true,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        tracing::debug!(model = %model, text_len = text.len(), "发送流式翻译请求");

        let client = self.client.clone();
        let config = self.config.clone();
        let endpoint = self.endpoint.clone();

        let open = async move { open_stream(&client, &config, &endpoint, &request).await };
        Box::pin(stream::once(open).try_flatten())
    }

    fn is_available(&self) -> bool {
        self.config.has_api_key()
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// 建立流式连接，只在连接阶段对可重试错误做指数退避重试
async fn open_stream(
    client: &reqwest::Client,
    config: &TranslationConfig,
    endpoint: &str,
    request: &ChatRequest,
) -> TranslationResult<ChunkStream> {
    let mut attempt: u32 = 0;

    loop {
        match send_request(client, config, endpoint, request).await {
            Ok(response) => return Ok(sse_chunks(Box::pin(response.bytes_stream()))),
            Err(e) if e.is_retryable() && (attempt as usize) < config.max_retries => {
                let delay = config.retry_delay() * 2u32.saturating_pow(attempt);
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries = config.max_retries,
                    "翻译请求失败，{:?} 后重试: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_request(
    client: &reqwest::Client,
    config: &TranslationConfig,
    endpoint: &str,
    request: &ChatRequest,
) -> TranslationResult<reqwest::Response> {
    let response = client
        .post(endpoint)
        .bearer_auth(&config.api_key)
        .header(TRACE_HEADER, uuid::Uuid::new_v4().to_string())
        .json(request)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 => TranslationError::AuthenticationFailed,
        429 => TranslationError::RateLimitExceeded,
        code => TranslationError::ApiError {
            status: code,
            message: error_message(&body),
        },
    })
}

/// 从错误响应体中提取可读的错误消息
fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        if !envelope.error.message.is_empty() {
            return envelope.error.message;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "无响应内容".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    End,
}

/// 按行解码 SSE 字节流
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> TranslationResult<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            parse_line(&line, &mut events)?;
        }
        Ok(events)
    }

    /// 处理末尾没有换行的残留数据
    fn finish(&mut self) -> TranslationResult<Vec<SseEvent>> {
        let line = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        parse_line(&line, &mut events)?;
        Ok(events)
    }
}

fn parse_line(line: &[u8], events: &mut Vec<SseEvent>) -> TranslationResult<()> {
    let line = std::str::from_utf8(line)
        .map_err(|e| stream_error(format!("响应不是有效的 UTF-8: {}", e)))?
        .trim();

    // 注释、空行和 event:/id: 字段都不携带内容
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => return Ok(()),
    };

    if data == DONE_SENTINEL {
        events.push(SseEvent::End);
        return Ok(());
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| stream_error(format!("无法解析流式响应: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(TranslationError::StreamError(error.message));
    }

    if let Some(choice) = chunk.choices.into_iter().next() {
        let content = choice.delta.and_then(|d| d.content).unwrap_or_default();
        if !content.is_empty() {
            events.push(SseEvent::Delta(content));
        }
        if let Some(reason) = choice.finish_reason {
            tracing::debug!(reason = %reason, "翻译流结束");
            events.push(SseEvent::End);
        }
    }

    Ok(())
}

struct SseState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseState<S> {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                break;
            }
            match event {
                SseEvent::Delta(content) => self.pending.push_back(content),
                SseEvent::End => self.finished = true,
            }
        }
    }
}

/// 把响应体字节流转换为文本分片流
fn sse_chunks<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<TranslationError> + Send,
{
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(Some(state), |state| async move {
        let mut state = state?;

        loop {
            if let Some(content) = state.pending.pop_front() {
                return Some((Ok(content), Some(state)));
            }
            if state.finished {
                return None;
            }

            let events = match state.body.next().await {
                Some(Ok(bytes)) => state.decoder.feed(bytes.as_ref()),
                Some(Err(e)) => Err(e.into()),
                None => state.decoder.finish().map(|mut events| {
                    events.push(SseEvent::End);
                    events
                }),
            };

            match events {
                Ok(events) => state.absorb(events),
                Err(e) => return Some((Err(e), None)),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: Vec<String>) -> impl Stream<Item = Result<Vec<u8>, TranslationError>> + Send + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(p.into_bytes())).collect::<Vec<_>>())
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn decoder_handles_lines_split_across_reads() {
        let mut decoder = SseDecoder::default();
        let line = delta("你好");
        let (head, tail) = line.split_at(10);

        assert!(decoder.feed(head.as_bytes()).unwrap().is_empty());
        assert_eq!(
            decoder.feed(tail.as_bytes()).unwrap(),
            vec![SseEvent::Delta("你好".to_string())]
        );
    }

    #[test]
    fn decoder_recognises_done_and_finish_reason() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .feed(b": keep-alive\nevent: message\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":\"stop\"}]}\ndata: [DONE]\n")
            .unwrap();

        assert_eq!(
            events,
            vec![
                SseEvent::Delta("x".to_string()),
                SseEvent::End,
                SseEvent::End
            ]
        );
    }

    #[test]
    fn decoder_skips_empty_deltas() {
        let mut decoder = SseDecoder::default();
        let events = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\ndata: {\"choices\":[]}\n")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn decoder_surfaces_in_band_errors() {
        let mut decoder = SseDecoder::default();
        let err = decoder
            .feed(b"data: {\"error\":{\"message\":\"model overloaded\"}}\n")
            .unwrap_err();
        assert_eq!(err, TranslationError::StreamError("model overloaded".to_string()));

        let mut decoder = SseDecoder::default();
        assert!(matches!(
            decoder.feed(b"data: {not json\n"),
            Err(TranslationError::StreamError(_))
        ));
    }

    #[tokio::test]
    async fn chunks_stop_at_done() {
        let parts = vec![
            delta("He"),
            delta("llo"),
            "data: [DONE]\n\n".to_string(),
            delta("ignored"),
        ];

        let chunks: Vec<String> = sse_chunks(body(parts)).try_collect().await.unwrap();
        assert_eq!(chunks, vec!["He".to_string(), "llo".to_string()]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_delivered() {
        let parts = vec!["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}".to_string()];
        let chunks: Vec<String> = sse_chunks(body(parts)).try_collect().await.unwrap();
        assert_eq!(chunks, vec!["tail".to_string()]);
    }

    #[tokio::test]
    async fn body_error_ends_stream() {
        let parts = stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n".as_slice()),
            Err(TranslationError::StreamError("connection reset".to_string())),
        ]);

        let items: Vec<TranslationResult<String>> = sse_chunks(parts).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("partial".to_string()));
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn unconfigured_source_fails_first() {
        let source = RemoteSource::new(TranslationConfig::default()).unwrap();
        assert!(!source.is_available());

        let items: Vec<TranslationResult<String>> = source.translate("Hello", "m").collect().await;
        assert!(matches!(items.as_slice(), [Err(TranslationError::ConfigError(_))]));
        assert!(!source.test_connection().await.unwrap());
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let source = RemoteSource::new(TranslationConfig {
            base_url: "https://api.example.com/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(source.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn error_message_prefers_json_envelope() {
        assert_eq!(
            error_message("{\"error\":{\"message\":\"bad model\"}}"),
            "bad model"
        );
        assert_eq!(error_message("  upstream down "), "upstream down");
        assert_eq!(error_message(""), "无响应内容");
    }
}
