// 集成测试公共模块
//
// 提供脚本化翻译源、可注入故障的存储和一个最小的 HTTP 测试服务器

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use speckit_translator::translation::{
    ChunkStream, KeyValueStore, ManualClock, MemoryStore, TranslationCache, TranslationConfig,
    TranslationError, TranslationResult, TranslationSource,
};

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const REAL_MODEL: &str = "real-model";

/// 基于内存存储和虚拟时钟的缓存
pub struct TestCache {
    pub cache: Arc<TranslationCache>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestCache {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = Arc::new(TranslationCache::with_clock(store.clone(), clock.clone()));
        Self {
            cache,
            store,
            clock,
        }
    }
}

/// 按脚本输出分片的翻译源
pub struct ScriptedSource {
    script: Vec<TranslationResult<String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn chunks(chunks: &[&str]) -> Self {
        Self {
            script: chunks.iter().map(|c| Ok(c.to_string())).collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(chunks: &[&str], error: TranslationError) -> Self {
        let mut source = Self::chunks(chunks);
        source.script.push(Err(error));
        source
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranslationSource for ScriptedSource {
    fn translate(&self, _text: &str, _model: &str) -> ChunkStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(
            stream::iter(self.script.clone()).then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            }),
        )
    }

    fn is_available(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        REAL_MODEL
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 可按需注入读、写、删除失败的存储
#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_index_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FailingStore {
    fn injected(operation: &str) -> TranslationError {
        TranslationError::CacheError(format!("injected {} failure", operation))
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> TranslationResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("read"));
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> TranslationResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected("write"));
        }
        if key.ends_with("index") && self.fail_index_writes.load(Ordering::SeqCst) {
            return Err(Self::injected("index write"));
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> TranslationResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete"));
        }
        self.inner.delete(key)
    }
}

/// 只会返回固定响应的 HTTP 服务器
pub struct TestServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn start(status: u16, content_type: &'static str, body: String) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    recorded.lock().unwrap().push(request);

                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason(status),
                        content_type,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base_url, requests }
    }

    /// 以 SSE 格式返回给定分片
    pub async fn sse(chunks: &[&str]) -> Self {
        Self::start(200, "text/event-stream", sse_body(chunks)).await
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn config(&self) -> TranslationConfig {
        TranslationConfig {
            api_key: "sk-test".to_string(),
            base_url: self.base_url.clone(),
            model: REAL_MODEL.to_string(),
            retry_delay_ms: 1,
            ..Default::default()
        }
    }
}

pub fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let event = serde_json::json!({
            "choices": [{ "index": 0, "delta": { "content": chunk }, "finish_reason": null }]
        });
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buffer[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}
