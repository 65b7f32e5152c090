use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::config::{ListenProtocol, ListenSpec, Settings};
use crate::engine::{BuildOptions, EngineInstance, ProxyEngine};
use crate::error::{Error, Result};
use crate::node::{Node, UNREACHABLE};

const PORT_PICK_ATTEMPTS: usize = 5;
const PORT_PICK_BACKOFF: Duration = Duration::from_millis(10);

/// 测试选项
#[derive(Debug, Clone)]
pub struct TestOptions {
    /// 测试目标URL，必须返回 204
    pub test_url: String,
    /// 每个节点请求次数
    pub times: usize,
    /// 单次请求超时
    pub timeout: Duration,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl TestOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            test_url: settings.test_url.clone(),
            times: settings.times,
            timeout: settings.probe_timeout(),
        }
    }
}

/// 单个节点的延迟测量
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// 返回平均延迟（毫秒），测试失败时为 -1
    async fn probe(&self, node: &Node) -> Result<i32>;
}

/// 分配一个空闲的本地 TCP 端口
///
/// 绑定后立即释放，端口在被核心使用前可能被占用。
pub async fn pick_free_tcp_port() -> Result<u16> {
    let mut last_err = None;
    for _ in 0..PORT_PICK_ATTEMPTS {
        match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => match listener.local_addr() {
                Ok(addr) if addr.port() != 0 => return Ok(addr.port()),
                Ok(_) => {}
                Err(e) => last_err = Some(e),
            },
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(PORT_PICK_BACKOFF).await;
    }
    Err(Error::Probe(format!(
        "failed to pick a free port after {} attempts: {}",
        PORT_PICK_ATTEMPTS,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// 顺序请求 `times` 次，全部返回 204 且无内容时返回平均耗时，否则返回 -1
pub async fn ping(client: &reqwest::Client, test_url: &str, times: usize) -> i32 {
    let times = times.max(1);
    let mut total_millis: u128 = 0;

    for i in 0..times {
        let start = Instant::now();
        let resp = match client.get(test_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("第 {} 次请求失败: {}", i + 1, e);
                return UNREACHABLE;
            }
        };
        let elapsed = start.elapsed().as_millis();

        if resp.status() != StatusCode::NO_CONTENT {
            debug!("第 {} 次请求返回 {}", i + 1, resp.status());
            return UNREACHABLE;
        }
        match resp.bytes().await {
            Ok(body) if body.is_empty() => {}
            _ => return UNREACHABLE,
        }

        total_millis += elapsed;
    }

    i32::try_from(total_millis / times as u128).unwrap_or(i32::MAX)
}

/// 节点测速器：每个节点使用独立的核心实例和 HTTP 客户端
pub struct Tester {
    engine: Arc<dyn ProxyEngine>,
    options: TestOptions,
}

impl Tester {
    /// 创建新的测试器
    pub fn new(engine: Arc<dyn ProxyEngine>, options: TestOptions) -> Self {
        Self { engine, options }
    }

    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    async fn measure(&self, instance: &mut dyn EngineInstance, port: u16) -> Result<i32> {
        instance.start().await?;

        let proxy = reqwest::Proxy::all(format!("http://127.0.0.1:{}", port))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .pool_max_idle_per_host(0)
            .timeout(self.options.timeout)
            .build()?;

        Ok(ping(&client, &self.options.test_url, self.options.times).await)
    }
}

#[async_trait]
impl LatencyProbe for Tester {
    async fn probe(&self, node: &Node) -> Result<i32> {
        let port = pick_free_tcp_port().await?;
        let listens = [ListenSpec::new(ListenProtocol::Http, port)];
        let mut instance = self
            .engine
            .build(std::slice::from_ref(node), &listens, BuildOptions::default())?;

        let result = self.measure(instance.as_mut(), port).await;
        if let Err(e) = instance.close().await {
            warn!("关闭测速实例失败 {}: {}", node, e);
        }
        result
    }
}
