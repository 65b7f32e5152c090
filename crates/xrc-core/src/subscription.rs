//! 订阅拉取与本地缓存

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn, Span};

use crate::error::{Error, ParseError, Result};
use crate::link::{decode_base64, parse_lines};
use crate::node::Node;

/// 订阅请求超时
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// 订阅拉取器
///
/// 缓存文件每行保存一个订阅地址返回的原始 base64 内容。
pub struct Fetcher {
    client: reqwest::Client,
    cache_path: PathBuf,
    span: Span,
}

impl Fetcher {
    pub fn new<P: Into<PathBuf>>(cache_path: P, span: Span) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build subscription HTTP client: {e}")))?;
        Ok(Self {
            client,
            cache_path: cache_path.into(),
            span,
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// 优先读取缓存，缓存不存在或没有可用节点时重新拉取
    pub async fn fetch_cached(&self, urls: &[String]) -> Result<Vec<Node>> {
        let nodes = self.read_cache().await;
        if !nodes.is_empty() {
            debug!(parent: &self.span, "从缓存读取到 {} 个节点", nodes.len());
            return Ok(nodes);
        }
        self.resubscribe(urls).await
    }

    /// 重新拉取全部订阅，任一地址失败则整体失败
    pub async fn resubscribe(&self, urls: &[String]) -> Result<Vec<Node>> {
        if urls.is_empty() {
            return Err(Error::NoSubscriptionUrls);
        }

        let mut nodes = Vec::new();
        let mut payloads = Vec::with_capacity(urls.len());

        for url in urls {
            let payload = self.download(url).await?;
            let parsed = self.decode_payload(&payload).map_err(|e| {
                warn!(parent: &self.span, "订阅内容解析失败: {}: {}", url, e);
                Error::Parse(e)
            })?;
            info!(parent: &self.span, "订阅 {} 包含 {} 个节点", url, parsed.len());
            nodes.extend(parsed);
            payloads.push(payload);
        }

        debug!(parent: &self.span, "found {} nodes", nodes.len());

        if !nodes.is_empty() {
            if let Err(e) = tokio::fs::write(&self.cache_path, payloads.join("\n")).await {
                warn!(parent: &self.span, "写入订阅缓存失败: {}", e);
            }
        }

        Ok(nodes)
    }

    /// 解码一份订阅内容，跳过无法解析的行
    pub fn decode_payload(&self, payload: &str) -> std::result::Result<Vec<Node>, ParseError> {
        let bytes = decode_base64(payload)?;
        let content = String::from_utf8_lossy(&bytes);
        let (nodes, skipped) = parse_lines(&content);
        for (line, err) in skipped {
            warn!(parent: &self.span, "跳过无法解析的链接: {}: {}", truncate(&line), err);
        }
        Ok(nodes)
    }

    async fn download(&self, url: &str) -> Result<String> {
        let network_error = |reason: String| Error::Network {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(e.to_string()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(network_error(format!("HTTP {status}")));
        }

        let body = resp.text().await.map_err(|e| network_error(e.to_string()))?;
        Ok(body.chars().filter(|c| !c.is_whitespace()).collect())
    }

    async fn read_cache(&self) -> Vec<Node> {
        let content = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(parent: &self.span, "订阅缓存不可用: {}", e);
                return Vec::new();
            }
        };

        let mut nodes = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match self.decode_payload(line) {
                Ok(parsed) => nodes.extend(parsed),
                Err(e) => warn!(parent: &self.span, "订阅缓存损坏: {}", e),
            }
        }
        nodes
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(48).collect()
}
