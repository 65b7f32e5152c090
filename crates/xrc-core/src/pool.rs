use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn, Span};

use crate::node::{Node, UNREACHABLE};
use crate::tester::LatencyProbe;

/// 每个节点测试结束后的回调，参数为节点、已完成数量和总数
pub type ProbeObserver = Arc<dyn Fn(&Node, usize, usize) + Send + Sync>;

/// 并发测速池
///
/// 每个节点一个任务，最多 `concurrency` 个同时运行；单个节点失败只记为 -1。
pub struct ProberPool {
    probe: Arc<dyn LatencyProbe>,
    concurrency: usize,
    observer: Option<ProbeObserver>,
    span: Span,
}

impl ProberPool {
    pub fn new(probe: Arc<dyn LatencyProbe>, concurrency: usize, span: Span) -> Self {
        Self {
            probe,
            concurrency,
            observer: None,
            span,
        }
    }

    pub fn with_observer(mut self, observer: ProbeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 测量全部节点，返回可用节点并按延迟升序排列（延迟相同保持原顺序）
    pub async fn measure_all(&self, nodes: Vec<Node>) -> Vec<Node> {
        if nodes.is_empty() {
            return nodes;
        }

        let total = nodes.len();
        let concurrency = self.concurrency.clamp(1, total);
        debug!(parent: &self.span, "ping with {} workers, {} nodes", concurrency, nodes.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let finished = Arc::new(AtomicUsize::new(0));

        let handles = nodes.into_iter().map(|mut node| {
            let probe = Arc::clone(&self.probe);
            let semaphore = Arc::clone(&semaphore);
            let finished = Arc::clone(&finished);
            let observer = self.observer.clone();
            let span = self.span.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                node.delay = match probe.probe(&node).await {
                    Ok(delay) => delay,
                    Err(e) => {
                        warn!(parent: &span, "节点测速失败 {}: {}", node, e);
                        UNREACHABLE
                    }
                };
                debug!(parent: &span, "{} 延迟 {}ms", node, node.delay);
                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(observer) = &observer {
                    observer(&node, done, total);
                }
                node
            })
        });

        let mut measured: Vec<Node> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(node) => Some(node),
                Err(e) => {
                    warn!(parent: &self.span, "测速任务异常退出: {}", e);
                    None
                }
            })
            .filter(Node::is_reachable)
            .collect();

        measured.sort_by_key(|n| n.delay);
        measured
    }
}
