//! 代理会话生命周期
//!
//! `Idle → Probing → Selecting → Starting → Running → Stopping → Stopped`，
//! 已有可用的节点选择时跳过 `Probing` 和 `Selecting`。每个进程同时只能有一个会话。

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn, Span};

use crate::config::{ListenProtocol, ListenSpec};
use crate::engine::{BuildOptions, EngineInstance, ProxyEngine};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::tester::pick_free_tcp_port;

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Probing,
    Selecting,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Probing => "probing",
            SessionState::Selecting => "selecting",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// 多节点转发会话
pub struct Session {
    engine: Arc<dyn ProxyEngine>,
    listens: Vec<ListenSpec>,
    options: BuildOptions,
    state: SessionState,
    instance: Option<Box<dyn EngineInstance>>,
    holds_slot: bool,
    span: Span,
}

impl Session {
    pub fn new(
        engine: Arc<dyn ProxyEngine>,
        listens: Vec<ListenSpec>,
        options: BuildOptions,
        span: Span,
    ) -> Self {
        Self {
            engine,
            listens,
            options,
            state: SessionState::Idle,
            instance: None,
            holds_slot: false,
            span,
        }
    }

    /// 当前进程是否已有会话
    pub fn is_active() -> bool {
        ACTIVE.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 实际使用的监听，启动前为配置值
    pub fn listens(&self) -> &[ListenSpec] {
        match &self.instance {
            Some(instance) => instance.listens(),
            None => &self.listens,
        }
    }

    /// 占用进程内唯一的会话位置，已被占用时返回 `SessionActive`
    pub fn acquire(&mut self) -> Result<()> {
        if self.holds_slot {
            return Ok(());
        }
        if self.state != SessionState::Idle {
            return Err(Error::Engine(format!("session cannot be reused in state {}", self.state)));
        }
        ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::SessionActive)?;
        self.holds_slot = true;
        Ok(())
    }

    pub(crate) fn enter(&mut self, state: SessionState) {
        debug!(parent: &self.span, "session {} -> {}", self.state, state);
        self.state = state;
    }

    /// 用选中的节点构建并启动核心实例，失败时释放全部资源
    pub async fn start(&mut self, nodes: &[Node]) -> Result<()> {
        self.acquire()?;
        self.enter(SessionState::Starting);
        debug!(parent: &self.span, "starting service, choose the {} fastest servers", nodes.len());

        if let Err(e) = self.build_and_start(nodes).await {
            warn!(parent: &self.span, "启动代理失败: {}", e);
            if let Err(close_err) = self.stop().await {
                warn!(parent: &self.span, "释放代理资源失败: {}", close_err);
            }
            return Err(match e {
                e @ Error::Engine(_) => e,
                other => Error::Engine(other.to_string()),
            });
        }

        self.enter(SessionState::Running);
        for listen in self.listens() {
            info!(parent: &self.span, "listening on {} 127.0.0.1:{}", listen.protocol, listen.port);
        }
        Ok(())
    }

    async fn build_and_start(&mut self, nodes: &[Node]) -> Result<()> {
        let listens = if self.listens.is_empty() {
            vec![ListenSpec::new(ListenProtocol::Http, pick_free_tcp_port().await?)]
        } else {
            self.listens.clone()
        };

        let instance = self.engine.build(nodes, &listens, self.options)?;
        self.instance = Some(instance);
        match self.instance.as_mut() {
            Some(instance) => instance.start().await,
            None => Ok(()),
        }
    }

    /// 启动后等待 `shutdown` 完成，然后停止
    pub async fn run_until<F>(&mut self, nodes: &[Node], shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start(nodes).await?;
        shutdown.await;
        info!(parent: &self.span, "收到终止信号，正在关闭代理...");
        self.stop().await
    }

    /// 关闭核心实例并释放会话位置，可以重复调用
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        self.enter(SessionState::Stopping);

        let result = match self.instance.take() {
            Some(mut instance) => instance.close().await,
            None => Ok(()),
        };
        self.release();
        self.enter(SessionState::Stopped);
        result
    }

    fn release(&mut self) {
        if self.holds_slot {
            ACTIVE.store(false, Ordering::SeqCst);
            self.holds_slot = false;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
