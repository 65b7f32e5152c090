//! 提供给命令行的操作：刷新订阅、重新测速、启动会话、查看与修改配置

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Span};

use crate::config::{AppPaths, Filter, ListenProtocol, ListenSpec, Settings};
use crate::engine::{BuildOptions, ProxyEngine};
use crate::error::Result;
use crate::node::Node;
use crate::pool::{ProbeObserver, ProberPool};
use crate::profile::Profile;
use crate::selector::select_best;
use crate::session::{Session, SessionState};
use crate::subscription::Fetcher;
use crate::tester::{TestOptions, Tester};

/// `ls` 展示的全部信息
#[derive(Debug, Clone)]
pub struct Overview {
    /// 核心版本，核心不可用时为错误信息
    pub core_version: std::result::Result<String, String>,
    pub urls: Vec<String>,
    pub nodes: Vec<Node>,
    pub filters: Vec<Filter>,
    pub listens: Vec<ListenSpec>,
}

pub struct Controller {
    settings: Settings,
    paths: AppPaths,
    engine: Arc<dyn ProxyEngine>,
    verbose: bool,
    observer: Option<ProbeObserver>,
    span: Span,
}

impl Controller {
    pub fn new(settings: Settings, paths: AppPaths, engine: Arc<dyn ProxyEngine>, verbose: bool) -> Self {
        Self {
            settings,
            paths,
            engine,
            verbose,
            observer: None,
            span: info_span!("xrc"),
        }
    }

    /// 每个节点测速完成后调用，用于显示进度
    pub fn with_observer(mut self, observer: ProbeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn save_settings(&self) -> Result<()> {
        self.settings.save_to_file(&self.paths.settings)
    }

    /// 追加订阅地址，返回 true 表示是新地址
    pub fn add_url(&mut self, url: &str) -> bool {
        self.settings.add_url(url)
    }

    pub fn add_filter(&mut self, selector: &str) -> Option<Filter> {
        self.settings.add_filter(selector).cloned()
    }

    pub fn set_listen(&mut self, protocol: ListenProtocol, port: u16) {
        self.settings.set_listen(protocol, port);
    }

    pub fn remove_subscription(&mut self, index: usize) -> Result<String> {
        let url = self.settings.remove_url(index)?;
        self.save_settings()?;
        Ok(url)
    }

    pub fn remove_filter(&mut self, index: usize) -> Result<Filter> {
        let filter = self.settings.remove_filter(index)?;
        self.save_settings()?;
        Ok(filter)
    }

    fn fetcher(&self) -> Result<Fetcher> {
        Fetcher::new(self.paths.subscription_cache.clone(), self.span.clone())
    }

    fn profile(&self) -> Profile {
        Profile::new(self.paths.profile.clone())
    }

    fn pool(&self) -> ProberPool {
        let tester = Tester::new(Arc::clone(&self.engine), TestOptions::from_settings(&self.settings));
        let pool = ProberPool::new(Arc::new(tester), self.settings.concurrency, self.span.clone());
        match &self.observer {
            Some(observer) => pool.with_observer(Arc::clone(observer)),
            None => pool,
        }
    }

    /// 重新拉取全部订阅，返回节点数量
    pub async fn refresh_subscriptions(&self) -> Result<usize> {
        let nodes = self.fetcher()?.resubscribe(&self.settings.urls).await?;
        info!(parent: &self.span, "fetch subscription success, {} nodes", nodes.len());
        Ok(nodes.len())
    }

    async fn measure(&self) -> Result<Vec<Node>> {
        let nodes = self.fetcher()?.fetch_cached(&self.settings.urls).await?;
        info!(parent: &self.span, "measuring delay of {} nodes", nodes.len());
        Ok(self.pool().measure_all(nodes).await)
    }

    async fn select_and_persist(&self, measured: &[Node]) -> Result<Vec<Node>> {
        let selected = select_best(measured, &self.settings.filters)?;
        if let Err(e) = self.profile().save(&selected).await {
            warn!(parent: &self.span, "保存节点失败: {}", e);
        }
        Ok(selected)
    }

    /// 测速全部节点并保存新的选择
    pub async fn remeasure(&self) -> Result<Vec<Node>> {
        let measured = self.measure().await?;
        self.select_and_persist(&measured).await
    }

    /// 已保存的节点，需要刷新或没有可用记录时重新测速
    pub async fn selected_nodes(&self, refresh: bool) -> Result<Vec<Node>> {
        self.resolve_nodes(refresh, |_| {}).await
    }

    /// 测速和选择开始时通过 `enter` 通知会话状态
    async fn resolve_nodes<E>(&self, refresh: bool, mut enter: E) -> Result<Vec<Node>>
    where
        E: FnMut(SessionState),
    {
        if !refresh {
            if let Some(nodes) = self.persisted().await {
                debug!(parent: &self.span, "使用已保存的 {} 个节点", nodes.len());
                return Ok(nodes);
            }
        }
        enter(SessionState::Probing);
        let measured = self.measure().await?;
        enter(SessionState::Selecting);
        self.select_and_persist(&measured).await
    }

    async fn persisted(&self) -> Option<Vec<Node>> {
        self.profile().load().await.filter(|nodes| !nodes.is_empty())
    }

    /// 启动代理会话，直到 `shutdown` 完成
    pub async fn start_session<F>(&self, refresh: bool, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let options = BuildOptions {
            verbose: self.verbose,
            use_local_dns: self.settings.use_local_dns,
        };
        let mut session = Session::new(
            Arc::clone(&self.engine),
            self.settings.listens.clone(),
            options,
            self.span.clone(),
        );
        session.acquire()?;

        let nodes = self
            .resolve_nodes(refresh, |state| session.enter(state))
            .await?;

        session.run_until(&nodes, shutdown).await
    }

    /// 汇总当前配置和已保存的节点
    pub async fn overview(&self) -> Overview {
        Overview {
            core_version: self.engine.version().await.map_err(|e| e.to_string()),
            urls: self.settings.urls.clone(),
            nodes: self.profile().load().await.unwrap_or_default(),
            filters: self.settings.filters.clone(),
            listens: self.settings.listens.clone(),
        }
    }
}
