//! 代理核心适配层
//!
//! 真正的数据转发由外部核心完成，这里只负责生成配置、启动、拨号和关闭。

mod dial;
mod process;
mod xray;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::ListenSpec;
use crate::error::Result;
use crate::node::Node;

pub use dial::{dial_through, http_connect, socks5_connect};
pub use process::{XrayEngine, XrayInstance};
pub use xray::EngineConfig;

/// 构建选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// 输出核心的调试日志
    pub verbose: bool,
    /// 使用本地 DNS
    pub use_local_dns: bool,
}

/// 代理核心
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    /// 用节点和监听配置构建一个未启动的实例
    fn build(
        &self,
        nodes: &[Node],
        listens: &[ListenSpec],
        options: BuildOptions,
    ) -> Result<Box<dyn EngineInstance>>;

    /// 核心版本
    async fn version(&self) -> Result<String>;
}

/// 一个核心实例
#[async_trait]
pub trait EngineInstance: Send + Sync {
    async fn start(&mut self) -> Result<()>;

    /// 通过实例的第一个监听连接 `host:port`
    async fn dial(&self, destination: &str) -> Result<TcpStream>;

    /// 关闭实例并释放监听端口，可以重复调用
    async fn close(&mut self) -> Result<()>;

    fn listens(&self) -> &[ListenSpec];
}
