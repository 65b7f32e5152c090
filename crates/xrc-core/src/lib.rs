//! xrc Core - 订阅解析、节点测速与选择（核心功能）
//!
//! This library provides link parsing, concurrent latency probing, node
//! selection and the proxy session lifecycle on top of an external engine.

// 导出模块
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod link;
pub mod node;
pub mod pool;
pub mod profile;
pub mod selector;
pub mod session;
pub mod subscription;
pub mod tester;

// 从模块导出核心类型
pub use config::{AppPaths, Filter, ListenProtocol, ListenSpec, Settings};
pub use controller::{Controller, Overview};
pub use engine::{BuildOptions, EngineInstance, ProxyEngine, XrayEngine};
pub use error::{Error, ParseError, Result};
pub use link::{parse_lines, parse_link};
pub use node::{Node, Outbound, Protocol};
pub use pool::{ProbeObserver, ProberPool};
pub use profile::Profile;
pub use selector::select_best;
pub use session::{Session, SessionState};
pub use subscription::Fetcher;
pub use tester::{pick_free_tcp_port, ping, LatencyProbe, TestOptions, Tester};

/// 初始化日志，只应在进程启动时调用一次
///
/// 默认级别为 `warn`，`verbose` 时为 `debug`，`RUST_LOG` 优先。
pub fn init_logger(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .init();
}
