//! xrc - A xray client
//!
//! 订阅解析、节点测速与选择，以及基于 xray 的本地代理。

// 重导出core库
pub use xrc_core::{
    init_logger, select_best, AppPaths, Controller, Error, Filter, ListenProtocol, ListenSpec, Node,
    Result, Settings, XrayEngine,
};

pub use xrc_cli::{execute, run, Cli, Command, PlainReporter, Reporter};

// 可选的彩色终端界面
#[cfg(feature = "ui")]
pub mod ui;
