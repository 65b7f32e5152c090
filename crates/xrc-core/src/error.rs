use std::io;

/// 订阅链接解析错误
///
/// 单行解析失败只会被记录并跳过，不会中断整批解析。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// 不支持的协议头
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// URL 格式错误
    #[error("parse url failed: {0}")]
    MalformedUrl(String),
    /// base64 解码失败
    #[error("illegal base64 data: {0}")]
    MalformedBase64(String),
    /// JSON 格式错误
    #[error("json unmarshal failed: {0}")]
    MalformedJson(String),
}

/// Error type for xrc operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO操作错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// 链接或订阅内容解析错误
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// 订阅拉取失败，整批中止
    #[error("fetch subscription failed, url: {url}: {reason}")]
    Network { url: String, reason: String },
    /// 没有配置订阅地址
    #[error("no subscription urls")]
    NoSubscriptionUrls,
    /// 单个节点测速失败
    #[error("Probe failed: {0}")]
    Probe(String),
    /// 没有可用节点
    #[error("no server available")]
    NoServerAvailable,
    /// 代理核心构建或启动失败
    #[error("Engine error: {0}")]
    Engine(String),
    /// 暂不支持的功能
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// 已有会话在运行
    #[error("a proxy session is already running")]
    SessionActive,
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 超时错误
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

/// Result type for xrc operations
pub type Result<T> = std::result::Result<T, Error>;

/// 从reqwest错误转换
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        Error::Network {
            url,
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// 从toml错误转换
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// 从toml序列化错误转换
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
