use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use tracing::{info, warn};

/// 工作目录名，位于用户主目录下
const WORK_DIR: &str = ".xrc";
const SETTINGS_FILE: &str = "config.toml";
const PROFILE_FILE: &str = "user_profile.json";
const SUBSCRIPTION_CACHE_FILE: &str = "xrc_subscription.tmp";

/// 主配置结构体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// 订阅地址
    #[serde(default)]
    pub urls: Vec<String>,
    /// 代理核心可执行文件
    #[serde(default = "default_core")]
    pub core: String,
    /// 每个节点的测试次数
    #[serde(default = "default_times")]
    pub times: usize,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// 测试并发数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 使用本地 DNS
    #[serde(default)]
    pub use_local_dns: bool,
    /// 测速地址，必须返回 204
    #[serde(default = "default_test_url")]
    pub test_url: String,
    /// 节点过滤器
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// 本地监听
    #[serde(default = "default_listens")]
    pub listens: Vec<ListenSpec>,
}

fn default_core() -> String { "xray".to_string() }
fn default_times() -> usize { 10 }
fn default_timeout() -> u64 { 5 }
fn default_concurrency() -> usize { 12 }
fn default_test_url() -> String {
    "https://cp.cloudflare.com/generate_204".to_string()
}
fn default_listens() -> Vec<ListenSpec> {
    vec![ListenSpec::new(ListenProtocol::Socks, 10888)]
}

/// 节点过滤器：正则选择器 + 标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// 选择器，正则表达式
    pub selector: String,
    /// 标签
    pub tag: String,
}

/// 监听协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenProtocol {
    Http,
    Socks,
}

impl fmt::Display for ListenProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenProtocol::Http => write!(f, "http"),
            ListenProtocol::Socks => write!(f, "socks"),
        }
    }
}

impl std::str::FromStr for ListenProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ListenProtocol::Http),
            "socks" | "socks5" => Ok(ListenProtocol::Socks),
            other => Err(Error::Configuration(format!("unknown listen protocol: {}", other))),
        }
    }
}

/// 本地监听配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenSpec {
    pub protocol: ListenProtocol,
    pub port: u16,
}

impl ListenSpec {
    pub fn new(protocol: ListenProtocol, port: u16) -> Self {
        Self { protocol, port }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            core: default_core(),
            times: default_times(),
            timeout: default_timeout(),
            concurrency: default_concurrency(),
            use_local_dns: false,
            test_url: default_test_url(),
            filters: Vec::new(),
            listens: default_listens(),
        }
    }
}

impl Settings {
    /// 从文件加载配置，文件不存在时写入并返回默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("使用默认配置");
            let settings = Settings::default();
            settings.save_to_file(path)?;
            return Ok(settings);
        }
        Self::from_file(path)
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("无法读取配置文件: {}", e);
                return Err(Error::Configuration(format!("无法读取配置文件: {}", e)));
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(settings) => {
                info!("成功读取配置: {} 个订阅, {} 个过滤器", settings.urls.len(), settings.filters.len());
                Ok(settings)
            }
            Err(e) => {
                warn!("配置文件格式错误: {}", e);
                warn!("尝试使用更宽松的解析方式...");
                Self::parse_with_fallbacks(&content)
            }
        }
    }

    /// 使用更宽松的解析方式，逐个字段读取，无法识别的字段使用默认值
    fn parse_with_fallbacks(content: &str) -> Result<Self> {
        let table = content
            .parse::<toml::Table>()
            .map_err(|e| Error::Configuration(format!("配置文件无法解析: {}", e)))?;
        let mut settings = Settings::default();

        if let Some(urls) = table.get("urls").and_then(|v| v.as_array()) {
            settings.urls = urls
                .iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect();
        }
        if let Some(core) = table.get("core").and_then(|v| v.as_str()) {
            settings.core = core.to_string();
        }
        if let Some(times) = table.get("times").and_then(|v| v.as_integer()) {
            settings.times = times.max(1) as usize;
        }
        if let Some(timeout) = table.get("timeout").and_then(|v| v.as_integer()) {
            settings.timeout = timeout.max(1) as u64;
        }
        if let Some(concurrency) = table.get("concurrency").and_then(|v| v.as_integer()) {
            settings.concurrency = concurrency.max(1) as usize;
        }
        if let Some(local) = table.get("use_local_dns").and_then(|v| v.as_bool()) {
            settings.use_local_dns = local;
        }
        if let Some(url) = table.get("test_url").and_then(|v| v.as_str()) {
            settings.test_url = url.to_string();
        }

        if let Some(filters) = table.get("filters").and_then(|v| v.as_array()) {
            settings.filters = filters
                .iter()
                .filter_map(|f| f.clone().try_into::<Filter>().ok())
                .collect();
        }
        if let Some(listens) = table.get("listens").and_then(|v| v.as_array()) {
            settings.listens = listens
                .iter()
                .filter_map(|l| l.clone().try_into::<ListenSpec>().ok())
                .collect();
        }

        info!("使用宽松解析成功读取配置: {} 个订阅", settings.urls.len());
        Ok(settings)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 追加订阅地址，返回 true 表示需要重新拉取订阅
    pub fn add_url(&mut self, url: &str) -> bool {
        if self.urls.iter().any(|u| u == url) {
            return false;
        }
        self.urls.push(url.to_string());
        true
    }

    /// 追加过滤器，标签取随机 UUID 的前 8 位
    pub fn add_filter(&mut self, selector: &str) -> Option<&Filter> {
        if self.filters.iter().any(|f| f.selector == selector) {
            return None;
        }
        let tag: String = uuid::Uuid::new_v4().to_string().chars().take(8).collect();
        self.filters.push(Filter {
            selector: selector.to_string(),
            tag,
        });
        self.filters.last()
    }

    /// 设置监听端口，已有同协议监听时只修改端口
    pub fn set_listen(&mut self, protocol: ListenProtocol, port: u16) {
        match self.listens.iter_mut().find(|l| l.protocol == protocol) {
            Some(listen) => listen.port = port,
            None => self.listens.push(ListenSpec::new(protocol, port)),
        }
    }

    pub fn remove_url(&mut self, index: usize) -> Result<String> {
        if index >= self.urls.len() {
            return Err(Error::Configuration(format!("no subscription at index {}", index)));
        }
        Ok(self.urls.remove(index))
    }

    pub fn remove_filter(&mut self, index: usize) -> Result<Filter> {
        if index >= self.filters.len() {
            return Err(Error::Configuration(format!("no filter at index {}", index)));
        }
        Ok(self.filters.remove(index))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

/// 程序使用的文件路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub settings: PathBuf,
    pub profile: PathBuf,
    pub subscription_cache: PathBuf,
}

impl AppPaths {
    /// `~/.xrc` 下的配置与节点文件，订阅缓存位于系统临时目录
    pub fn discover() -> Result<Self> {
        let home = directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .ok_or_else(|| Error::Configuration("无法确定用户主目录".to_string()))?;
        let paths = Self::under(home.join(WORK_DIR), std::env::temp_dir());
        fs::create_dir_all(home.join(WORK_DIR))?;
        Ok(paths)
    }

    pub fn under<P: AsRef<Path>, T: AsRef<Path>>(work_dir: P, temp_dir: T) -> Self {
        let work_dir = work_dir.as_ref();
        Self {
            settings: work_dir.join(SETTINGS_FILE),
            profile: work_dir.join(PROFILE_FILE),
            subscription_cache: temp_dir.as_ref().join(SUBSCRIPTION_CACHE_FILE),
        }
    }
}
