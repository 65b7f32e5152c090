//! 以子进程方式运行 xray
//!
//! ```text
//! XrayEngine::build(nodes, listens)
//!   → 生成 EngineConfig
//! instance.start()
//!   → 写入临时配置文件
//!   → 启动 `xray run -c <file>`
//!   → 等待第一个监听端口可连接
//! instance.close()
//!   → 结束子进程，删除配置文件
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::dial::dial_through;
use super::xray::EngineConfig;
use super::{BuildOptions, EngineInstance, ProxyEngine};
use crate::config::ListenSpec;
use crate::error::{Error, Result};
use crate::node::Node;

/// 等待核心监听就绪的最长时间
const START_TIMEOUT: Duration = Duration::from_secs(5);
const START_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// xray 可执行文件
#[derive(Debug, Clone)]
pub struct XrayEngine {
    binary: String,
    config_dir: PathBuf,
}

impl XrayEngine {
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
            config_dir: std::env::temp_dir(),
        }
    }

    /// 配置文件写入的目录，默认为系统临时目录
    pub fn with_config_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config_dir = dir.into();
        self
    }
}

#[async_trait]
impl ProxyEngine for XrayEngine {
    fn build(
        &self,
        nodes: &[Node],
        listens: &[ListenSpec],
        options: BuildOptions,
    ) -> Result<Box<dyn EngineInstance>> {
        let config = EngineConfig::build(nodes, listens, options)?;
        let config_path = self
            .config_dir
            .join(format!("xrc-{}.json", uuid::Uuid::new_v4().simple()));
        Ok(Box::new(XrayInstance {
            binary: self.binary.clone(),
            config,
            config_path,
            listens: listens.to_vec(),
            child: None,
        }))
    }

    async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Engine(format!("failed to run {}: {}", self.binary, e)))?;
        if !output.status.success() {
            return Err(Error::Engine(format!("{} version exited with {}", self.binary, output.status)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

/// 运行中的 xray 子进程
pub struct XrayInstance {
    binary: String,
    config: EngineConfig,
    config_path: PathBuf,
    listens: Vec<ListenSpec>,
    child: Option<Child>,
}

impl XrayInstance {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn wait_until_listening(&mut self) -> Result<()> {
        let Some(first) = self.listens.first().copied() else {
            return Ok(());
        };
        let addr = format!("127.0.0.1:{}", first.port);
        let deadline = tokio::time::Instant::now() + START_TIMEOUT;

        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(Error::Engine(format!("engine exited during startup with {}", status)));
                }
            }
            if TcpStream::connect(&addr).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("核心未能在时限内监听 {}", addr);
                return Err(Error::Timeout(START_TIMEOUT.as_millis() as u64));
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl EngineInstance for XrayInstance {
    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(Error::Engine("engine instance already started".to_string()));
        }

        tokio::fs::write(&self.config_path, self.config.to_json()?).await?;

        let child = Command::new(&self.binary)
            .arg("run")
            .arg("-c")
            .arg(&self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Engine(format!("failed to spawn {}: {}", self.binary, e)))?;
        debug!("核心进程已启动: {:?}", child.id());
        self.child = Some(child);

        self.wait_until_listening().await?;
        info!("核心已就绪，监听 {} 个端口", self.listens.len());
        Ok(())
    }

    async fn dial(&self, destination: &str) -> Result<TcpStream> {
        let listen = self
            .listens
            .first()
            .ok_or_else(|| Error::Engine("engine instance has no listener".to_string()))?;
        dial_through(listen, destination).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("结束核心进程失败: {}", e);
            }
            let _ = tokio::time::timeout(STOP_TIMEOUT, child.wait()).await;
            debug!("核心进程已退出");
        }
        match tokio::fs::remove_file(&self.config_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn listens(&self) -> &[ListenSpec] {
        &self.listens
    }
}

impl Drop for XrayInstance {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        let _ = std::fs::remove_file(&self.config_path);
    }
}
