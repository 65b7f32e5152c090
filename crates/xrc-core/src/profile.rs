use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::node::Node;

/// 持久化的已选节点（含延迟和标签），JSON 数组
#[derive(Debug, Clone)]
pub struct Profile {
    path: PathBuf,
}

impl Profile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取已保存的节点，文件不存在、无法读取或损坏时返回 `None`
    pub async fn load(&self) -> Option<Vec<Node>> {
        if !self.path.exists() {
            return None;
        }

        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) => {
                warn!("读取节点文件失败 {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<Vec<Node>>(&data) {
            Ok(nodes) => Some(nodes),
            Err(e) => {
                warn!("节点文件已损坏 {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, nodes: &[Node]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(nodes)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
