//! 测试用的进程内核心：在第一个监听端口上按脚本返回 HTTP 响应

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use xrc_core::{BuildOptions, EngineInstance, Error, ListenSpec, Node, ProxyEngine, Result};

pub const TEST_URL: &str = "http://probe.test/generate_204";

/// 一次请求的响应：状态码和服务端延迟
#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub status: u16,
    pub delay_ms: u64,
}

pub fn no_content(delay_ms: u64) -> Reply {
    Reply { status: 204, delay_ms }
}

pub fn ok_with_body(delay_ms: u64) -> Reply {
    Reply { status: 200, delay_ms }
}

#[derive(Debug, Clone)]
pub enum Behaviour {
    /// 按顺序返回，用完后重复最后一个
    Replies(Vec<Reply>),
    /// start 失败
    FailStart,
}

#[derive(Default)]
pub struct Stats {
    pub builds: AtomicUsize,
    pub starts: AtomicUsize,
    pub closes: AtomicUsize,
    pub last_nodes: Mutex<Vec<Node>>,
    pub last_listens: Mutex<Vec<ListenSpec>>,
    pub last_options: Mutex<Option<BuildOptions>>,
}

/// 按节点名决定行为，未配置的节点总是立即返回 204
#[derive(Clone, Default)]
pub struct FakeEngine {
    behaviours: Arc<HashMap<String, Behaviour>>,
    pub stats: Arc<Stats>,
}

impl FakeEngine {
    pub fn new(behaviours: Vec<(&str, Behaviour)>) -> Self {
        Self {
            behaviours: Arc::new(
                behaviours
                    .into_iter()
                    .map(|(name, b)| (name.to_string(), b))
                    .collect(),
            ),
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn builds(&self) -> usize {
        self.stats.builds.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyEngine for FakeEngine {
    fn build(
        &self,
        nodes: &[Node],
        listens: &[ListenSpec],
        options: BuildOptions,
    ) -> Result<Box<dyn EngineInstance>> {
        self.stats.builds.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_nodes.lock().unwrap() = nodes.to_vec();
        *self.stats.last_listens.lock().unwrap() = listens.to_vec();
        *self.stats.last_options.lock().unwrap() = Some(options);

        let behaviour = nodes
            .first()
            .and_then(|n| self.behaviours.get(&n.name).cloned())
            .unwrap_or_else(|| Behaviour::Replies(vec![no_content(0)]));

        Ok(Box::new(FakeInstance {
            listens: listens.to_vec(),
            behaviour,
            stats: Arc::clone(&self.stats),
            server: None,
        }))
    }

    async fn version(&self) -> Result<String> {
        Ok("Xray 1.8.24 (fake)".to_string())
    }
}

pub struct FakeInstance {
    listens: Vec<ListenSpec>,
    behaviour: Behaviour,
    stats: Arc<Stats>,
    server: Option<JoinHandle<()>>,
}

#[async_trait]
impl EngineInstance for FakeInstance {
    async fn start(&mut self) -> Result<()> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        let replies = match &self.behaviour {
            Behaviour::FailStart => return Err(Error::Engine("fake engine refused to start".to_string())),
            Behaviour::Replies(replies) => replies.clone(),
        };
        let Some(listen) = self.listens.first() else {
            return Ok(());
        };

        let listener = TcpListener::bind(("127.0.0.1", listen.port)).await?;
        self.server = Some(tokio::spawn(serve(listener, replies)));
        Ok(())
    }

    async fn dial(&self, _destination: &str) -> Result<TcpStream> {
        let listen = self
            .listens
            .first()
            .ok_or_else(|| Error::Engine("no listener".to_string()))?;
        Ok(TcpStream::connect(("127.0.0.1", listen.port)).await?)
    }

    async fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(server) = self.server.take() {
            server.abort();
            let _ = server.await;
        }
        Ok(())
    }

    fn listens(&self) -> &[ListenSpec] {
        &self.listens
    }
}

async fn serve(listener: TcpListener, replies: Vec<Reply>) {
    let served = Arc::new(AtomicUsize::new(0));
    while let Ok((stream, _)) = listener.accept().await {
        let index = served.fetch_add(1, Ordering::SeqCst);
        let reply = replies
            .get(index)
            .or_else(|| replies.last())
            .copied()
            .unwrap_or_else(|| no_content(0));
        tokio::spawn(respond(stream, reply));
    }
}

async fn respond(mut stream: TcpStream, reply: Reply) {
    // 读到请求头结束
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    tokio::time::sleep(Duration::from_millis(reply.delay_ms)).await;
    let response = match reply.status {
        204 => "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string(),
        status => format!("HTTP/1.1 {status} Other\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"),
    };
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// 用名称构造一个 trojan 节点
pub fn node(name: &str) -> Node {
    let mut node = xrc_core::parse_link(&format!("trojan://pw-{name}@{name}.example.com:443")).unwrap();
    node.name = name.to_string();
    node
}
