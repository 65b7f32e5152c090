use serde::{Deserialize, Serialize};
use std::fmt;

/// 未测试或不可达节点的延迟值
pub const UNREACHABLE: i32 = -1;

/// 未打标签节点使用的出站标签
pub const DEFAULT_OUTBOUND_TAG: &str = "proxy";

/// 节点协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Vmess => write!(f, "vmess"),
            Protocol::Vless => write!(f, "vless"),
            Protocol::Trojan => write!(f, "trojan"),
        }
    }
}

/// 传输层参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// 传输协议，tcp，kcp，ws，h2，quic，grpc
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// 伪装类型，none，http
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_type: Option<String>,
    /// 伪装域名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// 路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// 传输层安全参数（TLS / Reality）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// tls，reality，none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// 服务器名称指示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    /// h2，http/1.1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    /// TLS指纹
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// 跳过证书验证
    #[serde(default)]
    pub allow_insecure: bool,
    /// Reality 公钥
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Reality short id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmessSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub uuid: String,
    #[serde(default)]
    pub alter_id: i64,
    /// 加密方式，aes-128-gcm，chacha20-poly1305，auto，none，zero
    pub cipher: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub security: Security,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlessSettings {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// xtls-rprx-vision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub security: Security,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrojanSettings {
    pub password: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub security: Security,
}

/// 各协议独有的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum Outbound {
    Vmess(VmessSettings),
    Vless(VlessSettings),
    Trojan(TrojanSettings),
}

/// 从订阅链接解析出的代理节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// 节点名称
    #[serde(default)]
    pub name: String,
    /// 域名或IP
    pub address: String,
    pub port: u16,
    pub outbound: Outbound,
    /// 测速结果（毫秒），-1 表示未测试或不可达
    #[serde(default = "default_delay")]
    pub delay: i32,
    /// 过滤器分配的标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

fn default_delay() -> i32 {
    UNREACHABLE
}

impl Node {
    pub fn new(name: String, address: String, port: u16, outbound: Outbound) -> Self {
        Self {
            name,
            address,
            port,
            outbound,
            delay: UNREACHABLE,
            tag: None,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.outbound {
            Outbound::Vmess(_) => Protocol::Vmess,
            Outbound::Vless(_) => Protocol::Vless,
            Outbound::Trojan(_) => Protocol::Trojan,
        }
    }

    /// uuid 或 password
    pub fn identity(&self) -> &str {
        match &self.outbound {
            Outbound::Vmess(v) => &v.uuid,
            Outbound::Vless(v) => &v.uuid,
            Outbound::Trojan(t) => &t.password,
        }
    }

    /// address + port + identity 唯一确定一个节点
    pub fn key(&self) -> String {
        format!("{}:{}|{}", self.address, self.port, self.identity())
    }

    pub fn transport(&self) -> &Transport {
        match &self.outbound {
            Outbound::Vmess(v) => &v.transport,
            Outbound::Vless(v) => &v.transport,
            Outbound::Trojan(t) => &t.transport,
        }
    }

    pub fn security(&self) -> &Security {
        match &self.outbound {
            Outbound::Vmess(v) => &v.security,
            Outbound::Vless(v) => &v.security,
            Outbound::Trojan(t) => &t.security,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.delay > UNREACHABLE
    }

    pub fn outbound_tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_OUTBOUND_TAG)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}://{}:{})", self.name, self.protocol(), self.address, self.port)
    }
}
