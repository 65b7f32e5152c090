//! xray JSON 配置生成

use std::borrow::Cow;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::BuildOptions;
use crate::config::ListenSpec;
use crate::error::{Error, Result};
use crate::node::{Node, Outbound, Security, Transport};

const DEFAULT_DNS: &str = "8.8.8.8";
const LOCAL_DNS: &str = "127.0.0.1";
const DNS_TAG: &str = "dnsQuery";
const LISTEN_ADDR: &str = "127.0.0.1";

/// 完整的核心配置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    pub log: Value,
    pub dns: Value,
    pub inbounds: Vec<Value>,
    pub outbounds: Vec<Value>,
    pub routing: Value,
}

impl EngineConfig {
    pub fn build(nodes: &[Node], listens: &[ListenSpec], options: BuildOptions) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Engine("cannot build engine config without nodes".to_string()));
        }

        let dns_addr = if options.use_local_dns { LOCAL_DNS } else { DEFAULT_DNS };
        let log_level = if options.verbose { "debug" } else { "error" };

        let mut outbounds = nodes.iter().map(node_outbound).collect::<Result<Vec<_>>>()?;
        outbounds.extend(dns_outbounds(dns_addr));

        Ok(Self {
            log: json!({ "loglevel": log_level }),
            dns: json!({ "tag": DNS_TAG, "servers": [dns_addr] }),
            inbounds: listens.iter().map(inbound).collect(),
            outbounds,
            routing: json!({
                "rules": [
                    { "type": "field", "inboundTag": [DNS_TAG], "outboundTag": "proxy" },
                    { "type": "field", "port": "53", "outboundTag": "dnsOut" },
                ]
            }),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn inbound(listen: &ListenSpec) -> Value {
    let protocol = listen.protocol.to_string();
    json!({
        "tag": protocol,
        "protocol": protocol,
        "listen": LISTEN_ADDR,
        "port": listen.port,
        "sniffing": { "enabled": true, "destOverride": ["http", "tls", "quic"] },
        "settings": { "auth": "noauth", "udp": true, "userLevel": 0 },
    })
}

fn node_outbound(node: &Node) -> Result<Value> {
    let (protocol, settings, transport, security) = match &node.outbound {
        Outbound::Vmess(v) => (
            "vmess",
            json!({
                "vnext": [{
                    "address": node.address,
                    "port": node.port,
                    "users": [{
                        "id": v.uuid,
                        "alterId": v.alter_id,
                        "level": 0,
                        "security": v.cipher,
                    }],
                }]
            }),
            Cow::Borrowed(&v.transport),
            &v.security,
        ),
        Outbound::Trojan(t) => (
            "trojan",
            json!({
                "servers": [{
                    "address": node.address,
                    "port": node.port,
                    "password": t.password,
                    "level": 0,
                }]
            }),
            trojan_transport(&t.transport),
            &t.security,
        ),
        Outbound::Vless(_) => {
            return Err(Error::Unsupported(format!("vless outbound: {}", node.name)));
        }
    };

    Ok(json!({
        "tag": node.outbound_tag(),
        "protocol": protocol,
        "settings": settings,
        "streamSettings": stream_settings(&transport, security),
    }))
}

/// 传输层名称，trojan 分享链接通常把它放在 `type` 参数里
const TRANSPORTS: [&str; 7] = ["tcp", "kcp", "ws", "h2", "http", "quic", "grpc"];

/// 没有 `net` 且 `type` 是传输层名称时，按 `type` 选择传输层
fn trojan_transport(transport: &Transport) -> Cow<'_, Transport> {
    match (&transport.network, transport.header_type.as_deref()) {
        (None, Some(kind)) if TRANSPORTS.contains(&kind) => Cow::Owned(Transport {
            network: Some(kind.to_string()),
            header_type: None,
            ..transport.clone()
        }),
        _ => Cow::Borrowed(transport),
    }
}

fn stream_settings(transport: &Transport, security: &Security) -> Value {
    let network = transport.network.as_deref().unwrap_or("tcp");
    let mut stream = Map::new();
    stream.insert("network".into(), json!(network));

    match network {
        "ws" => {
            let mut ws = Map::new();
            if let Some(path) = &transport.path {
                ws.insert("path".into(), json!(path));
            }
            if let Some(host) = &transport.host {
                ws.insert("headers".into(), json!({ "Host": host }));
            }
            stream.insert("wsSettings".into(), Value::Object(ws));
        }
        "grpc" => {
            if let Some(service) = &transport.path {
                stream.insert("grpcSettings".into(), json!({ "serviceName": service }));
            }
        }
        "tcp" if transport.header_type.as_deref() == Some("http") => {
            stream.insert("tcpSettings".into(), json!({ "header": { "type": "http" } }));
        }
        _ => {}
    }

    match security.mode.as_deref() {
        Some("tls") => {
            let mut tls = Map::new();
            tls.insert("allowInsecure".into(), json!(security.allow_insecure));
            if let Some(name) = transport.host.as_ref().or(security.sni.as_ref()) {
                tls.insert("serverName".into(), json!(name));
            }
            if let Some(fp) = &security.fingerprint {
                tls.insert("fingerprint".into(), json!(fp));
            }
            if let Some(alpn) = &security.alpn {
                let list: Vec<&str> = alpn.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
                tls.insert("alpn".into(), json!(list));
            }
            stream.insert("security".into(), json!("tls"));
            stream.insert("tlsSettings".into(), Value::Object(tls));
        }
        Some("reality") => {
            stream.insert("security".into(), json!("reality"));
            stream.insert(
                "realitySettings".into(),
                json!({
                    "serverName": security.sni.clone().unwrap_or_default(),
                    "publicKey": security.public_key.clone().unwrap_or_default(),
                    "shortId": security.short_id.clone().unwrap_or_default(),
                    "fingerprint": security.fingerprint.clone().unwrap_or_else(|| "chrome".to_string()),
                }),
            );
        }
        _ => {}
    }

    Value::Object(stream)
}

fn dns_outbounds(dns_addr: &str) -> [Value; 3] {
    [
        json!({ "tag": "direct", "protocol": "freedom", "settings": { "userLevel": 0 } }),
        json!({ "tag": "reject", "protocol": "blackhole" }),
        json!({
            "tag": "dnsOut",
            "protocol": "dns",
            "streamSettings": { "sockopt": { "dialerProxy": "proxy" } },
            "settings": { "address": dns_addr, "nonIpQuery": "skip", "userLevel": 0 },
        }),
    ]
}
