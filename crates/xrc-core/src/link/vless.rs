use super::UriParts;
use crate::error::ParseError;
use crate::node::{Node, Outbound, Security, Transport, VlessSettings};

const DEFAULT_PORT: u16 = 443;

/// 解析 `vless://uuid@host:port?query#name`
pub fn parse_vless(uri: &str) -> Result<Node, ParseError> {
    let parts = UriParts::parse(uri)?;

    let settings = VlessSettings {
        uuid: parts.user.clone(),
        encryption: parts.get("encryption"),
        flow: parts.get("flow"),
        transport: Transport {
            network: parts.get("type").or_else(|| parts.get("net")),
            header_type: parts.get("headerType"),
            host: parts.get("host"),
            path: parts.get("path").or_else(|| parts.get("serviceName")),
        },
        security: Security {
            mode: parts.get("security"),
            sni: parts.get("sni"),
            alpn: parts.get("alpn"),
            fingerprint: parts.get("fp"),
            allow_insecure: parts.flag("allowInsecure"),
            public_key: parts.get("pbk"),
            short_id: parts.get("sid"),
        },
    };

    Ok(Node::new(
        parts.name,
        parts.address,
        parts.port.unwrap_or(DEFAULT_PORT),
        Outbound::Vless(settings),
    ))
}
