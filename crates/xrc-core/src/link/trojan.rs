use super::UriParts;
use crate::error::ParseError;
use crate::node::{Node, Outbound, Security, Transport, TrojanSettings};

const DEFAULT_PORT: u16 = 443;

/// 解析 `trojan://password@host:port?query#name`
///
/// 密码保持原样（不做 percent 解码），缺省端口为 443。
pub fn parse_trojan(uri: &str) -> Result<Node, ParseError> {
    let parts = UriParts::parse(uri)?;

    let settings = TrojanSettings {
        password: parts.user.clone(),
        transport: Transport {
            network: parts.get("net"),
            header_type: parts.get("type"),
            host: parts.get("host"),
            path: parts.get("path"),
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
        Outbound::Trojan(settings),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trojan(node: &Node) -> &TrojanSettings {
        match &node.outbound {
            Outbound::Trojan(t) => t,
            other => panic!("expected trojan, got {other:?}"),
        }
    }

    #[test]
    fn basic_parsing() {
        let node = parse_trojan("trojan://mypass@example.com:8443#my-node").unwrap();
        assert_eq!(node.name, "my-node");
        assert_eq!(node.address, "example.com");
        assert_eq!(node.port, 8443);
        assert_eq!(trojan(&node).password, "mypass");

        let node = parse_trojan("trojan://pass@192.168.1.1:443").unwrap();
        assert_eq!(node.address, "192.168.1.1");
        assert_eq!(node.name, "");
    }

    #[test]
    fn missing_port_defaults_to_443() {
        let node = parse_trojan("trojan://password@example.com").unwrap();
        assert_eq!(node.address, "example.com");
        assert_eq!(node.port, 443);

        let node = parse_trojan("trojan://password@example.com:10443").unwrap();
        assert_eq!(node.port, 10443);
    }

    #[test]
    fn fragment_is_percent_decoded() {
        let node = parse_trojan("trojan://password@example.com:443#%E9%A6%99%E6%B8%AF").unwrap();
        assert_eq!(node.name, "香港");
    }

    #[test]
    fn password_is_kept_as_received() {
        let node = parse_trojan("trojan://p%40ssw0rd@example.com:443").unwrap();
        assert_eq!(trojan(&node).password, "p%40ssw0rd");
    }

    #[test]
    fn query_parameters_map_to_fields() {
        let node = parse_trojan(
            "trojan://pass@example.com:443?security=tls&sni=example.com&alpn=h2&fp=chrome&pbk=publickey&sid=shortid&net=ws&type=http&host=cdn.example.com&path=/proxy#node",
        )
        .unwrap();
        let t = trojan(&node);
        assert_eq!(node.name, "node");
        assert_eq!(t.security.mode.as_deref(), Some("tls"));
        assert_eq!(t.security.sni.as_deref(), Some("example.com"));
        assert_eq!(t.security.alpn.as_deref(), Some("h2"));
        assert_eq!(t.security.fingerprint.as_deref(), Some("chrome"));
        assert_eq!(t.security.public_key.as_deref(), Some("publickey"));
        assert_eq!(t.security.short_id.as_deref(), Some("shortid"));
        assert!(!t.security.allow_insecure);
        assert_eq!(t.transport.network.as_deref(), Some("ws"));
        assert_eq!(t.transport.header_type.as_deref(), Some("http"));
        assert_eq!(t.transport.host.as_deref(), Some("cdn.example.com"));
        assert_eq!(t.transport.path.as_deref(), Some("/proxy"));
    }

    #[test]
    fn empty_query_values_are_absent() {
        let node = parse_trojan("trojan://pass@example.com:443?security=&alpn=").unwrap();
        let t = trojan(&node);
        assert_eq!(t.security.mode, None);
        assert_eq!(t.security.alpn, None);
    }

    #[test]
    fn allow_insecure_values() {
        let cases = [
            ("?allowInsecure=1", true),
            ("?allowInsecure=true", true),
            ("?allowInsecure=True", true),
            ("?allowInsecure=TRUE", true),
            ("", false),
            ("?allowInsecure=false", false),
            ("?allowInsecure=0", false),
            ("?allowInsecure=yes", false),
        ];
        for (query, expected) in cases {
            let uri = format!("trojan://pass@example.com:443{query}");
            let node = parse_trojan(&uri).unwrap();
            assert_eq!(trojan(&node).security.allow_insecure, expected, "{uri}");
        }
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(matches!(
            parse_trojan("trojan://[invalid"),
            Err(ParseError::MalformedUrl(_))
        ));
    }
}
