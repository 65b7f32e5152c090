use serde_json::{Map, Value};

use super::decode_base64;
use crate::error::ParseError;
use crate::node::{Node, Outbound, Security, Transport, VmessSettings};

const DEFAULT_CIPHER: &str = "auto";

/// 解析 `vmess://` 之后的 base64 JSON 负载
///
/// 逐字段读取而不是按固定结构反序列化，以兼容缺失字段和旧版字段。
pub fn parse_vmess(payload: &str) -> Result<Node, ParseError> {
    let bytes = decode_base64(payload)?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::MalformedJson("expected a JSON object".to_string()))?;

    // scy 优先，其次是旧版的 security 字段
    let cipher = text(obj, "scy")
        .or_else(|| text(obj, "security"))
        .unwrap_or_else(|| DEFAULT_CIPHER.to_string());

    let settings = VmessSettings {
        version: text(obj, "v"),
        uuid: text(obj, "id").unwrap_or_default(),
        alter_id: integer(obj, "aid").unwrap_or(0),
        cipher,
        transport: Transport {
            network: text(obj, "net"),
            header_type: text(obj, "type"),
            host: text(obj, "host"),
            path: text(obj, "path"),
        },
        security: Security {
            mode: text(obj, "tls"),
            sni: text(obj, "sni"),
            alpn: text(obj, "alpn"),
            fingerprint: text(obj, "fp"),
            allow_insecure: obj
                .get("skip-cert-verify")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            public_key: None,
            short_id: None,
        },
    };

    let port = integer(obj, "port")
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(0);

    Ok(Node::new(
        text(obj, "ps").unwrap_or_default(),
        text(obj, "add").unwrap_or_default(),
        port,
        Outbound::Vmess(settings),
    ))
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 数值字段可能是浮点数或字符串，统一截断为整数
fn integer(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}
