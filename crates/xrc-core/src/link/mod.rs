//! 订阅链接解析
//!
//! 支持 `vmess://`、`vless://`、`trojan://` 三种链接，统一解析为 [`Node`]。

mod trojan;
mod vless;
mod vmess;

use std::collections::HashMap;

use base64::engine::general_purpose;
use base64::Engine;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::ParseError;
use crate::node::Node;

pub use trojan::parse_trojan;
pub use vless::parse_vless;
pub use vmess::parse_vmess;

/// 链接类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Vmess,
    Vless,
    Trojan,
}

impl Scheme {
    fn detect(uri: &str) -> Result<(Self, &str), ParseError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ParseError::UnsupportedScheme(truncate(uri)))?;
        let parsed = match scheme.to_ascii_lowercase().as_str() {
            "vmess" => Scheme::Vmess,
            "vless" => Scheme::Vless,
            "trojan" => Scheme::Trojan,
            other => return Err(ParseError::UnsupportedScheme(other.to_string())),
        };
        Ok((parsed, rest))
    }
}

/// 解析单条链接，协议头不区分大小写
pub fn parse_link(uri: &str) -> Result<Node, ParseError> {
    let uri = uri.trim();
    let (scheme, payload) = Scheme::detect(uri)?;
    match scheme {
        Scheme::Vmess => parse_vmess(payload),
        Scheme::Vless => parse_vless(uri),
        Scheme::Trojan => parse_trojan(uri),
    }
}

/// 逐行解析，跳过空行和无法解析的行
pub fn parse_lines(content: &str) -> (Vec<Node>, Vec<(String, ParseError)>) {
    let mut nodes = Vec::new();
    let mut skipped = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_link(line) {
            Ok(node) => nodes.push(node),
            Err(e) => skipped.push((line.to_string(), e)),
        }
    }
    (nodes, skipped)
}

/// 补齐 `=` 后按 base64 解码，兼容省略 padding 的订阅
pub fn decode_base64(content: &str) -> Result<Vec<u8>, ParseError> {
    let mut cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let rem = cleaned.len() % 4;
    if rem != 0 {
        cleaned.push_str(&"=".repeat(4 - rem));
    }

    general_purpose::STANDARD
        .decode(&cleaned)
        .or_else(|_| general_purpose::URL_SAFE.decode(&cleaned))
        .map_err(|e| ParseError::MalformedBase64(e.to_string()))
}

/// trojan / vless 共用的 URL 拆分结果
struct UriParts {
    user: String,
    address: String,
    port: Option<u16>,
    name: String,
    query: HashMap<String, String>,
}

impl UriParts {
    fn parse(uri: &str) -> Result<Self, ParseError> {
        let url = Url::parse(uri).map_err(|e| ParseError::MalformedUrl(e.to_string()))?;

        // 用户信息保持原样，不做 percent 解码
        let user = match url.password() {
            Some(password) => format!("{}:{}", url.username(), password),
            None => url.username().to_string(),
        };

        let address = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .unwrap_or_default();

        let name = url
            .fragment()
            .map(|f| percent_decode_str(f).decode_utf8_lossy().into_owned())
            .unwrap_or_default();

        let mut query = HashMap::new();
        for (k, v) in url.query_pairs() {
            query.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }

        Ok(Self {
            user,
            address,
            port: url.port(),
            name,
            query,
        })
    }

    /// 空值视为缺省
    fn get(&self, key: &str) -> Option<String> {
        self.query
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
    }

    fn flag(&self, key: &str) -> bool {
        self.query
            .get(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}
