//! 通过本地监听拨号：socks 使用 SOCKS5 CONNECT，http 使用 HTTP CONNECT

use std::net::IpAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{ListenProtocol, ListenSpec};
use crate::error::{Error, Result};

const LOCALHOST: &str = "127.0.0.1";
/// CONNECT 响应头的最大长度
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// 经由本地监听连接 `host:port`
pub async fn dial_through(listen: &ListenSpec, destination: &str) -> Result<TcpStream> {
    let proxy = format!("{}:{}", LOCALHOST, listen.port);
    match listen.protocol {
        ListenProtocol::Socks => socks5_connect(&proxy, destination).await,
        ListenProtocol::Http => http_connect(&proxy, destination).await,
    }
}

fn split_destination(destination: &str) -> Result<(String, u16)> {
    let (host, port) = destination
        .rsplit_once(':')
        .ok_or_else(|| Error::Probe(format!("invalid destination: {}", destination)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::Probe(format!("invalid destination port: {}", destination)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}

/// 与本地 SOCKS5 监听握手并请求连接目标
pub async fn socks5_connect(proxy: &str, destination: &str) -> Result<TcpStream> {
    let (host, port) = split_destination(destination)?;
    let mut upstream = TcpStream::connect(proxy).await?;

    // 无认证
    upstream.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut response = [0u8; 2];
    upstream.read_exact(&mut response).await?;
    if response[0] != 0x05 || response[1] != 0x00 {
        return Err(Error::Probe("SOCKS5 握手失败".to_string()));
    }

    let mut request = vec![0x05, 0x01, 0x00]; // VER, CMD, RSV
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len())
                .map_err(|_| Error::Probe(format!("domain too long: {}", host)))?;
            request.push(0x03);
            request.push(len);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    upstream.write_all(&request).await?;

    let mut reply = [0u8; 4];
    upstream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(Error::Probe(format!("SOCKS5 连接目标失败: {}", reply[1])));
    }

    // 跳过绑定地址和端口
    match reply[3] {
        0x01 => {
            let mut addr = [0u8; 4];
            upstream.read_exact(&mut addr).await?;
        }
        0x03 => {
            let len = upstream.read_u8().await?;
            let mut domain = vec![0u8; len as usize];
            upstream.read_exact(&mut domain).await?;
        }
        0x04 => {
            let mut addr = [0u8; 16];
            upstream.read_exact(&mut addr).await?;
        }
        other => return Err(Error::Probe(format!("不支持的地址类型: {}", other))),
    }
    let mut bound_port = [0u8; 2];
    upstream.read_exact(&mut bound_port).await?;

    Ok(upstream)
}

/// 向本地 HTTP 监听发送 CONNECT 请求
pub async fn http_connect(proxy: &str, destination: &str) -> Result<TcpStream> {
    split_destination(destination)?;
    let mut upstream = TcpStream::connect(proxy).await?;
    let request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", destination);
    upstream.write_all(request.as_bytes()).await?;

    let head = read_response_head(&mut upstream).await?;
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        return Err(Error::Probe(format!("CONNECT 被拒绝: {}", status_line.trim())));
    }

    Ok(upstream)
}

/// 逐字节读到空行为止，隧道数据留在连接里
async fn read_response_head(upstream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::Probe("CONNECT 响应头过长".to_string()));
        }
        match upstream.read_u8().await {
            Ok(byte) => head.push(byte),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::Probe("CONNECT 响应不完整".to_string()));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
