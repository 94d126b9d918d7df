//! 客户端 IP 提取
//!
//! 评分和封禁都以 IP 为键，所以只在连接来自可信代理时才采信转发头：
//! - 显式配置了 `api.trusted_proxies`：peer 命中才读转发头
//! - 未配置：peer 为私有地址/localhost 时视为反向代理
//! - 其他情况使用连接 IP，防止伪造

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

/// 解析 `ip` 或 `ip:port`
pub fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<SocketAddr>()
        .map(|s| s.ip())
        .or_else(|_| value.parse::<IpAddr>())
        .ok()
}

/// 私有地址或 localhost
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

/// peer 是否在可信代理列表中（单 IP 或 CIDR）
pub fn is_trusted_proxy(peer: &str, trusted_proxies: &[String]) -> bool {
    let Some(addr) = parse_ip(peer) else {
        return false;
    };

    trusted_proxies.iter().any(|proxy| {
        if proxy.contains('/') {
            ip_in_cidr(&addr, proxy)
        } else {
            proxy.parse::<IpAddr>().is_ok_and(|p| p == addr)
        }
    })
}

pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix_len) = prefix_len.parse::<u32>() else {
        return false;
    };
    let Ok(network) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) if prefix_len <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix_len).unwrap_or(0);
            (u32::from(*ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) if prefix_len <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix_len).unwrap_or(0);
            (u128::from(*ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

/// X-Forwarded-For 第一项（原始客户端），其次 X-Real-IP
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// 根据 peer 地址、转发头和可信代理配置决定客户端 IP
pub fn resolve_client_ip(
    peer: Option<&str>,
    forwarded: Option<String>,
    trusted_proxies: &[String],
) -> Option<String> {
    let Some(peer) = peer else {
        return forwarded;
    };
    let peer_ip = parse_ip(peer).map(|ip| ip.to_string()).unwrap_or_else(|| peer.to_string());

    if !trusted_proxies.is_empty() {
        if is_trusted_proxy(peer, trusted_proxies) {
            let real_ip = forwarded.unwrap_or_else(|| peer_ip.clone());
            debug!("Trusted proxy {} -> {}", peer_ip, real_ip);
            return Some(real_ip);
        }
        return Some(peer_ip);
    }

    if parse_ip(peer).is_some_and(|ip| is_private_or_local(&ip))
        && let Some(real_ip) = forwarded
    {
        debug!("Private peer {} treated as proxy -> {}", peer_ip, real_ip);
        return Some(real_ip);
    }

    Some(peer_ip)
}

/// 从请求中提取客户端 IP
pub fn extract_client_ip(req: &HttpRequest, trusted_proxies: &[String]) -> Option<String> {
    let conn = req.connection_info();
    resolve_client_ip(conn.peer_addr(), forwarded_ip(req.headers()), trusted_proxies)
}
