//! Root-domain extraction for overlap inference
//!
//! Synthetic domain_overlap edges key on the registrable part of a
//! hostname (last two labels), so `cdn.example.com` and
//! `www.example.com` converge on `example.com`. IP literals pass
//! through unchanged.

use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::LazyLock;

use crate::elements::NodeData;

static DOMAIN_TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https?://[^\s)]+|(?:[a-z0-9-]{1,63}\.)+[a-z]{2,})(?::\d+)?").unwrap()
});

/// Collapse a hostname to its registrable root.
pub fn root_domain(host: &str) -> String {
    let host = host.trim().trim_matches('.').to_lowercase();
    if host.is_empty() {
        return String::new();
    }
    let without_port = host.split(':').next().unwrap_or(&host);
    if let Ok(ip) = without_port.parse::<IpAddr>() {
        return ip.to_string();
    }
    let parts: Vec<&str> = host.split('.').filter(|p| !p.is_empty()).collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host
    }
}

fn host_of(text: &str) -> &str {
    let rest = match text.find("://") {
        Some(idx) => &text[idx + 3..],
        None => text,
    };
    rest.split(['/', '?', '#'])
        .next()
        .unwrap_or(rest)
        .split('@')
        .next_back()
        .unwrap_or(rest)
}

/// Extract a root domain from a URL, bare hostname, or host+path.
pub fn extract_domain(value: &str) -> String {
    let text = value.trim();
    if text.is_empty() {
        return String::new();
    }
    if text.contains("://") {
        return root_domain(host_of(text));
    }
    if let Some(stripped) = text.strip_prefix("www.") {
        return root_domain(stripped);
    }
    if text.contains('/') || text.contains('?') {
        return root_domain(host_of(text));
    }
    root_domain(text)
}

/// Best-effort domain for a node: indicator, then url, then a URL
/// embedded in the label.
pub fn node_domain(node: &NodeData) -> String {
    if let Some(indicator) = node.indicator.as_deref() {
        if !indicator.trim().is_empty() {
            return extract_domain(indicator);
        }
    }
    if let Some(url) = node.url.as_deref() {
        if !url.trim().is_empty() {
            return extract_domain(url);
        }
    }
    let label = node.label.trim();
    if label.contains("://") {
        if let Some(token) = label.split_whitespace().next() {
            return extract_domain(token);
        }
    }
    String::new()
}

/// Pull up to six distinct root domains out of free text.
pub fn domains_from_text(text: &str) -> HashSet<String> {
    let mut domains = HashSet::new();
    if text.is_empty() {
        return domains;
    }
    for found in DOMAIN_TOKEN_REGEX.find_iter(text) {
        let token = found
            .as_str()
            .trim()
            .trim_matches(|c| matches!(c, ')' | '.' | ',' | ';' | '"' | '\''));
        if token.is_empty() {
            continue;
        }
        let domain = extract_domain(token);
        if domain.len() >= 4 {
            domains.insert(domain);
        }
        if domains.len() >= 6 {
            break;
        }
    }
    domains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::NodeKind;

    #[test]
    fn test_root_domain_collapses_subdomains() {
        assert_eq!(root_domain("cdn.static.Example.COM."), "example.com");
        assert_eq!(root_domain("localhost"), "localhost");
        assert_eq!(root_domain(""), "");
    }

    #[test]
    fn test_root_domain_keeps_ip_literals() {
        assert_eq!(root_domain("203.0.113.9"), "203.0.113.9");
        assert_eq!(root_domain("203.0.113.9:8080"), "203.0.113.9");
    }

    #[test]
    fn test_extract_domain_handles_urls_and_hosts() {
        assert_eq!(extract_domain("https://www.example.com/a/b?q=1"), "example.com");
        assert_eq!(extract_domain("www.example.com"), "example.com");
        assert_eq!(extract_domain("example.com/path"), "example.com");
        assert_eq!(extract_domain("example.com"), "example.com");
    }

    #[test]
    fn test_domains_from_text_caps_and_trims() {
        let text = "see https://a.example.com) and phish.evil.net, plus evil.net.";
        let domains = domains_from_text(text);
        assert!(domains.contains("example.com"));
        assert!(domains.contains("evil.net"));
    }

    #[test]
    fn test_node_domain_prefers_indicator() {
        let mut node = NodeData::new("n1", "alert", NodeKind::Alert, "feed", 0.0, 0.5);
        node.url = Some("https://other.org/x".to_string());
        node.indicator = Some("bad.example.com".to_string());
        assert_eq!(node_domain(&node), "example.com");
        node.indicator = None;
        assert_eq!(node_domain(&node), "other.org");
    }
}
