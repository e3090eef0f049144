use url::Url;

use crate::error::DomainError;

/// Hostname breakdown of a source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    pub normalized_domain: String,
    pub scheme: String,
    pub hostname: String,
    pub subdomain: Option<String>,
    pub root_domain: String,
}

fn parse_lenient(input: &str) -> Result<Url, DomainError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Empty);
    }

    // Bare domains like "nytimes.com/path" get a scheme so the parser accepts them
    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    Url::parse(&candidate).map_err(|_| DomainError::Invalid(trimmed.to_string()))
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Lowercases, drops scheme/path/`www.` and requires a dotted hostname.
///
/// `"https://www.NYTimes.com/article"` becomes `"nytimes.com"`.
pub fn normalize_domain(domain: &str) -> Result<String, DomainError> {
    let url = parse_lenient(domain)?;
    let host = url
        .host_str()
        .ok_or_else(|| DomainError::Invalid(domain.trim().to_string()))?
        .to_ascii_lowercase();

    let host = strip_www(&host);
    if !host.contains('.') {
        return Err(DomainError::MissingTld(host.to_string()));
    }

    Ok(host.to_string())
}

pub fn extract_domain_from_url(url: &str) -> Result<String, DomainError> {
    let parsed = parse_lenient(url)?;
    match parsed.host_str() {
        Some(host) => normalize_domain(host),
        None => Err(DomainError::Invalid(url.trim().to_string())),
    }
}

pub fn parse_domain_info(url: &str) -> Result<DomainInfo, DomainError> {
    let parsed = parse_lenient(url)?;
    let hostname = parsed
        .host_str()
        .ok_or_else(|| DomainError::Invalid(url.trim().to_string()))?
        .to_ascii_lowercase();
    let normalized_domain = strip_www(&hostname).to_string();

    let parts: Vec<&str> = normalized_domain.split('.').collect();
    let (subdomain, root_domain) = if parts.len() > 2 {
        // news.bbc.co.uk keeps three labels in its root
        let root_len = if parts[parts.len() - 2] == "co" && parts.len() > 3 {
            3
        } else {
            2
        };
        let split = parts.len() - root_len;
        let sub = parts[..split].join(".");
        (
            if sub.is_empty() { None } else { Some(sub) },
            parts[split..].join("."),
        )
    } else {
        (None, normalized_domain.clone())
    };

    Ok(DomainInfo {
        normalized_domain,
        scheme: parsed.scheme().to_string(),
        hostname,
        subdomain,
        root_domain,
    })
}

pub fn root_domain(url: &str) -> Result<String, DomainError> {
    parse_domain_info(url).map(|info| info.root_domain)
}

pub fn is_valid_url(url: &str) -> bool {
    parse_lenient(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.contains('.')))
        .unwrap_or(false)
}

/// Normalizable and ending in an alphabetic label of two or more letters.
pub fn is_valid_domain(domain: &str) -> bool {
    match normalize_domain(domain) {
        Ok(host) => host.rsplit_once('.').is_some_and(|(name, tld)| {
            !name.is_empty() && tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic())
        }),
        Err(_) => false,
    }
}

pub fn is_same_domain(first: &str, second: &str) -> bool {
    match (extract_domain_from_url(first), extract_domain_from_url(second)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
