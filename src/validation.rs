//! Submission-time URL checks
//!
//! A task is accepted only if it carries between one and `max_urls_per_task` URLs, and
//! every URL is an absolute `http`/`https` URL with a host. Unless
//! `allow_private_hosts` is set, hosts that resolve syntactically to the local machine or
//! private networks are refused (`localhost`, loopback, private, link-local, unspecified,
//! and the cloud metadata address).

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Check a submitted URL list against the API limits
pub fn validate_urls(urls: &[String], config: &ApiConfig) -> Result<()> {
    if urls.is_empty() {
        return Err(Error::Validation("at least one URL is required".to_string()));
    }
    if urls.len() > config.max_urls_per_task {
        return Err(Error::Validation(format!(
            "too many URLs: {} (maximum {})",
            urls.len(),
            config.max_urls_per_task
        )));
    }

    for url in urls {
        validate_url(url, config.allow_private_hosts)
            .map_err(|reason| Error::Validation(format!("invalid URL {url:?}: {reason}")))?;
    }
    Ok(())
}

/// Check a single URL, returning the reason it was refused
pub fn validate_url(raw: &str, allow_private_hosts: bool) -> std::result::Result<(), String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }

    let host = url.host().ok_or_else(|| "missing host".to_string())?;
    if allow_private_hosts {
        return Ok(());
    }

    let forbidden = match host {
        Host::Domain(domain) => is_local_domain(domain),
        Host::Ipv4(ip) => is_forbidden_ip(IpAddr::V4(ip)),
        Host::Ipv6(ip) => is_forbidden_ip(IpAddr::V6(ip)),
    };

    if forbidden {
        Err("host is not allowed".to_string())
    } else {
        Ok(())
    }
}

fn is_local_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost" || domain.ends_with(".localhost")
}

fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_forbidden_v4(v4),
            None => is_forbidden_v6(v6),
        },
    }
}

fn is_forbidden_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_forbidden_v6(ip: Ipv6Addr) -> bool {
    ip.is_loopback() || ip.is_unspecified() || ip.is_unique_local() || ip.is_unicast_link_local()
}
