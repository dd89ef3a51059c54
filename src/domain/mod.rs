//! Turns URLs reported by the browser into [TrackedDomain] values and decides which of them are
//! allowed to accumulate statistics.

use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use url::{Host, Url};

/// Hosts that are never tracked even though they are reachable over http(s). Mostly loopback
/// addresses and the extension stores of the major browsers.
const EXCLUDED_DOMAINS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "::1",
    "0.0.0.0",
    "chrome.google.com",
    "chromewebstore.google.com",
    "addons.mozilla.org",
    "microsoftedge.microsoft.com",
];

const LOCAL_SUFFIX: &str = ".local";

/// Normalized host name used as the aggregation key for all statistics. For example
/// `https://www.example.com/page` is tracked as `example.com`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedDomain(Arc<str>);

impl TrackedDomain {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackedDomain {
    fn from(value: &str) -> Self {
        let value = value.trim_end_matches('.').to_ascii_lowercase();
        let value = value.strip_prefix("www.").unwrap_or(&value);
        TrackedDomain(value.into())
    }
}

impl Display for TrackedDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackedDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives a domain from a URL. Only http(s) resources produce a domain, so browser pages,
/// files and extension pages are ignored together with anything served from the local machine.
pub fn extract_domain(url: &str) -> Option<TrackedDomain> {
    let url = Url::parse(url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    match url.host()? {
        Host::Domain(name) if is_local_name(name) => None,
        Host::Domain(name) => Some(TrackedDomain::from(name)),
        Host::Ipv4(address) if is_local_address(IpAddr::V4(address)) => None,
        Host::Ipv4(address) => Some(TrackedDomain::from(address.to_string().as_str())),
        Host::Ipv6(address) if is_local_address(IpAddr::V6(address)) => None,
        Host::Ipv6(address) => Some(TrackedDomain::from(address.to_string().as_str())),
    }
}

/// Decides whether a domain is allowed to accumulate statistics. Used as a gate before every
/// write.
pub fn is_trackable(domain: Option<&TrackedDomain>) -> bool {
    let Some(domain) = domain else {
        return false;
    };
    let name = domain.as_str();
    !name.is_empty() && !EXCLUDED_DOMAINS.contains(&name) && !name.ends_with(LOCAL_SUFFIX)
}

/// [extract_domain] followed by [is_trackable].
pub fn trackable_domain(url: &str) -> Option<TrackedDomain> {
    extract_domain(url).filter(|domain| is_trackable(Some(domain)))
}

fn is_local_name(name: &str) -> bool {
    let name = name.trim_end_matches('.');
    name == "localhost" || name.ends_with(".localhost") || name.ends_with(LOCAL_SUFFIX)
}

fn is_local_address(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => v4.is_loopback() || v4 == Ipv4Addr::UNSPECIFIED,
        IpAddr::V6(v6) => v6.is_loopback() || v6 == Ipv6Addr::UNSPECIFIED,
    }
}
