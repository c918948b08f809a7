use reqwest::{Client, Proxy};
use skimmer_core::config::NetworkConfig;
use skimmer_core::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, PartialEq)]
enum ProxyChoice {
    Use(String),
    /// Proxy explicitly disabled, environment variables included.
    Direct,
    /// Nothing configured; reqwest reads HTTP(S)_PROXY itself.
    Environment,
}

/// Matches `host` against no-proxy rules: exact host, `*.suffix` (subdomains only)
/// and `.suffix` (the domain and its subdomains).
fn bypasses_proxy(host: &str, rules: &[String]) -> bool {
    let host = host.to_lowercase();
    rules.iter().any(|rule| {
        let rule = rule.trim().to_lowercase();
        if rule.is_empty() {
            false
        } else if let Some(suffix) = rule.strip_prefix("*.") {
            host.ends_with(&format!(".{}", suffix))
        } else if let Some(suffix) = rule.strip_prefix('.') {
            host == suffix || host.ends_with(&format!(".{}", suffix))
        } else {
            host == rule
        }
    })
}

fn host_of(target: &str) -> Option<String> {
    url::Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string()))
}

fn choose_proxy(own: Option<&str>, network: &NetworkConfig, target: &str) -> ProxyChoice {
    if let Some(own) = own {
        let own = own.trim();
        return if own.is_empty() {
            ProxyChoice::Direct
        } else {
            ProxyChoice::Use(own.to_string())
        };
    }

    match network.proxy.as_deref().map(str::trim) {
        Some(global) if !global.is_empty() => {
            let bypass = host_of(target)
                .map(|h| bypasses_proxy(&h, &network.no_proxy))
                .unwrap_or(false);
            if bypass {
                ProxyChoice::Direct
            } else {
                ProxyChoice::Use(global.to_string())
            }
        }
        _ => ProxyChoice::Environment,
    }
}

/// Builds the shared HTTP client for a backend or the web provider.
///
/// `own_proxy` is the per-provider setting: `None` defers to `network.proxy`,
/// `Some("")` forces a direct connection.
pub fn build_http_client(
    own_proxy: Option<&str>,
    network: &NetworkConfig,
    target: &str,
    timeout: Duration,
) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("skimmer/", env!("CARGO_PKG_VERSION")));

    match choose_proxy(own_proxy, network, target) {
        ProxyChoice::Use(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, target = %target, "Using HTTP proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, connecting directly");
                builder = builder.no_proxy();
            }
        },
        ProxyChoice::Direct => {
            debug!(target = %target, "Proxy disabled");
            builder = builder.no_proxy();
        }
        ProxyChoice::Environment => {}
    }

    builder
        .build()
        .map_err(|e| Error::Provider(format!("failed to build HTTP client: {}", e)))
}
