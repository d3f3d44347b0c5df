//! Edge reverse proxy
//!
//! A single HTTP surface that decodes a target token from `?url=`, checks the
//! tier's credential, fetches the origin and rewrites HTML/CSS so every
//! link comes back through the proxy. A tier can also sit in front of a
//! second tier and relay to it instead of fetching directly.

use axum::Router;
use edge_veil_common::{
    Result, TimeWindowCredential,
    constants::{CREDENTIAL_PARAM, TARGET_PARAM},
    validation::{validate_path, validate_target_url},
};
use std::sync::Arc;
use tracing::info;
use url::{Url, form_urlencoded};

pub mod auth;
pub mod config;
pub mod content_rewrite;
pub mod error_handling;
pub mod fetcher;
pub mod handlers;

use config::{AuthPolicy, GatewayConfig, RedirectMode, Upstream};
use content_rewrite::ProxyLinks;
use fetcher::OriginFetcher;

/// Shared, read-only state of one tier
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    fetcher: OriginFetcher,
    links: ProxyLinks,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        // A relaying tier hands redirects back to the caller untouched
        let redirect_mode = match config.upstream {
            Upstream::Direct => config.redirect_mode,
            Upstream::Downstream { .. } => RedirectMode::Intercept,
        };
        let fetcher = OriginFetcher::new(
            redirect_mode,
            config.connect_timeout,
            config.response_timeout,
        )?;
        let links =
            ProxyLinks::new(&config.public_origin).with_proxied_origins(&config.proxied_origins);

        info!(
            "Gateway ready: origin={}, gated={}, upstream={}",
            links.origin(),
            config.auth.is_gated(),
            match &config.upstream {
                Upstream::Direct => "direct",
                Upstream::Downstream { .. } => "downstream",
            }
        );

        Ok(Self {
            config,
            fetcher,
            links,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &OriginFetcher {
        &self.fetcher
    }

    /// Link builder for one request
    ///
    /// On a gated tier that attaches credentials, links carry the accepted code.
    pub fn links_for(&self, credential: Option<&TimeWindowCredential>) -> ProxyLinks {
        let attach = matches!(
            self.config.auth,
            AuthPolicy::TimeWindow {
                attach_to_links: true,
                ..
            }
        );
        let code = credential.filter(|_| attach).map(|c| c.code.clone());
        self.links.clone().with_credential(code)
    }
}

/// Build the router; every method and path goes to the forwarding handler
pub fn app(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .fallback(handlers::handle_forwarding)
        .with_state(gateway)
}

/// The query parameters the proxy itself consumes
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProxyParams {
    /// Target token; an empty `url=` counts as absent
    pub token: Option<String>,
    pub credential: Option<String>,
}

/// Extract the target token and credential from a raw query string
///
/// The first occurrence of each parameter wins.
pub fn parse_proxy_params(query: Option<&str>) -> ProxyParams {
    let mut params = ProxyParams::default();

    for (key, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match key.as_ref() {
            TARGET_PARAM if params.token.is_none() && !value.is_empty() => {
                params.token = Some(value.into_owned());
            }
            CREDENTIAL_PARAM if params.credential.is_none() => {
                params.credential = Some(value.into_owned());
            }
            _ => {}
        }
    }

    params
}

/// Query string forwarded by catch-all addressing
///
/// Drops every `pw` parameter and any empty `url` parameter; other pairs are
/// kept in order with their original encoding.
pub fn catch_all_query(query: &str) -> String {
    query
        .split('&')
        .filter(|&pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            !pair.is_empty() && key != CREDENTIAL_PARAM && !(key == TARGET_PARAM && value.is_empty())
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Rebuild the implied target of a catch-all request
///
/// Returns `Ok(None)` for a bare `/` with nothing left in the query, which is
/// the "no target" case.
///
/// # Examples
///
/// ```
/// use edge_veil_gateway::reconstruct_catch_all_target;
/// use url::Url;
///
/// let host = Url::parse("https://www.google.com").unwrap();
/// let target = reconstruct_catch_all_target(&host, "/search", "q=rust&pw=fefdace1").unwrap();
/// assert_eq!(target.as_deref(), Some("https://www.google.com/search?q=rust"));
///
/// assert_eq!(reconstruct_catch_all_target(&host, "/", "pw=fefdace1").unwrap(), None);
/// ```
pub fn reconstruct_catch_all_target(
    host: &Url,
    path: &str,
    query: &str,
) -> Result<Option<String>> {
    let query = catch_all_query(query);
    if (path.is_empty() || path == "/") && query.is_empty() {
        return Ok(None);
    }

    let path = validate_path(path)?;
    let mut target = format!("{}{}", host.origin().ascii_serialization(), path);
    if !query.is_empty() {
        target.push('?');
        target.push_str(&query);
    }

    validate_target_url(&target)?;
    Ok(Some(target))
}
