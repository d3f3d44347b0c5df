//! ForwardingHandler - Handles every inbound proxy request
//!
//! Authenticates the request, works out the target (explicit token, catch-all
//! reconstruction or the default-target redirect), then either fetches the
//! origin and shapes its response or relays to the downstream tier.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use edge_veil_common::{
    EncodedToken, Result, VeilError, constants::MAX_REQUEST_BODY_BYTES, decode_token,
    filter_request_headers, generate_request_id, proxy_link, validation::validate_target_url,
};
use http::{Method, StatusCode, request::Parts};
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span};
use url::Url;

use crate::{
    Gateway,
    auth::authenticate_request,
    config::Upstream,
    error_handling::error_response,
    fetcher::{TargetRequest, build_outbound_headers, carries_body},
    handlers::response::{ProxyResponse, ResponseShaping, relay_response, shape_origin_response},
    parse_proxy_params, reconstruct_catch_all_target,
};

/// Handler for all proxy requests
pub async fn handle_forwarding(
    State(gateway): State<Arc<Gateway>>,
    request: Request,
) -> Response {
    let request_id = generate_request_id();
    let span = info_span!("request", id = %request_id, method = %request.method());

    async move {
        // The query is never logged; it can carry the credential
        debug!("Processing request, path: {}", request.uri().path());

        match forward_request(&gateway, request).await {
            Ok(response) => {
                info!("Responded {}", response.status);
                response.into_response()
            }
            Err(e) => error_response(e),
        }
    }
    .instrument(span)
    .await
}

async fn forward_request(gateway: &Gateway, request: Request) -> Result<ProxyResponse> {
    let (parts, body) = request.into_parts();
    let config = gateway.config();
    let params = parse_proxy_params(parts.uri.query());

    let credential = authenticate_request(&config.auth, params.credential.as_deref())?;
    let links = gateway.links_for(credential.as_ref());

    let target = match params.token {
        Some(token) => decode_token(&token)?,
        None => match implied_target(gateway, &parts)? {
            Some(target) => target,
            None => {
                info!("No target supplied; redirecting to the default target");
                let location = links.link_for(&config.default_target);
                return ProxyResponse::redirect(StatusCode::FOUND, &location);
            }
        },
    };

    let target = validate_target_url(&target)?;
    if links.is_proxied(&target) {
        return Err(VeilError::Decode(
            "target points back at a proxy tier".to_string(),
        ));
    }

    let body = read_body(&parts.method, body).await?;

    match &config.upstream {
        Upstream::Direct => {
            info!("Fetching origin {}", target.origin().ascii_serialization());

            let headers = build_outbound_headers(&parts.headers, &target, config.header_mode);
            let response = gateway
                .fetcher()
                .forward(TargetRequest {
                    method: parts.method,
                    url: target,
                    headers,
                    body,
                })
                .await?;

            shape_origin_response(
                response,
                ResponseShaping {
                    links: &links,
                    redirect_mode: config.redirect_mode,
                    max_rewrite_bytes: config.max_rewrite_bytes,
                },
            )
            .await
        }
        Upstream::Downstream {
            base,
            forward_credential,
        } => {
            let code = credential
                .as_ref()
                .filter(|_| *forward_credential)
                .map(|c| c.code.as_str());
            let relay = downstream_url(base, &target, code)?;
            info!("Relaying to downstream tier");

            let response = gateway
                .fetcher()
                .forward(TargetRequest {
                    method: parts.method,
                    url: relay,
                    headers: filter_request_headers(&parts.headers),
                    body,
                })
                .await?;

            Ok(relay_response(response))
        }
    }
}

/// Target implied by catch-all addressing, passed through the codec
fn implied_target(gateway: &Gateway, parts: &Parts) -> Result<Option<String>> {
    let Some(host) = &gateway.config().catch_all_host else {
        return Ok(None);
    };

    let path = parts.uri.path();
    let query = parts.uri.query().unwrap_or("");
    let Some(raw) = reconstruct_catch_all_target(host, path, query)? else {
        return Ok(None);
    };

    debug!("Catch-all target reconstructed for path {}", path);
    EncodedToken::encode(&raw).decode().map(Some)
}

/// `<base>/?url=<token>[&pw=<code>]`
pub fn downstream_url(base: &str, target: &Url, code: Option<&str>) -> Result<Url> {
    let relay = proxy_link(base, target.as_str(), code);
    Url::parse(&relay).map_err(|e| VeilError::InternalError(format!("downstream URL: {}", e)))
}

async fn read_body(method: &Method, body: Body) -> Result<Option<Bytes>> {
    if !carries_body(method) {
        return Ok(None);
    }

    axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map(Some)
        .map_err(|_| VeilError::PayloadTooLarge(MAX_REQUEST_BODY_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downstream_url() {
        let target = Url::parse("https://a.io/").unwrap();

        let relay = downstream_url("https://fetch.example", &target, None).unwrap();
        assert_eq!(
            relay.as_str(),
            "https://fetch.example/?url=aHR0cHM6Ly9hLmlvLw"
        );

        let relay = downstream_url("https://fetch.example/tier", &target, Some("fefdace1")).unwrap();
        assert_eq!(
            relay.as_str(),
            "https://fetch.example/tier/?url=aHR0cHM6Ly9hLmlvLw&pw=fefdace1"
        );
    }

    #[tokio::test]
    async fn test_read_body() {
        assert!(read_body(&Method::GET, Body::from("ignored")).await.unwrap().is_none());

        let body = read_body(&Method::POST, Body::from("a=1")).await.unwrap();
        assert_eq!(body.as_deref(), Some(&b"a=1"[..]));

        let oversized = Body::from(vec![0u8; MAX_REQUEST_BODY_BYTES + 1]);
        let err = read_body(&Method::PUT, oversized).await.unwrap_err();
        assert!(matches!(err, VeilError::PayloadTooLarge(_)));
    }
}
