//! Gateway configuration
//!
//! Everything a tier needs is resolved once at startup into a
//! [`GatewayConfig`] and threaded through constructors from there.

use clap::{Parser, ValueEnum};
use edge_veil_common::{
    CredentialGate, Result, VeilError,
    constants::{
        DEFAULT_TARGET, DEFAULT_TIMEZONE, MAX_REWRITE_BODY_BYTES, UPSTREAM_CONNECT_TIMEOUT_SECS,
        UPSTREAM_RESPONSE_TIMEOUT_SECS,
    },
    parse_timezone,
    validation::validate_target_url,
};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// CLI arguments for a gateway tier
#[derive(Parser, Debug, Clone)]
#[command(name = "veil-gateway")]
#[command(about = "Credential-gated, link-rewriting edge reverse proxy", long_about = None)]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "VEIL_BIND", default_value = "0.0.0.0:8787")]
    pub bind: SocketAddr,

    /// Public origin browsers use to reach this tier (rewritten links point here)
    #[arg(long, env = "VEIL_PUBLIC_ORIGIN")]
    pub public_origin: String,

    /// Landing page for requests without a target
    #[arg(long, env = "VEIL_DEFAULT_TARGET", default_value = DEFAULT_TARGET)]
    pub default_target: String,

    /// Host prefixed to bare paths (catch-all addressing), e.g. https://www.google.com
    #[arg(long, env = "VEIL_CATCH_ALL_HOST")]
    pub catch_all_host: Option<String>,

    /// Secret salt of the time-window credential
    #[arg(long, env = "VEIL_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Require a valid `pw` credential on every request
    #[arg(long, env = "VEIL_REQUIRE_CREDENTIAL")]
    pub require_credential: bool,

    /// Attach the credential to rewritten links
    #[arg(
        long,
        env = "VEIL_LINK_CREDENTIAL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub link_credential: bool,

    /// Timezone of the credential hour buckets
    #[arg(long, env = "VEIL_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// How origin redirects are handled
    #[arg(long, env = "VEIL_REDIRECT_MODE", value_enum, default_value_t = RedirectMode::Follow)]
    pub redirect_mode: RedirectMode,

    /// Which inbound headers reach the origin
    #[arg(long, env = "VEIL_HEADER_MODE", value_enum, default_value_t = HeaderMode::Passthrough)]
    pub header_mode: HeaderMode,

    /// Base URL of a second proxy tier; when set this tier relays instead of fetching
    #[arg(long, env = "VEIL_DOWNSTREAM")]
    pub downstream: Option<String>,

    /// Re-attach the verified credential when relaying downstream
    #[arg(long, env = "VEIL_FORWARD_CREDENTIAL")]
    pub forward_credential: bool,

    /// Extra origins treated as already proxied (repeatable)
    #[arg(long = "proxied-origin", env = "VEIL_PROXIED_ORIGINS", value_delimiter = ',')]
    pub proxied_origins: Vec<String>,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "VEIL_CONNECT_TIMEOUT", default_value_t = UPSTREAM_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Upstream response-header timeout in seconds
    #[arg(long, env = "VEIL_RESPONSE_TIMEOUT", default_value_t = UPSTREAM_RESPONSE_TIMEOUT_SECS)]
    pub response_timeout: u64,

    /// Largest HTML/CSS body buffered for rewriting
    #[arg(long, env = "VEIL_MAX_REWRITE_BYTES", default_value_t = MAX_REWRITE_BODY_BYTES)]
    pub max_rewrite_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Redirect handling of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RedirectMode {
    /// Follow redirects and rewrite the final document
    #[default]
    Follow,
    /// Answer each origin redirect with a redirect to the proxied location
    Intercept,
}

/// Outbound header policy of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum HeaderMode {
    /// Forward inbound headers minus the infrastructure deny-list
    #[default]
    Passthrough,
    /// Send a fixed desktop-browser header set
    Browser,
}

/// Credential policy of a tier
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    Open,
    TimeWindow {
        gate: CredentialGate,
        attach_to_links: bool,
    },
}

impl AuthPolicy {
    pub fn is_gated(&self) -> bool {
        matches!(self, AuthPolicy::TimeWindow { .. })
    }
}

/// Where a tier sends decoded targets
#[derive(Debug, Clone)]
pub enum Upstream {
    /// Fetch the origin directly
    Direct,
    /// Relay to another proxy tier at `base`
    Downstream {
        base: String,
        forward_credential: bool,
    },
}

/// Resolved configuration of one gateway tier
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    pub public_origin: Url,
    pub default_target: String,
    pub catch_all_host: Option<Url>,
    pub auth: AuthPolicy,
    pub redirect_mode: RedirectMode,
    pub header_mode: HeaderMode,
    pub upstream: Upstream,
    pub proxied_origins: Vec<Url>,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_rewrite_bytes: usize,
}

impl GatewayConfig {
    /// Open, direct-fetching tier with default policies
    pub fn new(public_origin: &str, default_target: &str) -> Result<Self> {
        Ok(Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8787)),
            public_origin: parse_origin("public origin", public_origin)?,
            default_target: parse_target("default target", default_target)?,
            catch_all_host: None,
            auth: AuthPolicy::Open,
            redirect_mode: RedirectMode::default(),
            header_mode: HeaderMode::default(),
            upstream: Upstream::Direct,
            proxied_origins: Vec::new(),
            connect_timeout: Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SECS),
            response_timeout: Duration::from_secs(UPSTREAM_RESPONSE_TIMEOUT_SECS),
            max_rewrite_bytes: MAX_REWRITE_BODY_BYTES,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self::new(&args.public_origin, &args.default_target)?;
        config.bind = args.bind;
        config.redirect_mode = args.redirect_mode;
        config.header_mode = args.header_mode;
        config.connect_timeout = Duration::from_secs(args.connect_timeout);
        config.response_timeout = Duration::from_secs(args.response_timeout);
        config.max_rewrite_bytes = args.max_rewrite_bytes;

        if let Some(host) = &args.catch_all_host {
            config = config.with_catch_all_host(host)?;
        }

        for origin in &args.proxied_origins {
            config = config.with_proxied_origin(origin)?;
        }

        if args.require_credential {
            let secret = args.secret.clone().unwrap_or_default();
            let timezone = parse_timezone(&args.timezone)?;
            let gate = CredentialGate::new(secret, timezone)?;
            config = config.with_time_window(gate, args.link_credential);
        } else if args.secret.is_some() {
            tracing::warn!("A secret is configured but --require-credential is off; ignoring it");
        }

        if let Some(base) = &args.downstream {
            config = config.with_downstream(base, args.forward_credential)?;
        } else if args.forward_credential {
            return Err(VeilError::Config(
                "--forward-credential needs --downstream".to_string(),
            ));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_catch_all_host(mut self, host: &str) -> Result<Self> {
        self.catch_all_host = Some(parse_origin("catch-all host", host)?);
        Ok(self)
    }

    pub fn with_proxied_origin(mut self, origin: &str) -> Result<Self> {
        self.proxied_origins.push(parse_origin("proxied origin", origin)?);
        Ok(self)
    }

    pub fn with_time_window(mut self, gate: CredentialGate, attach_to_links: bool) -> Self {
        self.auth = AuthPolicy::TimeWindow {
            gate,
            attach_to_links,
        };
        self
    }

    pub fn with_downstream(mut self, base: &str, forward_credential: bool) -> Result<Self> {
        let parsed = validate_target_url(base.trim())
            .map_err(|e| VeilError::Config(format!("downstream: {}", e)))?;
        self.upstream = Upstream::Downstream {
            base: parsed.as_str().trim_end_matches('/').to_string(),
            forward_credential,
        };
        Ok(self)
    }

    pub fn with_redirect_mode(mut self, mode: RedirectMode) -> Self {
        self.redirect_mode = mode;
        self
    }

    pub fn with_header_mode(mut self, mode: HeaderMode) -> Self {
        self.header_mode = mode;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    pub fn with_max_rewrite_bytes(mut self, limit: usize) -> Self {
        self.max_rewrite_bytes = limit;
        self
    }

    /// Cross-field checks
    pub fn validate(&self) -> Result<()> {
        if let Upstream::Downstream {
            forward_credential: true,
            ..
        } = self.upstream
            && matches!(self.auth, AuthPolicy::Open)
        {
            return Err(VeilError::Config(
                "forwarding a credential requires --require-credential".to_string(),
            ));
        }

        if self.max_rewrite_bytes == 0 {
            return Err(VeilError::Config(
                "max rewrite bytes must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Origin string of this tier without a trailing slash
    pub fn public_origin_str(&self) -> String {
        self.public_origin.origin().ascii_serialization()
    }
}

fn parse_origin(what: &str, raw: &str) -> Result<Url> {
    validate_target_url(raw.trim()).map_err(|e| VeilError::Config(format!("{}: {}", what, e)))
}

fn parse_target(what: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    validate_target_url(trimmed).map_err(|e| VeilError::Config(format!("{}: {}", what, e)))?;
    Ok(trimmed.to_string())
}
