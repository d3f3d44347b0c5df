use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use edge_veil_common::{
    CredentialGate, TimeWindowCredential, constants::DEFAULT_TIMEZONE, decode_token, encode_token,
    parse_timezone, proxy_link, utils::seconds_until_rollover,
    validation::validate_target_url,
};
use tracing::debug;

/// CLI arguments for the operator tool
#[derive(Parser, Debug)]
#[command(name = "veilctl")]
#[command(about = "Operator tooling for edge-veil proxy tiers", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a target URL into a token
    Encode {
        /// Absolute http(s) URL
        url: String,
    },

    /// Decode a token back into its target URL
    Decode {
        /// Token as it appears in `?url=`
        token: String,
    },

    /// Print the time-window credential for an hour bucket
    Credential {
        /// Shared secret of the gated tier
        #[arg(long, env = "VEIL_SECRET", hide_env_values = true)]
        secret: String,

        /// Timezone the hour buckets are computed in
        #[arg(long, env = "VEIL_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
        timezone: String,

        /// Instant to compute the credential for (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,

        /// Print JSON instead of the bare code
        #[arg(long)]
        json: bool,
    },

    /// Build the proxy link a browser should open for a target
    Link {
        /// Absolute http(s) URL
        url: String,

        /// Public origin of the proxy tier
        #[arg(long, env = "VEIL_PUBLIC_ORIGIN")]
        origin: String,

        /// Append the current credential for this secret
        #[arg(long, env = "VEIL_SECRET", hide_env_values = true)]
        secret: Option<String>,

        /// Timezone the hour buckets are computed in
        #[arg(long, env = "VEIL_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
        timezone: String,
    },
}

fn parse_instant(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid RFC 3339 timestamp: {}", raw))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn credential_at(secret: &str, timezone: &str, now: DateTime<Utc>) -> Result<TimeWindowCredential> {
    let timezone = parse_timezone(timezone)?;
    let gate = CredentialGate::new(secret, timezone)?;
    Ok(gate.expected_at(now))
}

fn render_credential(
    credential: &TimeWindowCredential,
    remaining_secs: i64,
    json: bool,
) -> Result<String> {
    if !json {
        return Ok(credential.code.clone());
    }

    let mut value = serde_json::to_value(credential).context("Failed to serialize credential")?;
    value["valid_for_secs"] = remaining_secs.into();
    Ok(serde_json::to_string_pretty(&value)?)
}

fn build_link(
    url: &str,
    origin: &str,
    credential: Option<&TimeWindowCredential>,
) -> Result<String> {
    let target = validate_target_url(url.trim()).context("Invalid target URL")?;
    let origin = validate_target_url(origin.trim()).context("Invalid proxy origin")?;

    Ok(proxy_link(
        &origin.origin().ascii_serialization(),
        target.as_str(),
        credential.map(|c| c.code.as_str()),
    ))
}

fn run(command: Command) -> Result<String> {
    match command {
        Command::Encode { url } => {
            let url = url.trim();
            validate_target_url(url).context("Invalid target URL")?;
            Ok(encode_token(url))
        }
        Command::Decode { token } => Ok(decode_token(&token)?),
        Command::Credential {
            secret,
            timezone,
            at,
            json,
        } => {
            let now = parse_instant(at.as_deref())?;
            let credential = credential_at(&secret, &timezone, now)?;
            let remaining = seconds_until_rollover(now, parse_timezone(&timezone)?);
            debug!("Credential for bucket {}", credential.bucket);
            render_credential(&credential, remaining, json)
        }
        Command::Link {
            url,
            origin,
            secret,
            timezone,
        } => {
            let credential = secret
                .map(|secret| credential_at(&secret, &timezone, Utc::now()))
                .transpose()?;
            build_link(&url, &origin, credential.as_ref())
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = run(args.command)?;
    println!("{}", output);

    Ok(())
}
