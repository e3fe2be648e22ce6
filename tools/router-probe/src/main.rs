//! router-probe: send one request to a named component and print the reply.
//!
//! ## Usage
//!
//! ```bash
//! router-probe --directory ds1.example.net --component billing \
//!     --rpc billing.getBalance --param accountId=42
//!
//! # Settings from a file, logs as JSON
//! CR_JSON_LOGS=1 router-probe --config router.toml --component search --rpc search.query
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use component_router::adapters::{
    DirectoryDomains, Headless, OneshotCallback, PlaintextCipher, StaticConnectivity,
    WebSocketTransport,
};
use component_router::{Collaborators, RequestParams, Router, RouterConfig};
use router_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::Value;

/// Component router probe
#[derive(Parser, Debug)]
#[command(name = "router-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Router configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory service host; repeat for several nodes
    #[arg(long = "directory")]
    directories: Vec<String>,

    /// Directory service port
    #[arg(long)]
    directory_port: Option<u16>,

    /// Component to address
    #[arg(long)]
    component: String,

    /// Remote procedure to invoke
    #[arg(long)]
    rpc: String,

    /// Request id
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    request_id: i32,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Request parameter as key=value; values that parse as JSON are sent as JSON
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn load_config(args: &Args) -> Result<RouterConfig> {
    let mut config = match &args.config {
        Some(path) => RouterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RouterConfig::default(),
    };
    if !args.directories.is_empty() {
        config = config.with_directory_domains(args.directories.iter().cloned());
    }
    if let Some(port) = args.directory_port {
        config.directory.port = port;
    }
    if config.directory.domains.is_empty() {
        bail!("no directory host configured; pass --directory or set directory.domains");
    }
    config.validate()?;
    Ok(config)
}

/// How long to wait for the outcome: connect, lookup, then the request itself.
fn overall_deadline(timeout: Duration, config: &RouterConfig) -> Duration {
    timeout
        .saturating_add(config.lookup_timeout)
        .saturating_add(config.connect_timeout)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_telemetry(&TelemetryConfig::for_service("router-probe"))?;

    let config = load_config(&args)?;
    let timeout = Duration::from_millis(args.timeout_ms);
    let deadline = overall_deadline(timeout, &config);

    let runtime = tokio::runtime::Handle::current();
    let collaborators = Collaborators {
        transport: Arc::new(WebSocketTransport::new(config.connect_timeout, runtime)),
        cipher: Arc::new(PlaintextCipher),
        connectivity: Arc::new(StaticConnectivity::online()),
        foreground: Arc::new(Headless),
        domains: Arc::new(DirectoryDomains::from_config(&config.directory)),
    };

    // Headless delivery only reaches background-eligible ids.
    let config = config.with_background_ids([args.request_id]);
    let router = Router::new(config, collaborators)?;

    let params = args
        .params
        .into_iter()
        .fold(RequestParams::new(), |params, (key, value)| params.with(key, value));
    let (callback, outcome) = OneshotCallback::channel();

    tracing::info!(
        component = %args.component,
        rpc = %args.rpc,
        request_id = args.request_id,
        "sending request"
    );
    router.send_request(
        params,
        args.request_id,
        timeout,
        &args.rpc,
        &args.component,
        callback,
    );

    let outcome = tokio::time::timeout(deadline, outcome)
        .await
        .map_err(|_| anyhow!("no outcome within {deadline:?}"))?
        .context("router dropped the request")?;
    router.destroy_all();

    match outcome {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response.body)?);
            Ok(())
        }
        Err(failure) => Err(anyhow!(failure)).context(format!(
            "{} {} failed",
            args.component, args.rpc
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_json_and_text() {
        assert_eq!(parse_param("n=42").unwrap(), ("n".to_string(), Value::from(42)));
        assert_eq!(
            parse_param("name=alice").unwrap(),
            ("name".to_string(), Value::from("alice"))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_overall_deadline_saturates() {
        let config = RouterConfig::default();
        assert_eq!(
            overall_deadline(Duration::from_secs(5), &config),
            Duration::from_secs(45)
        );
        assert_eq!(overall_deadline(Duration::MAX, &config), Duration::MAX);
    }

    #[test]
    fn test_directory_required() {
        let args = Args::parse_from(["router-probe", "--component", "billing", "--rpc", "b.x"]);
        assert!(load_config(&args).is_err());

        let args = Args::parse_from([
            "router-probe",
            "--component",
            "billing",
            "--rpc",
            "b.x",
            "--directory",
            "ds.example.net",
            "--directory-port",
            "9100",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.directory.domains, vec!["ds.example.net"]);
        assert_eq!(config.directory.port, 9100);
    }
}
