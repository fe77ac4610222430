mod auth;
mod handlers;
mod scrape_log;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tower_http::compression::CompressionLayer;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use bmcgpu_core::Config;
use bmcgpu_core::TargetRegistry;
use bmcgpu_core::redfish::{Connector, HttpConnector};

use state::{Credentials, SharedRegistry};

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(
    name = "bmcgpu-exporter",
    about = "Prometheus exporter for GPU telemetry from server management controllers",
    version = bmcgpu_core::VERSION
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Listen address, without the port.
    #[arg(long, env = "CONFIG_ADDRESS")]
    address: Option<String>,

    /// Listen port.
    #[arg(long, env = "CONFIG_PORT")]
    port: Option<u16>,

    /// Serve over TLS (`--tls-enabled`, `--tls-enabled=false`).
    #[arg(
        long,
        env = "CONFIG_TLS_ENABLED",
        value_parser = parse_switch,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    tls_enabled: Option<bool>,

    /// PEM certificate chain for the listener.
    #[arg(long, env = "CONFIG_TLS_CERT_FILE")]
    tls_cert_file: Option<PathBuf>,

    /// PEM private key for the listener.
    #[arg(long, env = "CONFIG_TLS_KEY_FILE")]
    tls_key_file: Option<PathBuf>,

    /// Proxy for https requests to controllers.
    #[arg(long, env = "CONFIG_HTTPS_PROXY")]
    https_proxy: Option<String>,

    /// Namespace prepended to every metric name.
    #[arg(long, env = "CONFIG_METRICS_PREFIX")]
    metrics_prefix: Option<String>,

    /// Username for targets without their own host entry.
    #[arg(long, env = "CONFIG_DEFAULT_USERNAME")]
    default_username: Option<String>,

    /// Password for targets without their own host entry.
    #[arg(long, env = "CONFIG_DEFAULT_PASSWORD")]
    default_password: Option<String>,

    /// Scheme (http or https) for targets without their own host entry.
    #[arg(long, env = "CONFIG_DEFAULT_SCHEME")]
    default_scheme: Option<String>,

    /// Per-request timeout towards controllers, in seconds.
    #[arg(long, env = "CONFIG_TIMEOUT")]
    timeout: Option<u64>,

    /// Basic Auth username. If set, --auth-password is also required.
    #[arg(long, env = "BMCGPU_AUTH_USER")]
    auth_user: Option<String>,

    /// Basic Auth password.
    #[arg(long, env = "BMCGPU_AUTH_PASSWORD")]
    auth_password: Option<String>,

    /// Increase verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Anything but `0` or `false` switches on.
fn parse_switch(value: &str) -> Result<bool, String> {
    Ok(!matches!(value.to_ascii_lowercase().as_str(), "0" | "false"))
}

/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for crate_name in ["bmcgpu_exporter", "bmcgpu_core"] {
        if let Ok(directive) = format!("{}={}", crate_name, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<Config, bmcgpu_core::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(address) = &args.address {
        config.address = address.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(proxy) = &args.https_proxy {
        config.https_proxy = proxy.clone();
    }
    if let Some(prefix) = &args.metrics_prefix {
        config.metrics_prefix = prefix.clone();
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(enabled) = args.tls_enabled {
        config.tls.enabled = enabled;
    }
    if let Some(cert) = &args.tls_cert_file {
        config.tls.cert_file = cert.clone();
    }
    if let Some(key) = &args.tls_key_file {
        config.tls.key_file = key.clone();
    }
    let config = config.with_default_credentials(
        args.default_username.clone(),
        args.default_password.clone(),
        args.default_scheme.clone(),
    );
    config.validate()?;
    Ok(config)
}

/// Builds the application router over any session connector.
pub(crate) fn router<C: Connector>(
    registry: SharedRegistry<C>,
    auth_creds: Option<Credentials>,
) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::handle_root))
        .route("/health", get(handlers::handle_health))
        .route("/metrics", get(handlers::handle_metrics::<C>))
        .route(
            "/reset",
            get(handlers::handle_reset::<C>).post(handlers::handle_reset::<C>),
        )
        .with_state(registry);

    // Scrape log sits inside auth so it can read the AuthUser extension.
    app = app.layer(axum::middleware::from_fn(scrape_log::scrape_log_middleware));

    if let Some(creds) = auth_creds {
        app = app.layer(axum::middleware::from_fn_with_state(
            creds,
            auth::basic_auth_middleware,
        ));
    }

    app.layer(CompressionLayer::new())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main(args));
}

async fn async_main(args: Args) {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            process::exit(1);
        }
    };
    info!(
        version = bmcgpu_core::VERSION,
        revision = bmcgpu_core::REVISION,
        hosts = config.hosts.len(),
        prefix = %config.metrics_prefix,
        tls = config.tls.enabled,
        proxy = config.https_proxy().unwrap_or("-"),
        "starting exporter"
    );
    if config.hosts.is_empty() {
        warn!("no host entries and no default credentials configured, every scrape will fail");
    }

    let auth_creds: Option<Credentials> = match (&args.auth_user, &args.auth_password) {
        (Some(user), Some(pass)) => {
            info!("basic auth enabled");
            Some(Arc::new((user.clone(), pass.clone())))
        }
        (Some(_), None) | (None, Some(_)) => {
            error!("--auth-user and --auth-password must both be set");
            process::exit(2);
        }
        _ => None,
    };

    let connector = match HttpConnector::new(config.timeout(), config.https_proxy()) {
        Ok(connector) => connector,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            process::exit(1);
        }
    };

    let listen = config.listen_addr();
    let addr: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(%listen, error = %e, "invalid listen address");
            process::exit(2);
        }
    };
    let tls = config.tls.clone();
    let registry = Arc::new(TargetRegistry::new(connector, Arc::new(config)));
    let app = router(registry, auth_creds).into_make_service_with_connect_info::<SocketAddr>();

    let served = if tls.enabled {
        let rustls = match RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file).await {
            Ok(rustls) => rustls,
            Err(e) => {
                error!(
                    cert = %tls.cert_file.display(),
                    key = %tls.key_file.display(),
                    error = %e,
                    "failed to load TLS certificate"
                );
                process::exit(1);
            }
        };
        info!(%addr, "listening (tls)");
        axum_server::bind_rustls(addr, rustls).serve(app).await
    } else {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(%addr, error = %e, "failed to bind");
                process::exit(1);
            }
        };
        info!(%addr, "listening");
        axum::serve(listener, app).await
    };

    if let Err(e) = served {
        error!(error = %e, "server error");
        process::exit(1);
    }
}
