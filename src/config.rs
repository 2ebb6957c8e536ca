use std::env;
use std::time::Duration;

/// Which proxy binary this controller instance is driving. The commercial
/// variant additionally supports runtime upstream updates (C10) and a
/// wider set of load-balancing methods and configmap passthroughs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyVariant {
    OpenSource,
    Commercial,
}

impl ProxyVariant {
    pub fn is_commercial(self) -> bool {
        matches!(self, ProxyVariant::Commercial)
    }
}

/// Process-level configuration, read once at startup from the environment
/// rather than a config file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Value of the class annotation this controller instance admits.
    pub ingress_class: String,
    /// When true, an ingress with no class annotation is rejected rather
    /// than admitted (design doc §4.3).
    pub strict_class: bool,
    /// Namespace/name identity of the watched ConfigMap.
    pub configmap_namespace: String,
    pub configmap_name: String,
    /// Namespace/name of the designated default-server TLS secret, if any.
    pub default_server_secret: Option<(String, String)>,
    pub variant: ProxyVariant,
    /// Root of the on-disk layout (`<root>/nginx.conf`, `<root>/conf.d`, ...).
    pub config_root: std::path::PathBuf,
    /// Path to the proxy binary C8 spawns and signals.
    pub proxy_binary: std::path::PathBuf,
    /// Base URL of the proxy's loopback control endpoint used by C9/C10.
    pub proxy_control_url: String,
    pub reload_poll_interval: Duration,
    pub reload_poll_timeout: Duration,
    /// When true, C8 logs every write/reload/process effect instead of
    /// performing it. Used for dry-run and tests.
    pub local_mode: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// documented defaults for anything not set.
    pub fn from_env() -> Self {
        let variant = match env::var("PROXY_VARIANT").as_deref() {
            Ok("commercial") => ProxyVariant::Commercial,
            _ => ProxyVariant::OpenSource,
        };

        let default_server_secret = env::var("DEFAULT_SERVER_SECRET")
            .ok()
            .and_then(|v| v.split_once('/').map(|(ns, n)| (ns.to_string(), n.to_string())));

        Config {
            ingress_class: env::var("INGRESS_CLASS").unwrap_or_else(|_| "nginx".to_string()),
            strict_class: env::var("STRICT_CLASS")
                .map(|v| v == "true")
                .unwrap_or(false),
            configmap_namespace: env::var("CONFIGMAP_NAMESPACE")
                .unwrap_or_else(|_| "default".to_string()),
            configmap_name: env::var("CONFIGMAP_NAME")
                .unwrap_or_else(|_| "nginx-config".to_string()),
            default_server_secret,
            variant,
            config_root: env::var("CONFIG_ROOT")
                .unwrap_or_else(|_| "/etc/nginx".to_string())
                .into(),
            proxy_binary: env::var("PROXY_BINARY")
                .unwrap_or_else(|_| "/usr/sbin/nginx".to_string())
                .into(),
            proxy_control_url: env::var("PROXY_CONTROL_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            reload_poll_interval: Duration::from_millis(
                env::var("RELOAD_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
            ),
            reload_poll_timeout: Duration::from_secs(
                env::var("RELOAD_POLL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
            local_mode: env::var("LOCAL_MODE").map(|v| v == "true").unwrap_or(false),
        }
    }
}
