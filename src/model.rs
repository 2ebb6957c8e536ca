//! The data model of design doc §3: the routing resource the cluster
//! declares, the mergeable composition of master+minions, the assembled
//! ingress with its resolved dependencies, and the configuration model the
//! synthesizer hands to the template engine.

use std::collections::BTreeMap;

/// A backend reference: a service name/port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    pub service_name: String,
    pub service_port: ServicePort,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServicePort {
    Number(u16),
    Name(String),
}

impl std::fmt::Display for ServicePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServicePort::Number(n) => write!(f, "{n}"),
            ServicePort::Name(n) => write!(f, "{n}"),
        }
    }
}

/// One rule: `host` (empty string means "matches no other rule's host"),
/// and the ordered path/backend pairs served under it. A master's rule
/// carries no paths (§3 invariant); a minion's rule carries exactly one
/// path in practice but the type allows more so validation can reject it
/// explicitly rather than by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub host: String,
    pub paths: Vec<PathBackend>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathBackend {
    pub path: String,
    pub backend: Backend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsSection {
    pub hosts: Vec<String>,
    pub secret_name: String,
}

/// Whether this routing resource participates in mergeable-ingress
/// composition, and as which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeableRole {
    None,
    Master,
    Minion,
}

/// A named virtual-host specification (design doc §3).
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingResource {
    pub namespace: String,
    pub name: String,
    pub default_backend: Option<Backend>,
    pub rules: Vec<Rule>,
    pub tls: Vec<TlsSection>,
    pub annotations: BTreeMap<String, String>,
    pub role: MergeableRole,
}

impl RoutingResource {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// namespace-name form used for on-disk filenames and the registry.
    pub fn file_key(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }

    /// True if the resource has at least one rule with a path, or a
    /// default backend (the "no valid rules" check of §4.5).
    pub fn has_installable_content(&self) -> bool {
        self.default_backend.is_some() || self.rules.iter().any(|r| !r.paths.is_empty())
    }
}

/// A master routing resource plus the minions merged into it (§3).
#[derive(Debug, Clone)]
pub struct MergeableGroup {
    pub master: RoutingResource,
    pub minions: Vec<RoutingResource>,
}

/// Validated secret material, tagged by kind rather than detected ad hoc
/// (design note §9).
#[derive(Debug, Clone, PartialEq)]
pub enum SecretMaterial {
    Tls { cert: Vec<u8>, key: Vec<u8> },
    Jwk { key: Vec<u8> },
}

/// A routing resource together with its resolved dependencies (§3). Created
/// transiently per sync task and discarded once the `ConfigurationModel` is
/// built.
#[derive(Debug, Clone)]
pub struct AssembledIngress {
    pub resource: RoutingResource,
    pub minions: Vec<(RoutingResource, AssembledDependencies)>,
    pub deps: AssembledDependencies,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledDependencies {
    /// secret name -> validated material
    pub secrets: BTreeMap<String, SecretMaterial>,
    /// (service name, port) -> endpoint address:port strings
    pub endpoints: BTreeMap<(String, u16), Vec<String>>,
}

// ---------------------------------------------------------------------
// Configuration model (per routing resource / mergeable group)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbMethod {
    RoundRobin,
    LeastConn,
    IpHash,
    Hash { key: String, consistent: bool },
    LeastTime { last_byte: bool, inflight: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StickyCookie {
    pub name: String,
    pub parameters: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamMember {
    pub address: String,
    pub max_fails: u32,
    pub fail_timeout: String,
    pub slow_start: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upstream {
    pub name: String,
    pub members: Vec<UpstreamMember>,
    pub lb_method: LbMethod,
    pub sticky_cookie: Option<StickyCookie>,
    pub queue: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JwtPolicy {
    /// Absolute on-disk path to the JWK secret's material (design doc
    /// §4.8, §6), resolved from the `jwt-key` annotation's secret name.
    pub key_file: String,
    pub realm: String,
    pub token: Option<String>,
    pub login_url: Option<String>,
}

/// Per-route overrides carried by a `Location` (§3).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteOverrides {
    pub proxy_connect_timeout: Option<String>,
    pub proxy_read_timeout: Option<String>,
    pub client_max_body_size: Option<String>,
    pub proxy_buffering: Option<bool>,
    pub proxy_buffers: Option<String>,
    pub proxy_buffer_size: Option<String>,
    pub proxy_max_temp_file_size: Option<String>,
    pub rewrite_path: Option<String>,
    pub websocket: bool,
    pub ssl_upstream: bool,
    pub grpc: bool,
    pub location_snippets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub path: String,
    pub upstream: String,
    pub overrides: RouteOverrides,
    pub jwt: Option<JwtPolicy>,
    /// Diagnostic back-reference to the minion that contributed this
    /// location, if any (§3).
    pub minion_identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthCheck {
    pub upstream: String,
    pub mandatory: bool,
    pub mandatory_queue: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerPolicy {
    pub hsts: bool,
    pub hsts_max_age: i64,
    pub hsts_include_subdomains: bool,
    pub ssl_redirect: bool,
    pub redirect_to_https: bool,
    pub server_tokens: Option<String>,
    pub proxy_protocol: bool,
    pub real_ip_header: Option<String>,
    pub set_real_ip_from: Vec<String>,
    pub real_ip_recursive: bool,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_pass_headers: Vec<String>,
    pub listen_ports: Vec<u16>,
    pub listen_ports_ssl: Vec<u16>,
    pub server_snippets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub host: String,
    pub status_zone: String,
    /// Absolute on-disk path to the combined cert+key file C8 wrote for
    /// this host's TLS secret, if any (design doc §4.8, §6).
    pub tls: Option<String>,
    pub policy: ServerPolicy,
    pub locations: Vec<Location>,
    pub grpc_only: bool,
    pub jwt: Option<JwtPolicy>,
    pub jwt_redirect_locations: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigurationModel {
    pub upstreams: Vec<Upstream>,
    pub servers: Vec<Server>,
    pub health_checks: Vec<HealthCheck>,
    /// Emitted only when positive (§4.7 edge case).
    pub keepalive: Option<u32>,
}

// ---------------------------------------------------------------------
// Effective configuration and version
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub server_tokens: Option<String>,
    pub lb_method: LbMethod,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_pass_headers: Vec<String>,
    pub client_max_body_size: String,
    pub server_names_hash_bucket_size: Option<String>,
    pub server_names_hash_max_size: Option<String>,
    pub http2: bool,
    pub redirect_to_https: bool,
    pub ssl_redirect: bool,
    pub hsts: bool,
    pub hsts_max_age: i64,
    pub hsts_include_subdomains: bool,
    pub proxy_protocol: bool,
    pub real_ip_header: Option<String>,
    pub set_real_ip_from: Vec<String>,
    pub real_ip_recursive: bool,
    pub ssl_protocols: String,
    pub ssl_prefer_server_ciphers: bool,
    pub ssl_ciphers: String,
    pub ssl_dhparam_file: Option<String>,
    pub log_format: Option<String>,
    pub proxy_buffering: bool,
    pub proxy_buffers: Option<String>,
    pub proxy_buffer_size: Option<String>,
    pub proxy_max_temp_file_size: Option<String>,
    pub main_snippets: Vec<String>,
    pub http_snippets: Vec<String>,
    pub location_snippets: Vec<String>,
    pub server_snippets: Vec<String>,
    pub worker_processes: String,
    pub worker_cpu_affinity: Option<String>,
    pub worker_shutdown_timeout: Option<String>,
    pub worker_connections: u32,
    pub worker_rlimit_nofile: Option<u32>,
    pub keepalive: Option<u32>,
    pub max_fails: u32,
    pub fail_timeout: String,
    pub main_template: Option<String>,
    pub ingress_template: Option<String>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        EffectiveConfig {
            server_tokens: None,
            lb_method: LbMethod::RoundRobin,
            proxy_connect_timeout: "60s".to_string(),
            proxy_read_timeout: "60s".to_string(),
            proxy_hide_headers: vec![],
            proxy_pass_headers: vec![],
            client_max_body_size: "1m".to_string(),
            server_names_hash_bucket_size: None,
            server_names_hash_max_size: None,
            http2: false,
            redirect_to_https: false,
            ssl_redirect: true,
            hsts: false,
            hsts_max_age: 2_592_000,
            hsts_include_subdomains: false,
            proxy_protocol: false,
            real_ip_header: None,
            set_real_ip_from: vec![],
            real_ip_recursive: false,
            ssl_protocols: "TLSv1.2 TLSv1.3".to_string(),
            ssl_prefer_server_ciphers: false,
            ssl_ciphers: "".to_string(),
            ssl_dhparam_file: None,
            log_format: None,
            proxy_buffering: true,
            proxy_buffers: None,
            proxy_buffer_size: None,
            proxy_max_temp_file_size: None,
            main_snippets: vec![],
            http_snippets: vec![],
            location_snippets: vec![],
            server_snippets: vec![],
            worker_processes: "auto".to_string(),
            worker_cpu_affinity: None,
            worker_shutdown_timeout: None,
            worker_connections: 1024,
            worker_rlimit_nofile: None,
            keepalive: None,
            max_fails: 1,
            fail_timeout: "10s".to_string(),
            main_template: None,
            ingress_template: None,
        }
    }
}

/// Monotonically increasing reload generation (§3). Persisted only through
/// the version file the proxy itself serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConfigVersion(pub u64);

impl ConfigVersion {
    pub fn zero() -> Self {
        ConfigVersion(0)
    }

    pub fn next(self) -> Self {
        ConfigVersion(self.0 + 1)
    }
}

impl std::fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
