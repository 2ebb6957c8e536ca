//! Step 1 of §4.7: resolves a routing resource's annotations into a fully
//! overridden per-resource configuration, starting from the effective
//! configuration (built-ins merged over the parsed configmap).

use std::collections::{BTreeMap, HashMap};

use crate::annotations::*;
use crate::error::Error;
use crate::model::{EffectiveConfig, JwtPolicy, LbMethod};

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub lb_method: LbMethod,
    pub proxy_connect_timeout: String,
    pub proxy_read_timeout: String,
    pub client_max_body_size: String,
    pub proxy_buffering: bool,
    pub proxy_buffers: Option<String>,
    pub proxy_buffer_size: Option<String>,
    pub proxy_max_temp_file_size: Option<String>,
    pub location_snippets: Vec<String>,
    pub server_snippets: Vec<String>,
    pub keepalive: Option<u32>,
    pub max_fails: u32,
    pub fail_timeout: String,
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

    /// Per-service overrides, keyed by the service name named in the
    /// annotation (design doc §4.6): rewrite target, sticky-cookie spec,
    /// websocket/ssl/grpc flags, health-check policy, slow-start.
    pub rewrites: HashMap<String, String>,
    pub sticky_cookies: HashMap<String, String>,
    pub websocket_services: Vec<String>,
    pub ssl_services: Vec<String>,
    pub grpc_services: Vec<String>,
    pub health_checks: Vec<String>,
    pub health_checks_mandatory: bool,
    pub health_checks_mandatory_queue: Option<u32>,
    pub slow_start: Option<String>,

    pub jwt: Option<JwtPolicy>,
}

/// Applies ingress annotations over `effective`, producing the resolved,
/// per-resource configuration (design doc §4.7 step 1). Parse errors are
/// collected, not propagated: the affected setting is left at its
/// inherited value (§7 InputInvalid).
pub fn resolve(
    effective: &EffectiveConfig,
    annotations: &BTreeMap<String, String>,
    prefix: &str,
    namespace: &str,
    name: &str,
    commercial: bool,
) -> (ResolvedConfig, Vec<Error>) {
    let mut errors = Vec::new();
    let scoped: BTreeMap<String, String> = annotations
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(&format!("{prefix}/"))
                .map(|bare| (bare.to_string(), v.clone()))
        })
        .collect();
    let map = TypedMap::ingress(namespace, name, &scoped);

    let mut cfg = ResolvedConfig {
        lb_method: effective.lb_method,
        proxy_connect_timeout: effective.proxy_connect_timeout.clone(),
        proxy_read_timeout: effective.proxy_read_timeout.clone(),
        client_max_body_size: effective.client_max_body_size.clone(),
        proxy_buffering: effective.proxy_buffering,
        proxy_buffers: effective.proxy_buffers.clone(),
        proxy_buffer_size: effective.proxy_buffer_size.clone(),
        proxy_max_temp_file_size: effective.proxy_max_temp_file_size.clone(),
        location_snippets: effective.location_snippets.clone(),
        server_snippets: effective.server_snippets.clone(),
        keepalive: effective.keepalive,
        max_fails: effective.max_fails,
        fail_timeout: effective.fail_timeout.clone(),
        hsts: effective.hsts,
        hsts_max_age: effective.hsts_max_age,
        hsts_include_subdomains: effective.hsts_include_subdomains,
        ssl_redirect: effective.ssl_redirect,
        redirect_to_https: effective.redirect_to_https,
        server_tokens: effective.server_tokens.clone(),
        proxy_protocol: effective.proxy_protocol,
        real_ip_header: effective.real_ip_header.clone(),
        set_real_ip_from: effective.set_real_ip_from.clone(),
        real_ip_recursive: effective.real_ip_recursive,
        proxy_hide_headers: effective.proxy_hide_headers.clone(),
        proxy_pass_headers: effective.proxy_pass_headers.clone(),
        listen_ports: vec![],
        listen_ports_ssl: vec![],
        rewrites: HashMap::new(),
        sticky_cookies: HashMap::new(),
        websocket_services: vec![],
        ssl_services: vec![],
        grpc_services: vec![],
        health_checks: vec![],
        health_checks_mandatory: false,
        health_checks_mandatory_queue: None,
        slow_start: None,
        jwt: None,
    };

    if let Some(v) = map.get_str(LB_METHOD) {
        match crate::annotations::parse_lb_method(v, commercial) {
            Ok(m) => cfg.lb_method = m,
            Err(cause) => errors.push(map.invalid_err(LB_METHOD, "load balancing method", cause)),
        }
    }
    if let Some(v) = map.get_str(PROXY_CONNECT_TIMEOUT) {
        cfg.proxy_connect_timeout = v.to_string();
    }
    if let Some(v) = map.get_str(PROXY_READ_TIMEOUT) {
        cfg.proxy_read_timeout = v.to_string();
    }
    if let Some(v) = map.get_str(CLIENT_MAX_BODY_SIZE) {
        cfg.client_max_body_size = v.to_string();
    }
    if let Some(v) = map.get_bool(PROXY_BUFFERING, &mut errors) {
        cfg.proxy_buffering = v;
    }
    if let Some(v) = map.get_str(PROXY_BUFFERS) {
        cfg.proxy_buffers = Some(v.to_string());
    }
    if let Some(v) = map.get_str(PROXY_BUFFER_SIZE) {
        cfg.proxy_buffer_size = Some(v.to_string());
    }
    if let Some(v) = map.get_str(PROXY_MAX_TEMP_FILE_SIZE) {
        cfg.proxy_max_temp_file_size = Some(v.to_string());
    }
    if let Some(v) = map.get_list(LOCATION_SNIPPETS, '\n') {
        cfg.location_snippets = v;
    }
    if let Some(v) = map.get_list(SERVER_SNIPPETS, '\n') {
        cfg.server_snippets = v;
    }
    if let Some(v) = map.get_i64(KEEPALIVE, &mut errors) {
        cfg.keepalive = Some(v as u32);
    }
    if let Some(v) = map.get_i64(MAX_FAILS, &mut errors) {
        cfg.max_fails = v as u32;
    }
    if let Some(v) = map.get_str(FAIL_TIMEOUT) {
        cfg.fail_timeout = v.to_string();
    }

    apply_hsts_override(&mut cfg, &map, &mut errors);

    if let Some(v) = map.get_bool(SSL_REDIRECT, &mut errors) {
        cfg.ssl_redirect = v;
    }
    if let Some(v) = map.get_bool(REDIRECT_TO_HTTPS, &mut errors) {
        cfg.redirect_to_https = v;
    }
    if let Some(v) = map.get_bool(SERVER_TOKENS, &mut errors) {
        cfg.server_tokens = Some(v.to_string());
    }
    if let Some(v) = map.get_bool(PROXY_PROTOCOL, &mut errors) {
        cfg.proxy_protocol = v;
    }
    if let Some(v) = map.get_str(REAL_IP_HEADER) {
        cfg.real_ip_header = Some(v.to_string());
    }
    if let Some(v) = map.get_list(SET_REAL_IP_FROM, ',') {
        cfg.set_real_ip_from = v;
    }
    if let Some(v) = map.get_bool(REAL_IP_RECURSIVE, &mut errors) {
        cfg.real_ip_recursive = v;
    }
    if let Some(v) = map.get_list(PROXY_HIDE_HEADERS, ',') {
        cfg.proxy_hide_headers = v;
    }
    if let Some(v) = map.get_list(PROXY_PASS_HEADERS, ',') {
        cfg.proxy_pass_headers = v;
    }
    if let Some(v) = map.get_list(LISTEN_PORTS, ',') {
        cfg.listen_ports = v.iter().filter_map(|s| s.parse().ok()).collect();
    }
    if let Some(v) = map.get_list(LISTEN_PORTS_SSL, ',') {
        cfg.listen_ports_ssl = v.iter().filter_map(|s| s.parse().ok()).collect();
    }

    if let Some(v) = map.get_str(REWRITES) {
        match parse_rewrites(v) {
            Ok(rw) => cfg.rewrites = rw.into_iter().map(|r| (r.service_name, r.path)).collect(),
            Err(cause) => errors.push(map.invalid_err(REWRITES, "rewrite list", cause)),
        }
    }
    if let Some(v) = map.get_str(STICKY_COOKIE_SERVICES) {
        match parse_sticky_cookie_services(v) {
            Ok(sc) => {
                cfg.sticky_cookies = sc
                    .into_iter()
                    .map(|s| (s.service_name, s.cookie_spec))
                    .collect()
            }
            Err(cause) => errors.push(map.invalid_err(STICKY_COOKIE_SERVICES, "sticky cookie list", cause)),
        }
    }
    if let Some(v) = map.get_list(WEBSOCKET_SERVICES, ',') {
        cfg.websocket_services = v;
    }
    if let Some(v) = map.get_list(SSL_SERVICES, ',') {
        cfg.ssl_services = v;
    }
    if let Some(v) = map.get_list(GRPC_SERVICES, ',') {
        cfg.grpc_services = v;
    }
    if let Some(v) = map.get_list(HEALTH_CHECKS, ',') {
        cfg.health_checks = v;
    }
    if let Some(v) = map.get_bool(HEALTH_CHECKS_MANDATORY, &mut errors) {
        cfg.health_checks_mandatory = v;
    }
    if let Some(v) = map.get_i64(HEALTH_CHECKS_MANDATORY_QUEUE, &mut errors) {
        cfg.health_checks_mandatory_queue = Some(v as u32);
    }
    if let Some(v) = map.get_str(SLOW_START) {
        cfg.slow_start = Some(v.to_string());
    }

    if let Some(key_file) = map.get_str(JWT_KEY) {
        cfg.jwt = Some(JwtPolicy {
            key_file: key_file.to_string(),
            realm: map.get_str(JWT_REALM).unwrap_or("").to_string(),
            token: map.get_str(JWT_TOKEN).map(str::to_string),
            login_url: map.get_str(JWT_LOGIN_URL).map(str::to_string),
        });
    }

    (cfg, errors)
}

fn apply_hsts_override(cfg: &mut ResolvedConfig, map: &TypedMap, errors: &mut Vec<Error>) {
    if map.get_str(HSTS).is_none()
        && map.get_str(HSTS_MAX_AGE).is_none()
        && map.get_str(HSTS_INCLUDE_SUBDOMAINS).is_none()
    {
        return;
    }
    let mut local_errors = Vec::new();
    let hsts = map.get_bool(HSTS, &mut local_errors);
    let max_age = map.get_i64(HSTS_MAX_AGE, &mut local_errors);
    let include_subdomains = map.get_bool(HSTS_INCLUDE_SUBDOMAINS, &mut local_errors);
    if !local_errors.is_empty() {
        errors.extend(local_errors);
        return;
    }
    if let Some(v) = hsts {
        cfg.hsts = v;
    }
    if let Some(v) = max_age {
        cfg.hsts_max_age = v;
    }
    if let Some(v) = include_subdomains {
        cfg.hsts_include_subdomains = v;
    }
}
