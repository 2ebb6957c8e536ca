//! C6: typed extraction of annotation/configmap values, with precise error
//! strings, defaulting, and the master/minion allow- and deny-lists of
//! design doc §4.6.

mod keys;
mod lists;
mod parse;

pub use keys::*;
pub use lists::{strip_master_denylist, strip_minion_denylist, MASTER_DENYLIST, MINION_DENYLIST};
pub use parse::{Rewrite, StickyCookieSpec, TypedMap};

use crate::model::{EffectiveConfig, LbMethod};
use std::collections::BTreeMap;

/// Parses a load-balancing method string per design doc §6. Returns the
/// exact error string the caller needs to surface verbatim.
pub fn parse_lb_method(value: &str, commercial: bool) -> Result<LbMethod, String> {
    let value = value.trim();
    match value {
        "round_robin" => Ok(LbMethod::RoundRobin),
        "least_conn" => Ok(LbMethod::LeastConn),
        "ip_hash" => Ok(LbMethod::IpHash),
        _ if value.starts_with("hash ") => {
            let rest = value.trim_start_matches("hash ").trim();
            let (key, consistent) = match rest.strip_suffix(" consistent") {
                Some(key) => (key.trim().to_string(), true),
                None => (rest.to_string(), false),
            };
            if key.is_empty() {
                return Err(format!("Invalid load balancing method: {value}"));
            }
            Ok(LbMethod::Hash { key, consistent })
        }
        _ if commercial && value.starts_with("least_time ") => {
            let rest = value.trim_start_matches("least_time ").trim();
            let inflight = rest.ends_with(" inflight");
            let mode = rest.trim_end_matches(" inflight").trim();
            let last_byte = match mode {
                "header" => false,
                "last_byte" => true,
                _ => return Err(format!("Invalid load balancing method: {value}")),
            };
            Ok(LbMethod::LeastTime {
                last_byte,
                inflight,
            })
        }
        _ => Err(format!("Invalid load balancing method: {value}")),
    }
}

/// Applies the built-in defaults, then the parsed configmap, producing the
/// `EffectiveConfig` of §3. Errors on individual keys are logged by the
/// caller and the affected setting is left at its default (§4.6, §7
/// InputInvalid).
pub fn build_effective_config(
    configmap_data: &BTreeMap<String, String>,
    commercial: bool,
    namespace: &str,
    name: &str,
) -> (EffectiveConfig, Vec<crate::error::Error>) {
    let mut cfg = EffectiveConfig::default();
    let mut errors = Vec::new();
    let map = TypedMap::new("ConfigMap", namespace, name, configmap_data);

    apply_common(&mut cfg, &map, commercial, &mut errors);

    if let Some(v) = map.get_str(MAIN_SNIPPETS) {
        cfg.main_snippets = vec![v.to_string()];
    }
    if let Some(v) = map.get_str(HTTP_SNIPPETS) {
        cfg.http_snippets = vec![v.to_string()];
    }
    if let Some(v) = map.get_str(MAIN_TEMPLATE) {
        cfg.main_template = Some(v.to_string());
    }
    if let Some(v) = map.get_str(INGRESS_TEMPLATE) {
        cfg.ingress_template = Some(v.to_string());
    }

    match map.get_str(WORKER_PROCESSES) {
        Some("auto") => cfg.worker_processes = "auto".to_string(),
        Some(v) => match v.parse::<u32>() {
            Ok(_) => cfg.worker_processes = v.to_string(),
            Err(e) => errors.push(map.invalid_err(WORKER_PROCESSES, "integer or 'auto'", e)),
        },
        None => {}
    }
    if let Some(v) = map.get_str(WORKER_CPU_AFFINITY) {
        cfg.worker_cpu_affinity = Some(v.to_string());
    }
    if let Some(v) = map.get_str(WORKER_SHUTDOWN_TIMEOUT) {
        cfg.worker_shutdown_timeout = Some(v.to_string());
    }
    match map.get_i64(WORKER_CONNECTIONS, &mut errors) {
        Some(v) => cfg.worker_connections = v as u32,
        None => {}
    }
    match map.get_i64(WORKER_RLIMIT_NOFILE, &mut errors) {
        Some(v) => cfg.worker_rlimit_nofile = Some(v as u32),
        None => {}
    }

    (cfg, errors)
}

fn apply_common(
    cfg: &mut EffectiveConfig,
    map: &TypedMap,
    commercial: bool,
    errors: &mut Vec<crate::error::Error>,
) {
    match map.get_str(SERVER_TOKENS) {
        Some(v) => match map.get_bool(SERVER_TOKENS, errors) {
            Some(b) => cfg.server_tokens = Some(b.to_string()),
            None if commercial => cfg.server_tokens = Some(v.to_string()),
            None => {}
        },
        None => {}
    }

    if let Some(v) = map.get_str(LB_METHOD) {
        match parse_lb_method(v, commercial) {
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
    if let Some(v) = map.get_list(PROXY_HIDE_HEADERS, ',') {
        cfg.proxy_hide_headers = v;
    }
    if let Some(v) = map.get_list(PROXY_PASS_HEADERS, ',') {
        cfg.proxy_pass_headers = v;
    }
    if let Some(v) = map.get_str(CLIENT_MAX_BODY_SIZE) {
        cfg.client_max_body_size = v.to_string();
    }
    if let Some(v) = map.get_str(SERVER_NAMES_HASH_BUCKET_SIZE) {
        cfg.server_names_hash_bucket_size = Some(v.to_string());
    }
    if let Some(v) = map.get_str(SERVER_NAMES_HASH_MAX_SIZE) {
        cfg.server_names_hash_max_size = Some(v.to_string());
    }
    if let Some(v) = map.get_bool(HTTP2, errors) {
        cfg.http2 = v;
    }
    if let Some(v) = map.get_bool(REDIRECT_TO_HTTPS, errors) {
        cfg.redirect_to_https = v;
    }
    if let Some(v) = map.get_bool(SSL_REDIRECT, errors) {
        cfg.ssl_redirect = v;
    }

    apply_hsts(cfg, map, errors);

    if let Some(v) = map.get_bool(PROXY_PROTOCOL, errors) {
        cfg.proxy_protocol = v;
    }
    if let Some(v) = map.get_str(REAL_IP_HEADER) {
        cfg.real_ip_header = Some(v.to_string());
    }
    if let Some(v) = map.get_list(SET_REAL_IP_FROM, ',') {
        cfg.set_real_ip_from = v;
    }
    if let Some(v) = map.get_bool(REAL_IP_RECURSIVE, errors) {
        cfg.real_ip_recursive = v;
    }
    if let Some(v) = map.get_str(SSL_PROTOCOLS) {
        cfg.ssl_protocols = v.to_string();
    }
    if let Some(v) = map.get_bool(SSL_PREFER_SERVER_CIPHERS, errors) {
        cfg.ssl_prefer_server_ciphers = v;
    }
    if let Some(v) = map.get_str(SSL_CIPHERS) {
        cfg.ssl_ciphers = v.to_string();
    }
    if let Some(v) = map.get_str(SSL_DHPARAM_FILE) {
        cfg.ssl_dhparam_file = Some(v.to_string());
    }
    if let Some(v) = map.get_str(LOG_FORMAT) {
        cfg.log_format = Some(v.to_string());
    }
    if let Some(v) = map.get_bool(PROXY_BUFFERING, errors) {
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
    if let Some(v) = map.get_i64(KEEPALIVE, errors) {
        cfg.keepalive = Some(v as u32);
    }
    if let Some(v) = map.get_i64(MAX_FAILS, errors) {
        cfg.max_fails = v as u32;
    }
    if let Some(v) = map.get_str(FAIL_TIMEOUT) {
        cfg.fail_timeout = v.to_string();
    }
}

/// `hsts`, `hsts-max-age` and `hsts-include-subdomains` are applied
/// atomically: a parse error on any of the three cancels all three
/// (design doc §4.6 and the scenario in §8.5).
fn apply_hsts(cfg: &mut EffectiveConfig, map: &TypedMap, errors: &mut Vec<crate::error::Error>) {
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
