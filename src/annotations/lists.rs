use super::keys::*;
use std::collections::BTreeMap;

/// Annotations stripped if set on a master (design doc §4.6).
pub const MASTER_DENYLIST: &[&str] = &[
    REWRITES,
    SSL_SERVICES,
    GRPC_SERVICES,
    STICKY_COOKIE_SERVICES,
    HEALTH_CHECKS,
    HEALTH_CHECKS_MANDATORY,
    HEALTH_CHECKS_MANDATORY_QUEUE,
    SLOW_START,
    WEBSOCKET_SERVICES,
    SESSION_COOKIE,
];

/// Annotations stripped if set on a minion: anything that affects the
/// server block rather than a single location (design doc §4.6).
pub const MINION_DENYLIST: &[&str] = &[
    HSTS,
    HSTS_MAX_AGE,
    HSTS_INCLUDE_SUBDOMAINS,
    PROXY_HIDE_HEADERS,
    PROXY_PASS_HEADERS,
    REDIRECT_TO_HTTPS,
    SSL_REDIRECT,
    PROXY_PROTOCOL,
    REAL_IP_HEADER,
    SET_REAL_IP_FROM,
    REAL_IP_RECURSIVE,
    SERVER_TOKENS,
    SERVER_SNIPPETS,
    LISTEN_PORTS,
    LISTEN_PORTS_SSL,
    JWT_KEY,
    JWT_REALM,
    JWT_TOKEN,
    JWT_LOGIN_URL,
];

/// Master-set annotations that flow master -> minion when the minion does
/// not itself set them (design doc §4.6). Conflicts resolve minion-wins.
pub const INHERITANCE_ALLOWLIST: &[&str] = &[
    CLIENT_MAX_BODY_SIZE,
    PROXY_CONNECT_TIMEOUT,
    PROXY_READ_TIMEOUT,
    PROXY_BUFFERING,
    PROXY_BUFFERS,
    PROXY_BUFFER_SIZE,
    PROXY_MAX_TEMP_FILE_SIZE,
    LOCATION_SNIPPETS,
    LB_METHOD,
    KEEPALIVE,
    MAX_FAILS,
    FAIL_TIMEOUT,
];

pub fn strip_master_denylist(annotations: &mut BTreeMap<String, String>, prefix: &str) {
    for key in MASTER_DENYLIST {
        annotations.remove(&format!("{prefix}/{key}"));
    }
}

pub fn strip_minion_denylist(annotations: &mut BTreeMap<String, String>, prefix: &str) {
    for key in MINION_DENYLIST {
        annotations.remove(&format!("{prefix}/{key}"));
    }
}

/// Applies master->minion inheritance: for each allow-listed key the
/// master sets and the minion does not, copies the master's value onto
/// the minion. Existing minion values always win.
pub fn inherit_master_to_minion(
    master: &BTreeMap<String, String>,
    minion: &mut BTreeMap<String, String>,
    prefix: &str,
) {
    for key in INHERITANCE_ALLOWLIST {
        let full = format!("{prefix}/{key}");
        if minion.contains_key(&full) {
            continue;
        }
        if let Some(v) = master.get(&full) {
            minion.insert(full, v.clone());
        }
    }
}
