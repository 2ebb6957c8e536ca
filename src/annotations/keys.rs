//! Recognized configmap and per-ingress annotation keys (design doc §4.6).
//! Configmap keys are bare; ingress annotation keys carry the configured
//! `<prefix>/` and are resolved by `TypedMap::ingress`.

pub const SERVER_TOKENS: &str = "server-tokens";
pub const LB_METHOD: &str = "lb-method";
pub const PROXY_CONNECT_TIMEOUT: &str = "proxy-connect-timeout";
pub const PROXY_READ_TIMEOUT: &str = "proxy-read-timeout";
pub const PROXY_HIDE_HEADERS: &str = "proxy-hide-headers";
pub const PROXY_PASS_HEADERS: &str = "proxy-pass-headers";
pub const CLIENT_MAX_BODY_SIZE: &str = "client-max-body-size";
pub const SERVER_NAMES_HASH_BUCKET_SIZE: &str = "server-names-hash-bucket-size";
pub const SERVER_NAMES_HASH_MAX_SIZE: &str = "server-names-hash-max-size";
pub const HTTP2: &str = "http2";
pub const REDIRECT_TO_HTTPS: &str = "redirect-to-https";
pub const SSL_REDIRECT: &str = "ssl-redirect";
pub const HSTS: &str = "hsts";
pub const HSTS_MAX_AGE: &str = "hsts-max-age";
pub const HSTS_INCLUDE_SUBDOMAINS: &str = "hsts-include-subdomains";
pub const PROXY_PROTOCOL: &str = "proxy-protocol";
pub const REAL_IP_HEADER: &str = "real-ip-header";
pub const SET_REAL_IP_FROM: &str = "set-real-ip-from";
pub const REAL_IP_RECURSIVE: &str = "real-ip-recursive";
pub const SSL_PROTOCOLS: &str = "ssl-protocols";
pub const SSL_PREFER_SERVER_CIPHERS: &str = "ssl-prefer-server-ciphers";
pub const SSL_CIPHERS: &str = "ssl-ciphers";
pub const SSL_DHPARAM_FILE: &str = "ssl-dhparam-file";
pub const LOG_FORMAT: &str = "log-format";
pub const PROXY_BUFFERING: &str = "proxy-buffering";
pub const PROXY_BUFFERS: &str = "proxy-buffers";
pub const PROXY_BUFFER_SIZE: &str = "proxy-buffer-size";
pub const PROXY_MAX_TEMP_FILE_SIZE: &str = "proxy-max-temp-file-size";
pub const MAIN_SNIPPETS: &str = "main-snippets";
pub const HTTP_SNIPPETS: &str = "http-snippets";
pub const LOCATION_SNIPPETS: &str = "location-snippets";
pub const SERVER_SNIPPETS: &str = "server-snippets";
pub const WORKER_PROCESSES: &str = "worker-processes";
pub const WORKER_CPU_AFFINITY: &str = "worker-cpu-affinity";
pub const WORKER_SHUTDOWN_TIMEOUT: &str = "worker-shutdown-timeout";
pub const WORKER_CONNECTIONS: &str = "worker-connections";
pub const WORKER_RLIMIT_NOFILE: &str = "worker-rlimit-nofile";
pub const KEEPALIVE: &str = "keepalive";
pub const MAX_FAILS: &str = "max-fails";
pub const FAIL_TIMEOUT: &str = "fail-timeout";
pub const MAIN_TEMPLATE: &str = "main-template";
pub const INGRESS_TEMPLATE: &str = "ingress-template";

// Ingress-only / mergeable-specific keys.
pub const MERGEABLE_INGRESS_TYPE: &str = "mergeable-ingress-type";
pub const STICKY_COOKIE_SERVICES: &str = "sticky-cookie-services";
pub const WEBSOCKET_SERVICES: &str = "websocket-services";
pub const SSL_SERVICES: &str = "ssl-services";
pub const GRPC_SERVICES: &str = "grpc-services";
pub const REWRITES: &str = "rewrites";
pub const LISTEN_PORTS: &str = "listen-ports";
pub const LISTEN_PORTS_SSL: &str = "listen-ports-ssl";
pub const HEALTH_CHECKS: &str = "health-checks";
pub const HEALTH_CHECKS_MANDATORY: &str = "health-checks-mandatory";
pub const HEALTH_CHECKS_MANDATORY_QUEUE: &str = "health-checks-mandatory-queue";
pub const SLOW_START: &str = "slow-start";
pub const JWT_KEY: &str = "jwt-key";
pub const JWT_REALM: &str = "jwt-realm";
pub const JWT_TOKEN: &str = "jwt-token";
pub const JWT_LOGIN_URL: &str = "jwt-login-url";
pub const SESSION_COOKIE: &str = "session-cookie";
