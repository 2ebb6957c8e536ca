//! The template engine is a pure function from model to bytes (design doc
//! §1). This module provides one concrete, swappable implementation behind
//! the `Render` trait so the rest of the crate never depends on a specific
//! text grammar.

use crate::error::Error;
use crate::model::{ConfigurationModel, EffectiveConfig, LbMethod};

pub trait Render: Send + Sync {
    fn render_main(&self, effective: &EffectiveConfig) -> Result<Vec<u8>, Error>;
    fn render_ingress(&self, name: &str, model: &ConfigurationModel) -> Result<Vec<u8>, Error>;
}

/// Renders a text format close to NGINX's own grammar, sufficient to
/// exercise every field of the configuration model end to end.
#[derive(Default)]
pub struct NginxTemplate;

impl Render for NginxTemplate {
    fn render_main(&self, effective: &EffectiveConfig) -> Result<Vec<u8>, Error> {
        let mut out = String::new();
        out.push_str(&format!("worker_processes {};\n", effective.worker_processes));
        if let Some(affinity) = &effective.worker_cpu_affinity {
            out.push_str(&format!("worker_cpu_affinity {affinity};\n"));
        }
        out.push_str("events {\n");
        out.push_str(&format!("    worker_connections {};\n", effective.worker_connections));
        out.push_str("}\n\n");
        out.push_str("http {\n");
        if let Some(tokens) = &effective.server_tokens {
            out.push_str(&format!("    server_tokens {tokens};\n"));
        }
        out.push_str(&format!("    client_max_body_size {};\n", effective.client_max_body_size));
        if let Some(fmt) = &effective.log_format {
            out.push_str(&format!("    log_format custom '{fmt}';\n"));
        }
        for snippet in &effective.http_snippets {
            out.push_str(&format!("    {snippet}\n"));
        }
        out.push_str("    include /etc/nginx/conf.d/*.conf;\n");
        out.push_str("}\n");
        Ok(out.into_bytes())
    }

    fn render_ingress(&self, name: &str, model: &ConfigurationModel) -> Result<Vec<u8>, Error> {
        let mut out = String::new();
        out.push_str(&format!("# ingress: {name}\n"));

        for upstream in &model.upstreams {
            out.push_str(&format!("upstream {} {{\n", upstream.name));
            out.push_str(&format!("    {}\n", render_lb_method(upstream.lb_method)));
            if let Some(sticky) = &upstream.sticky_cookie {
                out.push_str(&format!("    sticky cookie {} {};\n", sticky.name, sticky.parameters));
            }
            if let Some(queue) = upstream.queue {
                out.push_str(&format!("    queue {queue};\n"));
            }
            for member in &upstream.members {
                out.push_str(&format!(
                    "    server {} max_fails={} fail_timeout={}{};\n",
                    member.address,
                    member.max_fails,
                    member.fail_timeout,
                    if member.slow_start.is_empty() {
                        String::new()
                    } else {
                        format!(" slow_start={}", member.slow_start)
                    }
                ));
            }
            out.push_str("}\n\n");
        }

        for health in &model.health_checks {
            out.push_str(&format!(
                "# health_check upstream={} mandatory={}{}\n",
                health.upstream,
                health.mandatory,
                health
                    .mandatory_queue
                    .map(|q| format!(" queue={q}"))
                    .unwrap_or_default()
            ));
        }

        if let Some(keepalive) = model.keepalive {
            out.push_str(&format!("# keepalive {keepalive}\n"));
        }

        for server in &model.servers {
            out.push_str("server {\n");
            for port in &server.policy.listen_ports {
                out.push_str(&format!("    listen {port};\n"));
            }
            if server.tls.is_some() {
                for port in &server.policy.listen_ports_ssl {
                    out.push_str(&format!("    listen {port} ssl;\n"));
                }
            }
            out.push_str(&format!(
                "    server_name {};\n",
                if server.host.is_empty() { "_" } else { &server.host }
            ));
            out.push_str(&format!("    # status_zone: {}\n", server.status_zone));
            if let Some(tls) = &server.tls {
                render_tls(&mut out, tls);
            }
            if server.policy.hsts {
                out.push_str(&format!(
                    "    add_header Strict-Transport-Security \"max-age={}{}\";\n",
                    server.policy.hsts_max_age,
                    if server.policy.hsts_include_subdomains {
                        "; includeSubDomains"
                    } else {
                        ""
                    }
                ));
            }
            if server.policy.ssl_redirect {
                out.push_str("    # ssl_redirect on\n");
            }
            if server.grpc_only {
                out.push_str("    # grpc_only\n");
            }
            if let Some(jwt) = &server.jwt {
                render_jwt(&mut out, jwt);
            }
            for (name, target) in &server.jwt_redirect_locations {
                out.push_str(&format!("    location {name} {{ return 302 {target}; }}\n"));
            }
            for snippet in &server.policy.server_snippets {
                out.push_str(&format!("    {snippet}\n"));
            }
            for location in &server.locations {
                render_location(&mut out, location);
            }
            out.push_str("}\n\n");
        }

        Ok(out.into_bytes())
    }
}

fn render_lb_method(method: LbMethod) -> String {
    match method {
        LbMethod::RoundRobin => String::new(),
        LbMethod::LeastConn => "least_conn;".to_string(),
        LbMethod::IpHash => "ip_hash;".to_string(),
        LbMethod::Hash { key, consistent } => {
            format!("hash {key}{};", if consistent { " consistent" } else { "" })
        }
        LbMethod::LeastTime { last_byte, inflight } => format!(
            "least_time {}{};",
            if last_byte { "last_byte" } else { "header" },
            if inflight { " inflight" } else { "" }
        ),
    }
}

fn render_tls(out: &mut String, path: &str) {
    out.push_str(&format!("    ssl_certificate {path};\n"));
    out.push_str(&format!("    ssl_certificate_key {path};\n"));
}

fn render_jwt(out: &mut String, jwt: &crate::model::JwtPolicy) {
    out.push_str(&format!("    auth_jwt \"{}\";\n", jwt.realm));
    out.push_str(&format!("    auth_jwt_key_file {};\n", jwt.key_file));
}

fn render_location(out: &mut String, location: &crate::model::Location) {
    out.push_str(&format!("    location {} {{\n", location.path));
    if let Some(minion) = &location.minion_identity {
        out.push_str(&format!("        # from minion: {minion}\n"));
    }
    if let Some(timeout) = &location.overrides.proxy_connect_timeout {
        out.push_str(&format!("        proxy_connect_timeout {timeout};\n"));
    }
    if let Some(timeout) = &location.overrides.proxy_read_timeout {
        out.push_str(&format!("        proxy_read_timeout {timeout};\n"));
    }
    if let Some(size) = &location.overrides.client_max_body_size {
        out.push_str(&format!("        client_max_body_size {size};\n"));
    }
    if location.overrides.websocket {
        out.push_str("        proxy_set_header Upgrade $http_upgrade;\n");
        out.push_str("        proxy_set_header Connection \"upgrade\";\n");
    }
    if let Some(rewrite) = &location.overrides.rewrite_path {
        out.push_str(&format!("        rewrite ^ {rewrite} break;\n"));
    }
    for snippet in &location.overrides.location_snippets {
        out.push_str(&format!("        {snippet}\n"));
    }
    if let Some(jwt) = &location.jwt {
        render_jwt(out, jwt);
    }
    let scheme = if location.overrides.grpc {
        "grpc"
    } else if location.overrides.ssl_upstream {
        "https"
    } else {
        "http"
    };
    out.push_str(&format!(
        "        proxy_pass {scheme}://{};\n",
        location.upstream
    ));
    out.push_str("    }\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Server, ServerPolicy, Upstream, UpstreamMember};

    #[test]
    fn renders_a_minimal_server() {
        let model = ConfigurationModel {
            upstreams: vec![Upstream {
                name: "default-cafe-cafe.example.com-coffee-svc-80".to_string(),
                members: vec![UpstreamMember {
                    address: "10.0.0.1:80".to_string(),
                    max_fails: 1,
                    fail_timeout: "10s".to_string(),
                    slow_start: String::new(),
                }],
                lb_method: LbMethod::RoundRobin,
                sticky_cookie: None,
                queue: None,
            }],
            servers: vec![Server {
                host: "cafe.example.com".to_string(),
                status_zone: "cafe.example.com".to_string(),
                tls: None,
                policy: ServerPolicy::default(),
                locations: vec![],
                grpc_only: false,
                jwt: None,
                jwt_redirect_locations: vec![],
            }],
            health_checks: vec![],
            keepalive: None,
        };
        let bytes = NginxTemplate.render_ingress("default-cafe", &model).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("upstream default-cafe-cafe.example.com-coffee-svc-80"));
        assert!(text.contains("server cafe.example.com"));
    }
}
