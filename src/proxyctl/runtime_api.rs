//! C10 (commercial variant only): patches upstream membership via the
//! proxy's HTTP admin API instead of a full reload, guarded by a
//! version-check precondition (design doc §4.10). Falls back to a full
//! reload whenever the precondition fails or the API call errors.

use log::{info, warn};
use serde::Serialize;

use crate::error::Error;
use crate::model::{ConfigVersion, UpstreamMember};
use crate::proxyctl::reload::ReloadController;

const EXPECTED_VERSION_HEADER: &str = "x-expected-config-version";

pub struct RuntimeApiUpdater {
    http: reqwest::Client,
    control_url: String,
}

#[derive(Serialize)]
struct UpstreamServersPayload<'a> {
    servers: Vec<ServerEntry<'a>>,
}

#[derive(Serialize)]
struct ServerEntry<'a> {
    server: &'a str,
    max_fails: u32,
    fail_timeout: &'a str,
}

#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub added: usize,
    pub removed: usize,
    pub fell_back_to_reload: bool,
}

impl RuntimeApiUpdater {
    pub fn new(http: reqwest::Client, control_url: String) -> Self {
        RuntimeApiUpdater { http, control_url }
    }

    /// Attempts to replace `upstream`'s member set in place. The
    /// version-check GET in `reload_controller.verify`'s sibling endpoint
    /// always precedes the PATCH (design doc open question, §9): a
    /// mismatch aborts the runtime update and the caller must fall back to
    /// `reload_controller.reload()`.
    pub async fn update_upstream(
        &self,
        reload_controller: &ReloadController,
        upstream: &str,
        members: &[UpstreamMember],
    ) -> Result<UpdateOutcome, Error> {
        let expected = reload_controller.current_version();

        if let Err(err) = self.check_version(expected).await {
            warn!("runtime api precondition failed for {upstream}: {err}, falling back to reload");
            return Ok(UpdateOutcome { fell_back_to_reload: true, ..Default::default() });
        }

        let before = self.list_servers(upstream).await.unwrap_or_default();

        let payload = UpstreamServersPayload {
            servers: members
                .iter()
                .map(|m| ServerEntry {
                    server: &m.address,
                    max_fails: m.max_fails,
                    fail_timeout: &m.fail_timeout,
                })
                .collect(),
        };

        let resp = self
            .http
            .post(format!("{}/api/upstreams/{upstream}/servers", self.control_url))
            .header(EXPECTED_VERSION_HEADER, expected.to_string())
            .json(&payload)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => {
                let after: Vec<String> = members.iter().map(|m| m.address.clone()).collect();
                let added = after.iter().filter(|a| !before.contains(a)).count();
                let removed = before.iter().filter(|b| !after.contains(b)).count();
                info!("runtime updated upstream {upstream}: +{added} -{removed}");
                Ok(UpdateOutcome { added, removed, fell_back_to_reload: false })
            }
            Ok(r) if r.status().as_u16() == 409 => {
                warn!("runtime api version conflict updating {upstream}, falling back to reload");
                Ok(UpdateOutcome { fell_back_to_reload: true, ..Default::default() })
            }
            Ok(r) => {
                warn!("runtime api returned {} updating {upstream}, falling back to reload", r.status());
                Ok(UpdateOutcome { fell_back_to_reload: true, ..Default::default() })
            }
            Err(err) => {
                warn!("runtime api request failed for {upstream}: {err}, falling back to reload");
                Ok(UpdateOutcome { fell_back_to_reload: true, ..Default::default() })
            }
        }
    }

    async fn check_version(&self, expected: ConfigVersion) -> Result<(), Error> {
        let resp = self
            .http
            .get(format!("{}/version", self.control_url))
            .send()
            .await?;
        let reported = resp
            .headers()
            .get(EXPECTED_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if reported == Some(expected.0) {
            Ok(())
        } else {
            Err(Error::RuntimeApiFailed(format!(
                "proxy reports version {reported:?}, expected {expected}"
            )))
        }
    }

    async fn list_servers(&self, upstream: &str) -> Result<Vec<String>, Error> {
        #[derive(serde::Deserialize)]
        struct ServerRow {
            server: String,
        }
        let resp = self
            .http
            .get(format!("{}/api/upstreams/{upstream}/servers", self.control_url))
            .send()
            .await?;
        let rows: Vec<ServerRow> = resp.json().await?;
        Ok(rows.into_iter().map(|r| r.server).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::proxyctl::files::FileWriter;
    use crate::proxyctl::process::LocalHandle;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn member(addr: &str) -> UpstreamMember {
        UpstreamMember {
            address: addr.to_string(),
            max_fails: 1,
            fail_timeout: "10s".to_string(),
            slow_start: String::new(),
        }
    }

    #[tokio::test]
    async fn version_mismatch_falls_back_to_reload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex("/version"))
            .respond_with(ResponseTemplate::new(200).insert_header(EXPECTED_VERSION_HEADER, "5"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let reload_controller = ReloadController::new(
            FileWriter::new(dir.path().to_path_buf(), true),
            Arc::new(LocalHandle),
            reqwest::Client::new(),
            Arc::new(FrozenClock::new(0)),
            server.uri(),
            Duration::from_millis(1),
            Duration::from_secs(1),
        );

        let updater = RuntimeApiUpdater::new(reqwest::Client::new(), server.uri());
        let outcome = updater
            .update_upstream(&reload_controller, "default-cafe-coffee-80", &[member("10.0.0.1:80")])
            .await
            .unwrap();
        assert!(outcome.fell_back_to_reload);
    }
}
