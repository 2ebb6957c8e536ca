//! C9: the reload controller. Owns the monotonic `ConfigVersion`, writes it
//! to the version file before reloading, signals the process, then polls
//! the proxy's own introspection endpoint until it reports the expected
//! version or the poll budget runs out (design doc §4.9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::clock::Clock;
use crate::error::Error;
use crate::model::ConfigVersion;
use crate::proxyctl::files::FileWriter;
use crate::proxyctl::process::ProcessHandle;

const EXPECTED_VERSION_HEADER: &str = "x-expected-config-version";

pub struct ReloadController {
    writer: FileWriter,
    process: Arc<dyn ProcessHandle>,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    control_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    version: AtomicU64,
}

impl ReloadController {
    pub fn new(
        writer: FileWriter,
        process: Arc<dyn ProcessHandle>,
        http: reqwest::Client,
        clock: Arc<dyn Clock>,
        control_url: String,
        poll_interval: Duration,
        poll_timeout: Duration,
    ) -> Self {
        ReloadController {
            writer,
            process,
            http,
            clock,
            control_url,
            poll_interval,
            poll_timeout,
            version: AtomicU64::new(0),
        }
    }

    pub fn current_version(&self) -> ConfigVersion {
        ConfigVersion(self.version.load(Ordering::SeqCst))
    }

    /// Bumps the version, persists it, signals the proxy, then verifies
    /// the new version is live (design doc §4.9). Every step's failure
    /// becomes `ReloadFailed`; the version is bumped even on failure so a
    /// subsequent reload attempt does not race a stale expectation.
    pub async fn reload(&self) -> Result<ConfigVersion, Error> {
        let next = ConfigVersion(self.version.fetch_add(1, Ordering::SeqCst) + 1);

        self.writer
            .write_atomic(&self.writer.version_file_path(), next.to_string().as_bytes())
            .await?;

        self.process.reload().await.map_err(|err| {
            Error::ReloadFailed(format!("signaling proxy for version {next}: {err}"))
        })?;

        self.verify(next).await?;
        info!("reload complete, now at config version {next}");
        Ok(next)
    }

    /// Polls `<control_url>/version` until it reports `expected`, bounded
    /// by `poll_timeout` (design doc §4.9). In local mode the proxy never
    /// actually serves this endpoint, so verification is skipped.
    async fn verify(&self, expected: ConfigVersion) -> Result<(), Error> {
        if self.writer.local_mode {
            return Ok(());
        }

        let deadline = self.clock.now_millis() + self.poll_timeout.as_millis() as i64;
        loop {
            let resp = self
                .http
                .get(format!("{}/version", self.control_url))
                .header(EXPECTED_VERSION_HEADER, expected.to_string())
                .send()
                .await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    let reported = r
                        .headers()
                        .get(EXPECTED_VERSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok());
                    if reported == Some(expected.0) {
                        return Ok(());
                    }
                }
                Ok(r) => warn!("version poll returned status {}", r.status()),
                Err(err) => warn!("version poll failed: {err}"),
            }

            if self.clock.now_millis() >= deadline {
                return Err(Error::ReloadFailed(format!(
                    "proxy did not report config version {expected} within {:?}",
                    self.poll_timeout
                )));
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoopProcess {
        reloaded: AtomicBool,
    }

    #[async_trait]
    impl ProcessHandle for NoopProcess {
        async fn spawn(&self) -> Result<(), Error> {
            Ok(())
        }
        async fn reload(&self) -> Result<(), Error> {
            self.reloaded.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn quit(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reload_bumps_version_and_verifies_against_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .and(header(EXPECTED_VERSION_HEADER, "1"))
            .respond_with(ResponseTemplate::new(200).insert_header(EXPECTED_VERSION_HEADER, "1"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), false);
        let controller = ReloadController::new(
            writer,
            Arc::new(NoopProcess { reloaded: AtomicBool::new(false) }),
            reqwest::Client::new(),
            Arc::new(FrozenClock::new(0)),
            server.uri(),
            Duration::from_millis(1),
            Duration::from_secs(1),
        );

        let version = controller.reload().await.unwrap();
        assert_eq!(version, ConfigVersion(1));
    }

    #[tokio::test]
    async fn verification_times_out_if_proxy_never_catches_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).insert_header(EXPECTED_VERSION_HEADER, "0"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), false);
        let clock = Arc::new(FrozenClock::new(0));
        let controller = ReloadController::new(
            writer,
            Arc::new(NoopProcess { reloaded: AtomicBool::new(false) }),
            reqwest::Client::new(),
            clock,
            server.uri(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );

        let result = controller.reload().await;
        assert!(matches!(result, Err(Error::ReloadFailed(_))));
    }
}
