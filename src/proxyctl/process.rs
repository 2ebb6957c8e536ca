//! C8 (process half): spawns and signals the proxy process (design doc §4.8).

use std::process::Stdio;

use anyhow::anyhow;
use async_trait::async_trait;
use log::info;
use tokio::process::Command;

use crate::error::Error;

#[async_trait]
pub trait ProcessHandle: Send + Sync {
    async fn spawn(&self) -> Result<(), Error>;
    async fn reload(&self) -> Result<(), Error>;
    async fn quit(&self) -> Result<(), Error>;
}

/// Drives a real child process via the proxy binary's own `-s` signal
/// subcommands.
pub struct ChildProcessHandle {
    pub binary: std::path::PathBuf,
    pub config_path: std::path::PathBuf,
}

#[async_trait]
impl ProcessHandle for ChildProcessHandle {
    async fn spawn(&self) -> Result<(), Error> {
        let status = Command::new(&self.binary)
            .stdin(Stdio::null())
            .args(["-c", &self.config_path.to_string_lossy()])
            .spawn()
            .map_err(|err| anyhow!("failed to spawn proxy: {err}"))?
            .wait()
            .await
            .map_err(|err| anyhow!("proxy output error: {err}"))?;

        if !status.success() {
            return Err(Error::ReloadFailed(format!("proxy exited with status: {status:?}")));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), Error> {
        let status = Command::new(&self.binary)
            .stdin(Stdio::null())
            .args(["-s", "reload", "-c", &self.config_path.to_string_lossy()])
            .spawn()
            .map_err(|err| anyhow!("failed to spawn proxy reload: {err}"))?
            .wait()
            .await
            .map_err(|err| anyhow!("proxy reload output error: {err}"))?;

        if !status.success() {
            return Err(Error::ReloadFailed(format!("proxy reload exited with status: {status:?}")));
        }
        Ok(())
    }

    async fn quit(&self) -> Result<(), Error> {
        let status = Command::new(&self.binary)
            .stdin(Stdio::null())
            .args(["-s", "quit", "-c", &self.config_path.to_string_lossy()])
            .spawn()
            .map_err(|err| anyhow!("failed to spawn proxy quit: {err}"))?
            .wait()
            .await
            .map_err(|err| anyhow!("proxy quit output error: {err}"))?;

        if !status.success() {
            return Err(Error::ReloadFailed(format!("proxy quit exited with status: {status:?}")));
        }
        Ok(())
    }
}

/// Local/dry-run handle: logs every effect instead of touching a real
/// process (design doc §4.8, local mode).
#[derive(Default)]
pub struct LocalHandle;

#[async_trait]
impl ProcessHandle for LocalHandle {
    async fn spawn(&self) -> Result<(), Error> {
        info!("local mode: would spawn proxy process");
        Ok(())
    }

    async fn reload(&self) -> Result<(), Error> {
        info!("local mode: would signal proxy reload");
        Ok(())
    }

    async fn quit(&self) -> Result<(), Error> {
        info!("local mode: would signal proxy quit");
        Ok(())
    }
}
