//! C8 (file half): atomic config writes. Every write lands via a temp file
//! in the same directory followed by a rename, so a concurrent reload never
//! observes a partially written file (design doc §4.8).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Error;

pub struct FileWriter {
    pub root: PathBuf,
    pub local_mode: bool,
}

impl FileWriter {
    pub fn new(root: PathBuf, local_mode: bool) -> Self {
        FileWriter { root, local_mode }
    }

    pub fn main_config_path(&self) -> PathBuf {
        self.root.join("nginx.conf")
    }

    pub fn ingress_config_path(&self, file_key: &str) -> PathBuf {
        self.root.join("conf.d").join(format!("{file_key}.conf"))
    }

    pub fn version_file_path(&self) -> PathBuf {
        self.root.join("config-version")
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.root.join("secrets")
    }

    /// Path for a named secret's material, keyed the way the registry keys
    /// installed ingresses: `<namespace>-<name>` (design doc §6).
    pub fn secret_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.secrets_dir().join(format!("{namespace}-{name}"))
    }

    pub fn default_secret_path(&self) -> PathBuf {
        self.secrets_dir().join("default")
    }

    pub fn dhparam_path(&self) -> PathBuf {
        self.secrets_dir().join("dhparam.pem")
    }

    /// Writes `contents` to `path` via a sibling temp file plus rename. In
    /// local mode the write is logged but not performed (design doc §4.8,
    /// dry-run).
    pub async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), Error> {
        self.write_atomic_with_mode(path, contents, None).await
    }

    /// Same as `write_atomic`, but chmods the file to `mode` before the
    /// rename so it never appears at the target path with the wrong
    /// permissions (design doc §4.8: secret files are 0600 for TLS, 0644
    /// for JWK).
    pub async fn write_secret(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), Error> {
        self.write_atomic_with_mode(path, contents, Some(mode)).await
    }

    async fn write_atomic_with_mode(&self, path: &Path, contents: &[u8], mode: Option<u32>) -> Result<(), Error> {
        if self.local_mode {
            log::info!(
                "local mode: would write {} bytes to {}{}",
                contents.len(),
                path.display(),
                mode.map(|m| format!(" (mode {m:o})")).unwrap_or_default()
            );
            return Ok(());
        }

        let dir = path.parent().ok_or_else(|| {
            Error::WriteFailed(format!("{} has no parent directory", path.display()))
        })?;
        fs::create_dir_all(dir)
            .await
            .map_err(|err| Error::WriteFailed(format!("creating {}: {err}", dir.display())))?;

        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|f| f.to_str()).unwrap_or("config")
        ));
        fs::write(&tmp_path, contents)
            .await
            .map_err(|err| Error::WriteFailed(format!("writing {}: {err}", tmp_path.display())))?;
        if let Some(mode) = mode {
            fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|err| Error::WriteFailed(format!("setting permissions on {}: {err}", tmp_path.display())))?;
        }
        fs::rename(&tmp_path, path)
            .await
            .map_err(|err| Error::WriteFailed(format!("renaming into {}: {err}", path.display())))?;
        Ok(())
    }

    /// Removes an ingress's config file when the last of its routing
    /// resources is deleted (design doc §4.4). Missing files are not an
    /// error: the write may never have happened, or a prior pass may have
    /// already removed it.
    pub async fn remove_ingress_config(&self, file_key: &str) -> Result<(), Error> {
        if self.local_mode {
            log::info!("local mode: would remove config for {file_key}");
            return Ok(());
        }
        let path = self.ingress_config_path(file_key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::WriteFailed(format!("removing {}: {err}", path.display()))),
        }
    }

    /// Removes a secret's material file. Missing files are not an error,
    /// the same way `remove_ingress_config` treats them (design doc §4.8).
    pub async fn remove_secret(&self, path: &Path) -> Result<(), Error> {
        if self.local_mode {
            log::info!("local mode: would remove secret {}", path.display());
            return Ok(());
        }
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::WriteFailed(format!("removing {}: {err}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_atomic_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), false);
        let target = writer.main_config_path();
        writer.write_atomic(&target, b"worker_processes auto;\n").await.unwrap();

        let contents = tokio::fs::read_to_string(&target).await.unwrap();
        assert_eq!(contents, "worker_processes auto;\n");

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["nginx.conf"]);
    }

    #[tokio::test]
    async fn local_mode_never_touches_disk() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), true);
        let target = writer.main_config_path();
        writer.write_atomic(&target, b"noop").await.unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn removing_a_missing_config_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), false);
        writer.remove_ingress_config("default-cafe").await.unwrap();
    }

    #[tokio::test]
    async fn write_secret_sets_requested_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), false);
        let path = writer.secret_path("default", "cafe-tls");
        writer.write_secret(&path, b"cert+key", 0o600).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn removing_a_missing_secret_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new(dir.path().to_path_buf(), false);
        writer.remove_secret(&writer.secret_path("default", "cafe-tls")).await.unwrap();
    }
}
