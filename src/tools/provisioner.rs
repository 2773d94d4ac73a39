//! Resolving a working ffmpeg/ffprobe binary.
//!
//! Candidates are tried in order: system PATH, the bundled directory, the
//! download cache, and finally a fresh download. Every candidate must pass
//! a `-version` probe before it is handed out.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ToolConfig;
use crate::error::ToolError;

use super::download::{self, DownloadSource};
use super::integrity::{self, ManifestCheck};
use super::runner::execute;
use super::{ToolCache, ToolHandle, ToolKind, ToolSource};

/// Whether a cached handle may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Return the cached handle when one exists.
    Cached,
    /// Drop any cached handle and verify from scratch.
    Force,
}

/// Finds, verifies and caches tool binaries.
pub struct ToolProvisioner {
    config: ToolConfig,
    cache: Arc<ToolCache>,
    search_path: Option<OsString>,
    download_lock: Mutex<()>,
}

impl ToolProvisioner {
    /// Creates a provisioner that searches the process `PATH`.
    pub fn new(config: ToolConfig, cache: Arc<ToolCache>) -> Self {
        Self {
            config,
            cache,
            search_path: std::env::var_os("PATH"),
            download_lock: Mutex::new(()),
        }
    }

    /// Searches `paths` (in `PATH` syntax) instead of the process `PATH`.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    /// Resolves a tool, reusing the cached handle if present.
    pub async fn resolve(&self, kind: ToolKind) -> Result<ToolHandle, ToolError> {
        self.resolve_with(kind, Verification::Cached).await
    }

    /// Resolves a tool with an explicit cache policy.
    pub async fn resolve_with(
        &self,
        kind: ToolKind,
        mode: Verification,
    ) -> Result<ToolHandle, ToolError> {
        match mode {
            Verification::Cached => {
                if let Some(handle) = self.cache.get(kind) {
                    return Ok(handle);
                }
            }
            Verification::Force => {
                self.cache.invalidate(kind);
            }
        }

        let mut rejected = Vec::new();
        for (source, path) in self.local_candidates(kind) {
            match verify_binary(kind, &path, source, self.config.verify_timeout()).await {
                Ok(handle) => {
                    info!(
                        tool = %kind,
                        path = %handle.path.display(),
                        source = %handle.source,
                        version = %handle.version,
                        "Tool resolved"
                    );
                    return Ok(self.cache.insert(handle, mode == Verification::Force));
                }
                Err(reason) => {
                    debug!(tool = %kind, path = %path.display(), %reason, "Candidate rejected");
                    rejected.push(format!("{} ({}): {}", path.display(), source, reason));
                }
            }
        }

        if !self.config.allow_download {
            return Err(unavailable(kind, &rejected, "downloads are disabled"));
        }

        match self.download(kind).await {
            Ok(handle) => {
                info!(
                    tool = %kind,
                    path = %handle.path.display(),
                    version = %handle.version,
                    "Tool installed from download"
                );
                Ok(self.cache.insert(handle, mode == Verification::Force))
            }
            Err(e @ ToolError::CacheDir { .. }) => Err(e),
            Err(e) => {
                warn!(tool = %kind, error = %e, "Download failed");
                Err(unavailable(kind, &rejected, &e.to_string()))
            }
        }
    }

    /// Lists local binaries worth probing, in preference order.
    fn local_candidates(&self, kind: ToolKind) -> Vec<(ToolSource, PathBuf)> {
        let mut candidates = Vec::new();

        if self.config.use_system_path {
            let paths = self.search_path.as_deref().unwrap_or(OsStr::new(""));
            match which::which_in(kind.command_name(), Some(paths), Path::new(".")) {
                Ok(path) => candidates.push((ToolSource::SystemPath, path)),
                Err(e) => debug!(tool = %kind, error = %e, "Not found on PATH"),
            }
        }

        if let Some(dir) = self.config.resolved_bundled_dir() {
            let path = dir.join(kind.file_name());
            if path.is_file() {
                ensure_executable(&path);
                candidates.push((ToolSource::Bundled, path));
            }
        }

        if let Some(path) = self.cached_binary(kind) {
            candidates.push((ToolSource::Cache, path));
        }

        candidates
    }

    /// Returns the cached download for a tool if it passes its manifest.
    fn cached_binary(&self, kind: ToolKind) -> Option<PathBuf> {
        let path = self.config.resolved_cache_dir().join(kind.file_name());
        if !path.is_file() {
            return None;
        }

        match integrity::check_manifest(&path) {
            Ok(ManifestCheck::Match) | Ok(ManifestCheck::Unrecorded) => Some(path),
            Ok(ManifestCheck::Mismatch { expected, actual }) => {
                warn!(
                    tool = %kind,
                    path = %path.display(),
                    %expected,
                    %actual,
                    "Cached binary failed its checksum, discarding"
                );
                integrity::discard(&path);
                None
            }
            Err(e) => {
                warn!(tool = %kind, path = %path.display(), error = %e, "Cannot read cached binary");
                None
            }
        }
    }

    /// Downloads a static build into the cache directory and verifies it.
    async fn download(&self, kind: ToolKind) -> Result<ToolHandle, ToolError> {
        let _guard = self.download_lock.lock().await;

        let cache_dir = self.config.resolved_cache_dir();
        std::fs::create_dir_all(&cache_dir).map_err(|source| ToolError::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        // A download for the other tool may have brought this one along.
        if let Some(path) = self.cached_binary(kind) {
            if let Ok(handle) =
                verify_binary(kind, &path, ToolSource::Cache, self.config.verify_timeout()).await
            {
                return Ok(handle);
            }
        }

        let source = download::source_for(kind, std::env::consts::OS, std::env::consts::ARCH)?;
        let staging = cache_dir.join(format!(".download-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&staging).map_err(|source| ToolError::CacheDir {
            path: staging.clone(),
            source,
        })?;

        let installed = self.fetch_and_install(&source, &staging, &cache_dir).await;
        if let Err(e) = std::fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %e, "Failed to clean download staging dir");
        }
        installed?;

        let path = cache_dir.join(kind.file_name());
        verify_binary(kind, &path, ToolSource::Downloaded, self.config.verify_timeout())
            .await
            .map_err(|reason| {
                integrity::discard(&path);
                ToolError::Download {
                    url: source.url.to_string(),
                    message: format!("downloaded binary failed verification: {}", reason),
                }
            })
    }

    async fn fetch_and_install(
        &self,
        source: &DownloadSource,
        staging: &Path,
        cache_dir: &Path,
    ) -> Result<(), ToolError> {
        let archive = staging.join(source.archive.staging_name());
        let expected = download::published_sha256(source, self.config.download_timeout()).await?;
        download::fetch(source.url, &archive, self.config.download_timeout()).await?;
        match expected {
            Some(expected) => download::verify_archive(&archive, source, &expected)?,
            None => debug!(url = %source.url, "Publisher lists no checksum for this build"),
        }

        let unpack_dir = staging.join("unpacked");
        std::fs::create_dir_all(&unpack_dir).map_err(|e| ToolError::Unpack {
            archive: archive.clone(),
            message: e.to_string(),
        })?;

        let kind = source.archive;
        let provides = source.provides.to_vec();
        let archive_path = archive.clone();
        let unpack_target = unpack_dir.clone();
        let unpacked = tokio::task::spawn_blocking(move || {
            download::unpack(&archive_path, kind, &provides, &unpack_target)
        })
        .await
        .map_err(|e| ToolError::Unpack {
            archive: archive.clone(),
            message: e.to_string(),
        })??;

        for (tool, staged) in unpacked {
            let target = cache_dir.join(tool.file_name());
            ensure_executable(&staged);
            std::fs::rename(&staged, &target)
                .or_else(|_| std::fs::copy(&staged, &target).map(|_| ()))
                .map_err(|source| ToolError::CacheDir {
                    path: target.clone(),
                    source,
                })?;
            integrity::write_manifest(&target).map_err(|source| ToolError::CacheDir {
                path: target.clone(),
                source,
            })?;
            info!(tool = %tool, path = %target.display(), "Installed binary into cache");
        }

        Ok(())
    }
}

/// Runs the `-version` probe; a zero exit within the timeout passes.
async fn verify_binary(
    kind: ToolKind,
    path: &Path,
    source: ToolSource,
    timeout: Duration,
) -> Result<ToolHandle, String> {
    let args = [OsString::from("-version")];
    let output = execute(path, &args, timeout)
        .await
        .map_err(|e| format!("failed to start: {}", e))?;

    if output.timed_out {
        return Err(format!("version probe timed out after {}s", timeout.as_secs()));
    }
    if !output.success {
        return Err(format!("version probe failed: {}", output.last_error_line()));
    }

    let version = output
        .stdout
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(ToolHandle {
        kind,
        path: path.to_path_buf(),
        source,
        version,
        verified_at: Utc::now(),
    })
}

fn unavailable(kind: ToolKind, rejected: &[String], last: &str) -> ToolError {
    let mut reason = if rejected.is_empty() {
        "no local binary found".to_string()
    } else {
        format!("rejected {}", rejected.join("; "))
    };
    reason.push_str("; ");
    reason.push_str(last);
    ToolError::Unavailable { tool: kind, reason }
}

#[cfg(unix)]
fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    let mut perms = meta.permissions();
    if perms.mode() & 0o111 == 0o111 {
        return;
    }
    perms.set_mode(0o755);
    if let Err(e) = std::fs::set_permissions(path, perms) {
        debug!(path = %path.display(), error = %e, "Could not mark binary executable");
    }
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        ensure_executable(&path);
        path
    }

    fn local_sources(provisioner: &ToolProvisioner, kind: ToolKind) -> Vec<ToolSource> {
        provisioner
            .local_candidates(kind)
            .into_iter()
            .map(|(source, _)| source)
            .collect()
    }

    fn offline_config(bundled: &Path, cache: &Path) -> ToolConfig {
        ToolConfig {
            bundled_dir: Some(bundled.to_path_buf()),
            cache_dir: Some(cache.to_path_buf()),
            allow_download: false,
            use_system_path: false,
            ..ToolConfig::default()
        }
    }

    #[tokio::test]
    async fn bundled_binary_is_verified_and_cached() {
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_script(bundled.path(), "ffprobe", "echo 'ffprobe version 6.1-static'");

        let cache = Arc::new(ToolCache::new());
        let provisioner = ToolProvisioner::new(
            offline_config(bundled.path(), cache_dir.path()),
            cache.clone(),
        );

        let handle = provisioner.resolve(ToolKind::Ffprobe).await.unwrap();
        assert_eq!(handle.source, ToolSource::Bundled);
        assert_eq!(handle.version, "ffprobe version 6.1-static");
        assert!(cache.get(ToolKind::Ffprobe).is_some());
    }

    #[tokio::test]
    async fn broken_binary_is_rejected() {
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_script(bundled.path(), "ffmpeg", "exit 1");

        let provisioner = ToolProvisioner::new(
            offline_config(bundled.path(), cache_dir.path()),
            Arc::new(ToolCache::new()),
        );

        let err = provisioner.resolve(ToolKind::Ffmpeg).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("downloads are disabled"));
    }

    #[tokio::test]
    async fn cache_entry_with_bad_checksum_is_discarded() {
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cached = write_script(cache_dir.path(), "ffmpeg", "echo 'ffmpeg version 6.1'");
        integrity::write_manifest(&cached).unwrap();
        std::fs::write(&cached, "#!/bin/sh\necho 'ffmpeg version evil'\n").unwrap();

        let provisioner = ToolProvisioner::new(
            offline_config(bundled.path(), cache_dir.path()),
            Arc::new(ToolCache::new()),
        );

        assert!(provisioner.resolve(ToolKind::Ffmpeg).await.is_err());
        assert!(!cached.exists());
    }

    #[tokio::test]
    async fn forced_verification_replaces_stale_handle() {
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let cached = write_script(cache_dir.path(), "ffmpeg", "echo 'ffmpeg version 6.0'");
        integrity::write_manifest(&cached).unwrap();

        let cache = Arc::new(ToolCache::new());
        let provisioner = ToolProvisioner::new(
            offline_config(bundled.path(), cache_dir.path()),
            cache.clone(),
        );
        let first = provisioner.resolve(ToolKind::Ffmpeg).await.unwrap();
        assert_eq!(first.source, ToolSource::Cache);

        write_script(bundled.path(), "ffmpeg", "echo 'ffmpeg version 7.0'");
        let cached_again = provisioner.resolve(ToolKind::Ffmpeg).await.unwrap();
        assert_eq!(cached_again.version, "ffmpeg version 6.0");

        let forced = provisioner
            .resolve_with(ToolKind::Ffmpeg, Verification::Force)
            .await
            .unwrap();
        assert_eq!(forced.source, ToolSource::Bundled);
        assert_eq!(cache.get(ToolKind::Ffmpeg).unwrap().version, "ffmpeg version 7.0");
    }

    #[tokio::test]
    async fn system_path_is_tried_first() {
        let path_dir = tempfile::tempdir().unwrap();
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_script(path_dir.path(), "ffmpeg", "echo 'ffmpeg version system'");
        write_script(bundled.path(), "ffmpeg", "echo 'ffmpeg version bundled'");
        write_script(cache_dir.path(), "ffmpeg", "echo 'ffmpeg version cached'");

        let config = ToolConfig {
            use_system_path: true,
            ..offline_config(bundled.path(), cache_dir.path())
        };
        let provisioner = ToolProvisioner::new(config, Arc::new(ToolCache::new()))
            .with_search_path(path_dir.path().as_os_str());

        assert_eq!(
            local_sources(&provisioner, ToolKind::Ffmpeg),
            [ToolSource::SystemPath, ToolSource::Bundled, ToolSource::Cache]
        );
        let handle = provisioner.resolve(ToolKind::Ffmpeg).await.unwrap();
        assert_eq!(handle.source, ToolSource::SystemPath);
        assert_eq!(handle.version, "ffmpeg version system");

        let without_path = ToolProvisioner::new(
            offline_config(bundled.path(), cache_dir.path()),
            Arc::new(ToolCache::new()),
        )
        .with_search_path(path_dir.path().as_os_str());
        assert_eq!(
            local_sources(&without_path, ToolKind::Ffmpeg),
            [ToolSource::Bundled, ToolSource::Cache]
        );
    }

    #[tokio::test]
    async fn hanging_version_probe_disqualifies_candidate() {
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_script(bundled.path(), "ffprobe", "sleep 10");
        write_script(cache_dir.path(), "ffprobe", "echo 'ffprobe version 6.1'");

        let config = ToolConfig {
            verify_timeout_secs: 1,
            ..offline_config(bundled.path(), cache_dir.path())
        };
        let provisioner = ToolProvisioner::new(config, Arc::new(ToolCache::new()));

        let started = std::time::Instant::now();
        let handle = provisioner.resolve(ToolKind::Ffprobe).await.unwrap();
        assert_eq!(handle.source, ToolSource::Cache);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn hanging_version_probe_is_reported() {
        let bundled = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_script(bundled.path(), "ffmpeg", "sleep 10");

        let config = ToolConfig {
            verify_timeout_secs: 1,
            ..offline_config(bundled.path(), cache_dir.path())
        };
        let provisioner = ToolProvisioner::new(config, Arc::new(ToolCache::new()));

        let err = provisioner.resolve(ToolKind::Ffmpeg).await.unwrap_err();
        assert!(err.to_string().contains("version probe timed out after 1s"), "{}", err);
    }
}
