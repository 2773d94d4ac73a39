//! Fetching and unpacking published static ffmpeg builds.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::ToolError;

use super::integrity::{self, ManifestCheck};
use super::ToolKind;

/// Container format of a published build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarXz,
}

impl ArchiveKind {
    /// File name used for the staged archive.
    pub fn staging_name(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "archive.zip",
            ArchiveKind::TarXz => "archive.tar.xz",
        }
    }
}

/// A published archive and the binaries it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSource {
    pub url: &'static str,
    pub archive: ArchiveKind,
    pub provides: &'static [ToolKind],
    /// `sha256sum`-style listing covering the archive, if the publisher has one.
    pub checksum_url: Option<&'static str>,
}

impl DownloadSource {
    /// Archive file name as it appears in the publisher's checksum listing.
    pub fn asset_name(&self) -> &'static str {
        self.url.rsplit('/').next().unwrap_or(self.url)
    }
}

const BOTH: &[ToolKind] = &[ToolKind::Ffmpeg, ToolKind::Ffprobe];
const BTBN_CHECKSUMS: &str =
    "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/checksums.sha256";

/// Picks the archive that provides `kind` on the given platform.
///
/// `os` and `arch` take the values of `std::env::consts::{OS, ARCH}`.
pub fn source_for(kind: ToolKind, os: &str, arch: &str) -> Result<DownloadSource, ToolError> {
    let unsupported = || ToolError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let source = match (os, arch) {
        ("windows", "x86_64") => DownloadSource {
            url: "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-win64-gpl.zip",
            archive: ArchiveKind::Zip,
            provides: BOTH,
            checksum_url: Some(BTBN_CHECKSUMS),
        },
        ("windows", "aarch64") => DownloadSource {
            url: "https://github.com/BtbN/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-winarm64-gpl.zip",
            archive: ArchiveKind::Zip,
            provides: BOTH,
            checksum_url: Some(BTBN_CHECKSUMS),
        },
        ("macos", _) => match kind {
            ToolKind::Ffmpeg => DownloadSource {
                url: "https://evermeet.cx/ffmpeg/getrelease/zip",
                archive: ArchiveKind::Zip,
                provides: &[ToolKind::Ffmpeg],
                checksum_url: None,
            },
            ToolKind::Ffprobe => DownloadSource {
                url: "https://evermeet.cx/ffmpeg/getrelease/ffprobe/zip",
                archive: ArchiveKind::Zip,
                provides: &[ToolKind::Ffprobe],
                checksum_url: None,
            },
        },
        ("linux", "x86_64") => DownloadSource {
            url: "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz",
            archive: ArchiveKind::TarXz,
            provides: BOTH,
            checksum_url: None,
        },
        ("linux", "aarch64") => DownloadSource {
            url: "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-arm64-static.tar.xz",
            archive: ArchiveKind::TarXz,
            provides: BOTH,
            checksum_url: None,
        },
        ("linux", "arm") => DownloadSource {
            url: "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-armhf-static.tar.xz",
            archive: ArchiveKind::TarXz,
            provides: BOTH,
            checksum_url: None,
        },
        _ => return Err(unsupported()),
    };

    Ok(source)
}

fn client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Fetches the digest the publisher lists for `source`.
///
/// Returns `None` when the publisher has no checksum listing. A listing
/// that cannot be fetched, or that does not mention the archive, is an error.
pub async fn published_sha256(
    source: &DownloadSource,
    timeout: Duration,
) -> Result<Option<String>, ToolError> {
    let Some(checksum_url) = source.checksum_url else {
        return Ok(None);
    };
    let download_err = |message: String| ToolError::Download {
        url: checksum_url.to_string(),
        message,
    };

    let listing = client(timeout)
        .map_err(|e| download_err(e.to_string()))?
        .get(checksum_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| download_err(e.to_string()))?
        .text()
        .await
        .map_err(|e| download_err(e.to_string()))?;

    integrity::published_digest(&listing, source.asset_name())
        .map(Some)
        .ok_or_else(|| download_err(format!("no checksum listed for {}", source.asset_name())))
}

/// Checks a fetched archive against its published digest.
pub fn verify_archive(
    archive: &Path,
    source: &DownloadSource,
    expected: &str,
) -> Result<(), ToolError> {
    let check = integrity::check_digest(archive, expected).map_err(|e| ToolError::Download {
        url: source.url.to_string(),
        message: format!("cannot hash '{}': {}", archive.display(), e),
    })?;

    match check {
        ManifestCheck::Mismatch { expected, actual } => Err(ToolError::Download {
            url: source.url.to_string(),
            message: format!("checksum mismatch: expected {}, got {}", expected, actual),
        }),
        _ => {
            debug!(archive = %archive.display(), sha256 = %expected, "Archive checksum verified");
            Ok(())
        }
    }
}

/// Streams `url` to `dest`, returning the number of bytes written.
pub async fn fetch(url: &str, dest: &Path, timeout: Duration) -> Result<u64, ToolError> {
    let download_err = |message: String| ToolError::Download {
        url: url.to_string(),
        message,
    };

    let client = client(timeout).map_err(|e| download_err(e.to_string()))?;

    info!(url = %url, "Downloading static ffmpeg build");

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| download_err(e.to_string()))?;

    let total_bytes = response.content_length();
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| download_err(format!("cannot create '{}': {}", dest.display(), e)))?;

    let mut downloaded: u64 = 0;
    let mut last_report = Instant::now();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| download_err(e.to_string()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| download_err(format!("write failed: {}", e)))?;
        downloaded += chunk.len() as u64;

        if last_report.elapsed() >= Duration::from_secs(2) {
            last_report = Instant::now();
            debug!(downloaded, total = ?total_bytes, "Download progress");
        }
    }
    file.flush()
        .await
        .map_err(|e| download_err(format!("flush failed: {}", e)))?;

    if downloaded == 0 {
        return Err(download_err("server returned an empty body".to_string()));
    }

    info!(url = %url, bytes = downloaded, "Download complete");
    Ok(downloaded)
}

/// Extracts the wanted binaries from an archive into `dest_dir`.
///
/// Entries are matched on their final path component, so the nested
/// `ffmpeg-*/bin/ffmpeg.exe` layouts of the published builds are flattened.
/// Each wanted tool must be present.
pub fn unpack(
    archive: &Path,
    kind: ArchiveKind,
    wanted: &[ToolKind],
    dest_dir: &Path,
) -> Result<Vec<(ToolKind, PathBuf)>, ToolError> {
    let unpack_err = |message: String| ToolError::Unpack {
        archive: archive.to_path_buf(),
        message,
    };

    let found = match kind {
        ArchiveKind::Zip => unpack_zip(archive, wanted, dest_dir),
        ArchiveKind::TarXz => unpack_tar_xz(archive, wanted, dest_dir),
    }
    .map_err(|e| unpack_err(e.to_string()))?;

    for tool in wanted {
        if !found.iter().any(|(k, _)| k == tool) {
            return Err(unpack_err(format!("archive does not contain {}", tool)));
        }
    }

    Ok(found)
}

/// Maps an archive entry name to the tool it provides, if any.
fn wanted_tool(entry: &Path, wanted: &[ToolKind]) -> Option<ToolKind> {
    let name = entry.file_name()?.to_str()?.to_lowercase();
    wanted.iter().copied().find(|tool| {
        name == tool.command_name() || name == format!("{}.exe", tool.command_name())
    })
}

fn unpack_zip(
    archive: &Path,
    wanted: &[ToolKind],
    dest_dir: &Path,
) -> io::Result<Vec<(ToolKind, PathBuf)>> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    let mut found = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(io::Error::other)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let Some(tool) = wanted_tool(&name, wanted) else {
            continue;
        };
        if found.iter().any(|(k, _)| *k == tool) {
            continue;
        }

        let target = dest_dir.join(tool.file_name());
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        debug!(entry = %name.display(), target = %target.display(), "Unpacked binary");
        found.push((tool, target));
    }

    Ok(found)
}

fn unpack_tar_xz(
    archive: &Path,
    wanted: &[ToolKind],
    dest_dir: &Path,
) -> io::Result<Vec<(ToolKind, PathBuf)>> {
    let file = File::open(archive)?;
    let decoder = xz2::read::XzDecoder::new(file);
    let mut tarball = tar::Archive::new(decoder);
    let mut found = Vec::new();

    for entry in tarball.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.into_owned();
        let Some(tool) = wanted_tool(&name, wanted) else {
            continue;
        };
        if found.iter().any(|(k, _)| *k == tool) {
            continue;
        }

        let target = dest_dir.join(tool.file_name());
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        debug!(entry = %name.display(), target = %target.display(), "Unpacked binary");
        found.push((tool, target));
    }

    Ok(found)
}
