//! SHA-256 checks for downloaded archives and cached binaries.
//!
//! Archives are compared with the digest their publisher lists before they
//! are unpacked. Every binary written by the downloader gets a sibling
//! `<name>.sha256` file. A cached binary whose digest no longer matches is
//! treated as corrupt and removed before it is ever executed.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Returns the manifest path for a binary.
pub fn manifest_path(binary: &Path) -> PathBuf {
    let mut name = binary.as_os_str().to_os_string();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Computes the hex SHA-256 digest of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Records the digest of a freshly installed binary.
pub fn write_manifest(binary: &Path) -> io::Result<String> {
    let digest = sha256_file(binary)?;
    std::fs::write(manifest_path(binary), format!("{}\n", digest))?;
    debug!(path = %binary.display(), sha256 = %digest, "Wrote integrity manifest");
    Ok(digest)
}

/// Outcome of checking a cached binary against its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestCheck {
    /// Digest matches the recorded one.
    Match,
    /// No manifest exists; the binary was placed there by hand.
    Unrecorded,
    /// Digest differs from the recorded one.
    Mismatch { expected: String, actual: String },
}

/// Compares a binary with its recorded digest.
pub fn check_manifest(binary: &Path) -> io::Result<ManifestCheck> {
    match std::fs::read_to_string(manifest_path(binary)) {
        Ok(content) => check_digest(binary, &content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ManifestCheck::Unrecorded),
        Err(e) => Err(e),
    }
}

/// Compares a file with an expected hex digest.
pub fn check_digest(path: &Path, expected: &str) -> io::Result<ManifestCheck> {
    let expected = expected.trim().to_lowercase();
    let actual = sha256_file(path)?;
    if actual == expected {
        Ok(ManifestCheck::Match)
    } else {
        Ok(ManifestCheck::Mismatch { expected, actual })
    }
}

/// Finds the digest for `asset` in a `sha256sum`-style listing.
///
/// Lines look like `<hex>  <name>` or `<hex> *<name>`; blank lines and
/// `#` comments are skipped.
pub fn published_digest(listing: &str, asset: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let name = parts.next_back()?.trim_start_matches('*').trim_start_matches("./");
        let is_hex = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit());
        (is_hex && name.eq_ignore_ascii_case(asset)).then(|| hash.to_ascii_lowercase())
    })
}

/// Removes a corrupt binary and its manifest.
pub fn discard(binary: &Path) {
    for path in [binary.to_path_buf(), manifest_path(binary)] {
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove corrupt cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn manifest_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffprobe");
        std::fs::write(&path, b"original").unwrap();

        assert_eq!(check_manifest(&path).unwrap(), ManifestCheck::Unrecorded);

        write_manifest(&path).unwrap();
        assert_eq!(check_manifest(&path).unwrap(), ManifestCheck::Match);

        std::fs::write(&path, b"tampered").unwrap();
        assert!(matches!(
            check_manifest(&path).unwrap(),
            ManifestCheck::Mismatch { .. }
        ));

        discard(&path);
        assert!(!path.exists());
        assert!(!manifest_path(&path).exists());
    }

    #[test]
    fn published_listing_lookup() {
        let win64 = "a".repeat(64);
        let arm64 = "B".repeat(64);
        let listing = format!(
            "# BtbN builds\n\n{}  ffmpeg-master-latest-win64-gpl.zip\n{} *ffmpeg-master-latest-winarm64-gpl.zip\nnot-a-hash  ffmpeg-n7.1-latest-win64-gpl-7.1.zip\n",
            win64, arm64
        );

        assert_eq!(
            published_digest(&listing, "ffmpeg-master-latest-win64-gpl.zip"),
            Some(win64)
        );
        assert_eq!(
            published_digest(&listing, "ffmpeg-master-latest-winarm64-gpl.zip"),
            Some("b".repeat(64))
        );
        assert_eq!(published_digest(&listing, "ffmpeg-n7.1-latest-win64-gpl-7.1.zip"), None);
        assert_eq!(published_digest(&listing, "missing.zip"), None);
    }
}
