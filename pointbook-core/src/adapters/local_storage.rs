//! Local filesystem image storage
//!
//! Photos are content-addressed: the file name is the SHA-256 of the bytes,
//! so re-uploading the same photo is a no-op and returns the same URL.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::ports::ImageStorage;

/// Best guess at an image MIME type from its magic bytes
pub fn sniff_content_type(image: &[u8]) -> &'static str {
    if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if image.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if image.len() >= 12 && &image[..4] == b"RIFF" && &image[8..12] == b"WEBP" {
        "image/webp"
    } else if image.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Stores photos as files under one directory and hands out `file://` URLs
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    dir: PathBuf,
}

impl LocalImageStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn absolute_dir(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::StorageUploadFailed(format!("Cannot create {}: {}", self.dir.display(), e))
        })?;
        self.dir.canonicalize().map_err(|e| {
            Error::StorageUploadFailed(format!("Cannot resolve {}: {}", self.dir.display(), e))
        })
    }
}

impl ImageStorage for LocalImageStorage {
    fn upload(&self, image: &[u8], content_type: &str) -> Result<String> {
        if image.is_empty() {
            return Err(Error::StorageUploadFailed("Image is empty".to_string()));
        }

        let dir = self.absolute_dir()?;
        let digest = hex::encode(Sha256::digest(image));
        let path = dir.join(format!("{}.{}", digest, extension_for(content_type)));

        if !path.exists() {
            // Write-then-rename so a crash never leaves a truncated photo behind
            let mut tmp = NamedTempFile::new_in(&dir)
                .map_err(|e| Error::StorageUploadFailed(e.to_string()))?;
            tmp.write_all(image)
                .and_then(|_| tmp.flush())
                .map_err(|e| Error::StorageUploadFailed(e.to_string()))?;
            tmp.persist(&path)
                .map_err(|e| Error::StorageUploadFailed(e.error.to_string()))?;
            tracing::debug!(path = %path.display(), bytes = image.len(), "stored image");
        }

        Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| Error::StorageUploadFailed(format!("Not an absolute path: {}", path.display())))
    }
}
