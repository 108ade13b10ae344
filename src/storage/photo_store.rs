use crate::common::{AttendanceError, Result};
use crate::storage::crypto;
use crate::storage::key_store::KeyStore;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zeroize::Zeroize;

const PHOTO_EXTENSION: &str = "jpg";

/// Rejects keys that could escape the photo directory or clash with temp files.
pub fn validate_identity(identity: &str) -> Result<()> {
    let invalid = identity.is_empty()
        || identity == "."
        || identity == ".."
        || identity.starts_with('.')
        || identity.contains(['/', '\\', '\0']);

    if invalid {
        return Err(AttendanceError::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}

/// One encrypted reference JPEG per enrolled identity.
pub struct PhotoStore {
    photo_dir: PathBuf,
    keys: Arc<dyn KeyStore>,
    jpeg_quality: u8,
}

impl PhotoStore {
    pub fn new(photo_dir: PathBuf, keys: Arc<dyn KeyStore>, jpeg_quality: u8) -> Result<Self> {
        fs::create_dir_all(&photo_dir)?;
        Ok(Self {
            photo_dir,
            keys,
            jpeg_quality,
        })
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    fn file_name(identity: &str) -> String {
        format!("{}.{}", identity, PHOTO_EXTENSION)
    }

    pub fn photo_path(&self, identity: &str) -> Result<PathBuf> {
        validate_identity(identity)?;
        Ok(self.photo_dir.join(Self::file_name(identity)))
    }

    pub fn exists(&self, identity: &str) -> Result<bool> {
        Ok(self.photo_path(identity)?.exists())
    }

    /// Encodes `image` as JPEG, encrypts it and replaces any previous photo.
    pub fn save(&self, identity: &str, image: &DynamicImage) -> Result<()> {
        let path = self.photo_path(identity)?;
        let file_name = Self::file_name(identity);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .encode_image(&image.to_rgb8())?;

        let key = self.keys.master_key()?;
        let sealed = crypto::encrypt(&key, file_name.as_bytes(), &jpeg);
        jpeg.zeroize();
        let sealed = sealed?;

        // Unique temp file per save; concurrent saves for one identity each
        // rename a complete file into place.
        let written = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&self.photo_dir)
            .and_then(|mut temp| {
                temp.write_all(&sealed)?;
                temp.as_file().sync_all()?;
                Ok(temp)
            })
            .and_then(|temp| temp.persist(&path).map(|_| ()).map_err(|e| e.error));

        if let Err(e) = written {
            return Err(AttendanceError::Storage(format!(
                "Failed to write photo for {}: {}", identity, e
            )));
        }

        tracing::debug!("Stored encrypted photo for {} at {:?}", identity, path);
        Ok(())
    }

    /// `Ok(None)` when nothing is stored for `identity`.
    pub fn load(&self, identity: &str) -> Result<Option<DynamicImage>> {
        let path = self.photo_path(identity)?;
        if !path.exists() {
            return Ok(None);
        }

        let sealed = fs::read(&path)?;
        let key = self.keys.master_key()?;
        let jpeg = crypto::decrypt(&key, Self::file_name(identity).as_bytes(), &sealed)?;

        let image = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map_err(|e| AttendanceError::Storage(format!(
                "Failed to decode photo for {}: {}", identity, e
            )))?;
        Ok(Some(image))
    }

    pub fn delete(&self, identity: &str) -> Result<bool> {
        let path = self.photo_path(identity)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    /// Identities with a stored photo, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut identities = Vec::new();
        for entry in fs::read_dir(&self.photo_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(identity) = name.strip_suffix(".jpg") {
                if validate_identity(identity).is_ok() {
                    identities.push(identity.to_string());
                }
            }
        }
        identities.sort();
        Ok(identities)
    }
}
