//! Image blob storage
//!
//! Blobs are written in two phases. `store` writes the bytes into a staging
//! directory under a random name; `finalize` renames the staged file into the
//! blob root as `<id>.<ext>`, which becomes the permanent reference kept in
//! records. A file only ever becomes visible through a rename, so readers never
//! observe a partial write.
//!
//! Layout: "blobs/.staging/<id>" while staged, "blobs/<id>.<ext>" once final.

use crate::config::{MAX_EXTENSION_LENGTH, MAX_FILENAME_LENGTH, STAGING_DIRNAME};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A decoded upload: raw bytes plus the name the client declared
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub data: Vec<u8>,
    pub original_name: String,
}

impl Upload {
    pub fn new(data: impl Into<Vec<u8>>, original_name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            original_name: original_name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercased extension of the declared name, if it carries a usable one
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.original_name)
    }
}

/// Handle to a blob written to staging but not yet finalized
#[derive(Debug)]
pub struct StagedBlob {
    id: String,
    path: PathBuf,
    size: usize,
}

impl StagedBlob {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A blob file found on disk
#[derive(Debug, Clone)]
pub struct BlobInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Filesystem blob store
#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
    staging: PathBuf,
}

impl BlobStore {
    /// Create a new blob store at the given root directory
    pub fn new(root: PathBuf) -> Self {
        let staging = root.join(STAGING_DIRNAME);
        Self { root, staging }
    }

    /// Initialize the blob store (create directories if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.staging).await?;
        tracing::info!("Blob store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Write data into staging under a freshly generated identifier
    pub async fn store(&self, data: &[u8]) -> Result<StagedBlob> {
        let id = Uuid::new_v4().simple().to_string();
        let path = self.staging.join(&id);

        // Write to temp file first (atomic write)
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Staged blob: {} ({} bytes)", id, data.len());

        Ok(StagedBlob {
            id,
            path,
            size: data.len(),
        })
    }

    /// Move a staged blob to its permanent name and return the reference.
    ///
    /// Fails with `UnknownFileType` when `original_name` has no extension;
    /// the staged file is discarded in that case.
    pub async fn finalize(&self, staged: StagedBlob, original_name: &str) -> Result<String> {
        let Some(ext) = file_extension(original_name) else {
            self.discard_staged(&staged.id).await?;
            return Err(AppError::UnknownFileType(sanitize_filename(original_name)));
        };

        let reference = format!("{}.{}", staged.id, ext);
        fs::rename(&staged.path, self.root.join(&reference)).await?;

        tracing::debug!("Finalized blob: {} ({} bytes)", reference, staged.size);

        Ok(reference)
    }

    /// Read a finalized blob
    pub async fn read(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.path_for(reference)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("blob {}", reference)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a finalized blob exists
    pub async fn exists(&self, reference: &str) -> Result<bool> {
        let path = self.path_for(reference)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Delete a finalized blob. A missing file is reported as `NotFound`.
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let path = self.path_for(reference)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted blob: {}", reference);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("blob {}", reference)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a staged blob that will never be finalized
    pub async fn discard_staged(&self, id: &str) -> Result<()> {
        if !is_plain_name(id) {
            return Err(AppError::InvalidReference(id.to_string()));
        }
        match fs::remove_file(self.staging.join(id)).await {
            Ok(()) => {
                tracing::debug!("Discarded staged blob: {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List all finalized blobs
    pub async fn list_all(&self) -> Result<Vec<BlobInfo>> {
        scan_files(&self.root).await
    }

    /// List blobs still sitting in staging (including abandoned temp files)
    pub async fn list_staged(&self) -> Result<Vec<BlobInfo>> {
        scan_files(&self.staging).await
    }

    /// Get blob store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, reference: &str) -> Result<PathBuf> {
        if !is_plain_name(reference) {
            return Err(AppError::InvalidReference(format!(
                "blob reference {:?}",
                reference
            )));
        }
        Ok(self.root.join(reference))
    }
}

/// Files directly inside `dir`; subdirectories are skipped
async fn scan_files(dir: &Path) -> Result<Vec<BlobInfo>> {
    let mut blobs = Vec::new();

    if !fs::try_exists(dir).await? {
        return Ok(blobs);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        blobs.push(BlobInfo {
            name,
            size: metadata.len(),
            modified,
        });
    }

    Ok(blobs)
}

/// A single path component with no traversal
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Remove path separators and null bytes, limit length
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| *c != '/' && *c != '\\' && *c != '\0')
        .take(MAX_FILENAME_LENGTH)
        .collect()
}

/// Extension of the last path component, lowercased.
///
/// Dotfiles ("`.png`") and names ending in a dot have no extension. Only
/// short ASCII alphanumeric extensions are accepted.
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let ext = Path::new(name).extension()?.to_str()?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LENGTH
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}
