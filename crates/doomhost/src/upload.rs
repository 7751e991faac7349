//! Receiving wad, iwad and cfg files over a control connection.
//!
//! The file body follows the request frame on the same connection and
//! ends at the first NUL byte. It is written to a timestamp-suffixed
//! temporary file in the destination directory and renamed into place
//! once the terminator arrives, so a half-received upload is never
//! visible under its real name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use doomhost_instance::is_plain_file_name;
use doomhost_transport::{ControlConnection, TransportError};
use serde_json::{Map, Value};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::DirectorySettings;

/// How long to wait for each chunk of file data.
pub const UPLOAD_READ_TIMEOUT: Duration = Duration::from_secs(15);

const CHUNK_SIZE: usize = 8192;
const TERMINATOR: u8 = 0;

/// Which directory an upload goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Wad,
    Iwad,
    Cfg,
}

impl FileCategory {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "wad" => Some(Self::Wad),
            "iwad" => Some(Self::Iwad),
            "cfg" => Some(Self::Cfg),
            _ => None,
        }
    }

    /// Lowercase extensions accepted for this category.
    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Wad => &["wad", "pk3", "pk7"],
            Self::Iwad => &["wad", "pk3"],
            Self::Cfg => &["cfg", "txt"],
        }
    }

    /// Case-insensitive extension check.
    pub fn accepts(self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions().contains(&ext.as_str())
            })
    }

    pub fn directory(self, dirs: &DirectorySettings) -> &Path {
        match self {
            Self::Wad => &dirs.wad,
            Self::Iwad => &dirs.iwad,
            Self::Cfg => &dirs.cfg,
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wad => write!(f, "wad"),
            Self::Iwad => write!(f, "iwad"),
            Self::Cfg => write!(f, "cfg"),
        }
    }
}

/// Why an upload was refused or aborted. The display text is sent back to
/// the client.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Missing or invalid file name.")]
    InvalidName,

    #[error("Unknown upload type '{0}'.")]
    InvalidType(String),

    #[error("File {name} is not an allowed {category} file.")]
    ExtensionNotAllowed { name: String, category: FileCategory },

    #[error("File {0} already exists.")]
    AlreadyExists(String),

    #[error("Upload exceeds the {max} byte limit.")]
    TooLarge { max: u64 },

    #[error("Connection closed before the upload finished.")]
    Truncated,

    #[error("Upload timed out.")]
    Timeout,

    #[error("Failed to store upload.")]
    Io(#[from] std::io::Error),

    #[error("Failed to receive upload.")]
    Transport(#[from] TransportError),
}

/// A validated upload target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub name: String,
    pub category: FileCategory,
}

impl UploadTarget {
    /// Reads `name` and `type` from the request fields.
    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, UploadError> {
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| is_plain_file_name(name))
            .ok_or(UploadError::InvalidName)?;

        let type_name = fields.get("type").and_then(Value::as_str).unwrap_or_default();
        let category =
            FileCategory::from_name(type_name).ok_or_else(|| UploadError::InvalidType(type_name.to_string()))?;

        if !category.accepts(name) {
            return Err(UploadError::ExtensionNotAllowed {
                name: name.to_string(),
                category,
            });
        }
        Ok(Self {
            name: name.to_string(),
            category,
        })
    }

    pub fn destination(&self, dirs: &DirectorySettings) -> PathBuf {
        self.category.directory(dirs).join(&self.name)
    }

    fn temporary(&self, dirs: &DirectorySettings) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        self.category
            .directory(dirs)
            .join(format!(".{}.{stamp}.part", self.name))
    }
}

/// Removes the temporary file unless the upload was committed.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "failed to remove partial upload");
            }
        }
    }
}

/// Receives one upload. `initial` holds the bytes that arrived with the
/// request frame.
///
/// Returns the final path of the stored file.
pub async fn receive_upload(
    conn: &mut ControlConnection,
    target: &UploadTarget,
    initial: Vec<u8>,
    dirs: &DirectorySettings,
    max_bytes: u64,
) -> Result<PathBuf, UploadError> {
    let destination = target.destination(dirs);
    if fs::try_exists(&destination).await? {
        return Err(UploadError::AlreadyExists(target.name.clone()));
    }

    let temporary = target.temporary(dirs);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temporary)
        .await?;
    let mut partial = PartialFile {
        path: temporary,
        committed: false,
    };

    let written = stream_until_terminator(conn, file, initial, max_bytes).await?;

    if fs::try_exists(&destination).await? {
        return Err(UploadError::AlreadyExists(target.name.clone()));
    }
    fs::rename(&partial.path, &destination).await?;
    partial.committed = true;

    info!(
        file = %target.name,
        category = %target.category,
        bytes = written,
        "upload stored"
    );
    Ok(destination)
}

async fn stream_until_terminator(
    conn: &mut ControlConnection,
    mut file: File,
    initial: Vec<u8>,
    max_bytes: u64,
) -> Result<u64, UploadError> {
    let mut pending = initial;
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        let end = pending.iter().position(|&b| b == TERMINATOR);
        let data = &pending[..end.unwrap_or(pending.len())];

        written += data.len() as u64;
        if written > max_bytes {
            warn!(peer = %conn.peer(), max_bytes, "upload over size limit, aborting");
            return Err(UploadError::TooLarge { max: max_bytes });
        }
        file.write_all(data).await?;

        if end.is_some() {
            break;
        }

        let n = match tokio::time::timeout(UPLOAD_READ_TIMEOUT, conn.read_chunk(&mut chunk)).await {
            Ok(result) => result?,
            Err(_) => return Err(UploadError::Timeout),
        };
        if n == 0 {
            return Err(UploadError::Truncated);
        }
        pending.clear();
        pending.extend_from_slice(&chunk[..n]);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
