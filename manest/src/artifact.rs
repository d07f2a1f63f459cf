//! Framed binary artifacts.
//!
//! Layout: `magic (4 bytes) | version (u32 LE) | bincode payload`.
//!
//! Writes land in a temporary file next to the destination and are renamed
//! over it only after the payload is fully flushed, so an interrupted save
//! leaves the previous artifact intact.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{ManestError, Result};

pub const FORMAT_VERSION: u32 = 1;

/// Which artifact a file claims to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Reservoir topology, physics, state and vocabulary (`.nawa`).
    Brain,
    /// Readout weights.
    Readout,
}

impl ArtifactKind {
    pub fn magic(self) -> [u8; 4] {
        match self {
            Self::Brain => *b"NAWA",
            Self::Readout => *b"RDOT",
        }
    }
}

/// Serialize `payload` and atomically replace `path` with it.
pub fn write_artifact<T: Serialize>(path: &Path, kind: ArtifactKind, payload: &T) -> Result<()> {
    stage_artifact(path, kind, payload)?.commit()
}

/// A fully written artifact waiting in a temporary file beside its destination.
///
/// Dropping it without [`commit`](Self::commit) removes the temporary file and
/// leaves the destination untouched.
pub struct StagedArtifact {
    tmp: NamedTempFile,
    path: PathBuf,
    kind: ArtifactKind,
}

impl StagedArtifact {
    /// Rename the staged file over its destination.
    pub fn commit(self) -> Result<()> {
        let Self { tmp, path, kind } = self;
        tmp.persist(&path).map_err(|e| ManestError::Io(e.error))?;
        debug!(path = %path.display(), ?kind, "artifact written");
        Ok(())
    }
}

/// Serialize `payload` into a temporary file next to `path` without touching `path`.
pub fn stage_artifact<T: Serialize>(path: &Path, kind: ArtifactKind, payload: &T) -> Result<StagedArtifact> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        writer.write_all(&kind.magic())?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, payload)
            .map_err(|e| ManestError::InvalidInput(format!("failed to encode {kind:?}: {e}")))?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    Ok(StagedArtifact { tmp, path: path.to_path_buf(), kind })
}

/// Read and decode an artifact, rejecting anything that is not a complete,
/// current-version frame of the requested kind.
pub fn read_artifact<T: DeserializeOwned>(path: &Path, kind: ArtifactKind) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ManestError::corrupt(path, "file not found")
        } else {
            ManestError::Io(e)
        }
    })?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| ManestError::corrupt(path, "truncated header"))?;
    if magic != kind.magic() {
        return Err(ManestError::corrupt(
            path,
            format!("bad magic {:?}, expected {:?}", magic, kind.magic()),
        ));
    }

    let mut version = [0u8; 4];
    reader
        .read_exact(&mut version)
        .map_err(|_| ManestError::corrupt(path, "truncated header"))?;
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(ManestError::corrupt(
            path,
            format!("unsupported format version {version}, expected {FORMAT_VERSION}"),
        ));
    }

    let payload: T = bincode::deserialize_from(&mut reader)
        .map_err(|e| ManestError::corrupt(path, format!("undecodable payload: {e}")))?;

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(ManestError::corrupt(path, "trailing bytes after payload"));
    }

    debug!(path = %path.display(), ?kind, "artifact read");
    Ok(payload)
}
