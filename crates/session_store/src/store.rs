use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::snapshot::{StoreSnapshot, STORE_VERSION};

/// Snapshot store rooted at one file path.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates the snapshot. Returns `None` when no snapshot has
    /// been written yet.
    pub fn load(&self) -> Result<Option<StoreSnapshot>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::io("reading snapshot", &self.path, source)),
        };

        let mut snapshot: StoreSnapshot = serde_json::from_str(&raw)
            .map_err(|source| StoreError::json_parse(&self.path, source))?;
        self.validate(&snapshot)?;

        snapshot.seal_streaming();
        snapshot.reconcile();
        Ok(Some(snapshot))
    }

    /// Writes the snapshot atomically: serialize to a sibling temp file,
    /// then rename over the target.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let mut sealed = snapshot.clone();
        sealed.seal_streaming();
        sealed.reconcile();

        let serialized = serde_json::to_string_pretty(&sealed)
            .map_err(|source| StoreError::json_serialize(&self.path, source))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|source| StoreError::io("creating snapshot dir", parent, source))?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, serialized)
            .map_err(|source| StoreError::io("writing snapshot", &temp_path, source))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|source| StoreError::io("replacing snapshot", &self.path, source))?;

        Ok(())
    }

    fn validate(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        if snapshot.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                found: snapshot.version,
                expected: STORE_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for session in &snapshot.sessions {
            if session.id.trim().is_empty() {
                return Err(StoreError::EmptySessionId {
                    path: self.path.clone(),
                });
            }
            if !seen.insert(session.id.as_str()) {
                return Err(StoreError::DuplicateSessionId {
                    path: self.path.clone(),
                    id: session.id.clone(),
                });
            }
            if OffsetDateTime::parse(&session.created_at, &Rfc3339).is_err() {
                return Err(StoreError::InvalidTimestamp {
                    path: self.path.clone(),
                    session_id: session.id.clone(),
                    value: session.created_at.clone(),
                });
            }
        }

        Ok(())
    }
}
