//! On-Disk Analysis Cache
//!
//! Caches analysis artifacts as JSON under a per-source directory:
//!
//! ```text
//! <root>/<source_id>/<stem_role>.json         feature set + waveform
//! <root>/<source_id>/<stem_role>.events.json  transient/chroma events
//! ```
//!
//! Feature writes are first-write-wins: a second `put` for the same
//! (source, stem) fails with [`CoreError::AlreadyExists`] and the caller
//! refreshes with an explicit `delete` followed by `put`. Event records are
//! versioned and upserted; a version mismatch on read is a miss.
//!
//! Identities with the `guest_` prefix are ephemeral and never touch disk.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::features::AnalysisRecord;
use crate::mapping::AudioEventData;

const GUEST_PREFIX: &str = "guest_";

/// Versioned event record stored alongside the feature artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub analysis_version: String,
    pub data: AudioEventData,
}

/// Filesystem-backed cache of analysis artifacts
pub struct AnalysisCache {
    root: PathBuf,
}

impl AnalysisCache {
    /// Open a cache rooted at the given directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open the cache in the platform's per-user cache directory
    pub fn open_default() -> CoreResult<Self> {
        let dirs = ProjectDirs::from("com", "lumen", "lumen").ok_or_else(|| {
            CoreError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                "no home directory available",
            ))
        })?;
        Self::new(dirs.cache_dir().join("analysis"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an analysis record. Guest identities are skipped silently;
    /// an existing record for the same (source, stem) is an error.
    pub fn put(&self, user_id: &str, record: &AnalysisRecord) -> CoreResult<()> {
        if is_guest(user_id) {
            debug!(user_id, "skipping cache write for guest identity");
            return Ok(());
        }
        let path = self.feature_path(&record.features.source_id, &record.features.stem_role)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    CoreError::AlreadyExists {
                        source_id: record.features.source_id.clone(),
                        stem_role: record.features.stem_role.clone(),
                    }
                } else {
                    CoreError::Io(e)
                }
            })?;
        serde_json::to_writer_pretty(file, record)?;

        info!(
            source_id = %record.features.source_id,
            stem_role = %record.features.stem_role,
            "cached analysis record"
        );
        Ok(())
    }

    /// Fetch a cached record; `None` on miss. Guest reads always miss.
    pub fn get(
        &self,
        user_id: &str,
        source_id: &str,
        stem_role: &str,
    ) -> CoreResult<Option<AnalysisRecord>> {
        if is_guest(user_id) {
            return Ok(None);
        }
        let path = self.feature_path(source_id, stem_role)?;
        read_json(&path)
    }

    /// Fetch cached records for several sources in one call, as used by
    /// multi-file browser screens. With a stem role, one lookup per source;
    /// without, every cached stem of each source. Misses are omitted.
    pub fn get_batch(
        &self,
        user_id: &str,
        source_ids: &[&str],
        stem_role: Option<&str>,
    ) -> CoreResult<Vec<AnalysisRecord>> {
        let mut records = Vec::new();
        for source_id in source_ids {
            match stem_role {
                Some(role) => {
                    if let Some(record) = self.get(user_id, source_id, role)? {
                        records.push(record);
                    }
                }
                None => {
                    for role in self.stem_roles(source_id)? {
                        if let Some(record) = self.get(user_id, source_id, &role)? {
                            records.push(record);
                        }
                    }
                }
            }
        }
        Ok(records)
    }

    /// Stem roles with a cached feature record for one source, sorted
    fn stem_roles(&self, source_id: &str) -> CoreResult<Vec<String>> {
        sanitize_component("source_id", source_id)?;
        let dir = self.root.join(source_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::Io(e)),
        };

        let mut roles = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(role) = name.strip_suffix(".json") {
                if role.ends_with(".events") {
                    continue;
                }
                roles.push(role.to_string());
            }
        }
        roles.sort();
        Ok(roles)
    }

    /// Delete a cached record and its event data.
    ///
    /// Missing feature record is [`CoreError::NotFound`]; a missing event
    /// file alongside an existing feature record is fine.
    pub fn delete(&self, user_id: &str, source_id: &str, stem_role: &str) -> CoreResult<()> {
        if is_guest(user_id) {
            debug!(user_id, "skipping cache delete for guest identity");
            return Ok(());
        }
        let path = self.feature_path(source_id, stem_role)?;
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CoreError::NotFound(format!("analysis for '{source_id}' stem '{stem_role}'"))
            } else {
                CoreError::Io(e)
            }
        })?;

        let events = self.event_path(source_id, stem_role)?;
        match fs::remove_file(&events) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::Io(e)),
        }
        info!(source_id, stem_role, "deleted cached analysis");
        Ok(())
    }

    /// Replace any existing record: delete (ignoring a miss) then put
    pub fn refresh(&self, user_id: &str, record: &AnalysisRecord) -> CoreResult<()> {
        match self.delete(
            user_id,
            &record.features.source_id,
            &record.features.stem_role,
        ) {
            Ok(()) => {}
            Err(CoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.put(user_id, record)
    }

    /// Store event data, replacing any previous record for the stem
    pub fn put_events(
        &self,
        user_id: &str,
        source_id: &str,
        stem_role: &str,
        record: &EventRecord,
    ) -> CoreResult<()> {
        if is_guest(user_id) {
            debug!(user_id, "skipping event cache write for guest identity");
            return Ok(());
        }
        let path = self.event_path(source_id, stem_role)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, record)?;
        debug!(source_id, stem_role, "cached event record");
        Ok(())
    }

    /// Fetch cached events for the expected analysis version.
    ///
    /// A record written under a different version is a miss, not an error.
    pub fn get_events(
        &self,
        user_id: &str,
        source_id: &str,
        stem_role: &str,
        analysis_version: &str,
    ) -> CoreResult<Option<EventRecord>> {
        if is_guest(user_id) {
            return Ok(None);
        }
        let path = self.event_path(source_id, stem_role)?;
        let record: Option<EventRecord> = read_json(&path)?;
        match record {
            Some(r) if r.analysis_version == analysis_version => Ok(Some(r)),
            Some(r) => {
                debug!(
                    source_id,
                    stem_role,
                    cached = %r.analysis_version,
                    expected = %analysis_version,
                    "event record version mismatch, treating as miss"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn feature_path(&self, source_id: &str, stem_role: &str) -> CoreResult<PathBuf> {
        let (source_id, stem_role) = sanitize(source_id, stem_role)?;
        Ok(self.root.join(source_id).join(format!("{stem_role}.json")))
    }

    fn event_path(&self, source_id: &str, stem_role: &str) -> CoreResult<PathBuf> {
        let (source_id, stem_role) = sanitize(source_id, stem_role)?;
        Ok(self
            .root
            .join(source_id)
            .join(format!("{stem_role}.events.json")))
    }
}

/// Reject identifiers that could escape the cache root
fn sanitize<'a>(source_id: &'a str, stem_role: &'a str) -> CoreResult<(&'a str, &'a str)> {
    sanitize_component("source_id", source_id)?;
    sanitize_component("stem_role", stem_role)?;
    Ok((source_id, stem_role))
}

fn sanitize_component(name: &str, value: &str) -> CoreResult<()> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.contains('\0')
    {
        return Err(CoreError::Validation(format!(
            "{name} '{value}' is not a valid cache key"
        )));
    }
    Ok(())
}

fn is_guest(user_id: &str) -> bool {
    user_id.starts_with(GUEST_PREFIX)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> CoreResult<Option<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::Io(e)),
    };
    Ok(Some(serde_json::from_reader(file)?))
}
