//! Directory-backed resolution store
//!
//! One `<fingerprint>.json` file per record. Writes land in a uniquely named
//! temp file in the same directory and are renamed into place, so a reader
//! sees either the old entry, the new entry, or nothing.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::record::ResolutionRecord;
use crate::error::{DepcacheError, DepcacheResult};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const ENTRY_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Summary of the entries in a store
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Fingerprint-keyed cache of resolution records
#[derive(Debug, Clone)]
pub struct ResolutionStore {
    dir: PathBuf,
}

impl ResolutionStore {
    /// Open a store, creating the directory if absent
    ///
    /// Fails with `Storage` if the path exists but is not a directory, or if
    /// the directory cannot be written.
    pub async fn open(dir: impl Into<PathBuf>) -> DepcacheResult<Self> {
        let dir = dir.into();

        match fs::metadata(&dir).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(DepcacheError::storage(&dir, "path exists but is not a directory"));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| DepcacheError::storage(&dir, format!("cannot create: {}", e)))?;
                debug!("Created cache directory {}", dir.display());
            }
            Err(e) => return Err(DepcacheError::storage(&dir, e.to_string())),
        }

        let write_check = dir.join(format!(".writable-{}.{}", Uuid::new_v4(), TEMP_EXT));
        fs::write(&write_check, b"")
            .await
            .map_err(|e| DepcacheError::storage(&dir, format!("not writable: {}", e)))?;
        let _ = fs::remove_file(&write_check).await;

        Ok(Self { dir })
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for a fingerprint
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.{}", fingerprint, ENTRY_EXT))
    }

    /// Look up a record; corrupt or mismatched entries read as absent
    pub async fn get(&self, fingerprint: &Fingerprint) -> DepcacheResult<Option<ResolutionRecord>> {
        let path = self.entry_path(fingerprint);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DepcacheError::io(
                    format!("reading cache entry {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_str::<ResolutionRecord>(&content) {
            Ok(record) if &record.fingerprint == fingerprint => Ok(Some(record)),
            Ok(record) => {
                warn!(
                    "Cache entry {} holds fingerprint {}, ignoring",
                    path.display(),
                    record.fingerprint.short()
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Persist a record atomically, replacing any entry for its fingerprint
    pub async fn put(&self, record: &ResolutionRecord) -> DepcacheResult<()> {
        let path = self.entry_path(&record.fingerprint);
        let tmp = self
            .dir
            .join(format!(".{}.{}.{}", record.fingerprint, Uuid::new_v4(), TEMP_EXT));
        let content = serde_json::to_string_pretty(record)?;

        if let Err(e) = fs::write(&tmp, content).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DepcacheError::storage(
                &self.dir,
                format!("writing entry {}: {}", record.fingerprint.short(), e),
            ));
        }

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(DepcacheError::storage(
                &self.dir,
                format!("publishing entry {}: {}", record.fingerprint.short(), e),
            ));
        }

        debug!(
            "Stored {} pins for {} under {}",
            record.packages.len(),
            record.module,
            record.fingerprint.short()
        );
        Ok(())
    }

    /// Remove one entry, or every entry when `fingerprint` is `None`
    ///
    /// Returns the number of entries removed. Missing entries are not errors.
    pub async fn invalidate(&self, fingerprint: Option<&Fingerprint>) -> DepcacheResult<usize> {
        match fingerprint {
            Some(fp) => self.remove_path(&self.entry_path(fp)).await,
            None => {
                let mut removed = 0;
                for path in self.scan(true).await? {
                    let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXT);
                    let n = self.remove_path(&path).await?;
                    if is_entry {
                        removed += n;
                    }
                }
                Ok(removed)
            }
        }
    }

    /// Note that `module` is served from an existing entry
    ///
    /// Returns false when there is no entry or the module was already listed.
    /// Callers in one process must serialize calls for the same fingerprint.
    pub async fn add_module(&self, fingerprint: &Fingerprint, module: &str) -> DepcacheResult<bool> {
        let Some(mut record) = self.get(fingerprint).await? else {
            return Ok(false);
        };
        if !record.add_module(module) {
            return Ok(false);
        }
        self.put(&record).await?;
        Ok(true)
    }

    /// Remove every entry that served a module
    ///
    /// Entries shared with other modules go too; those modules re-resolve on
    /// their next lookup.
    pub async fn invalidate_module(&self, module: &str) -> DepcacheResult<usize> {
        let mut removed = 0;
        for (path, record) in self.entries().await? {
            if record.serves(module) {
                removed += self.remove_path(&path).await?;
            }
        }
        Ok(removed)
    }

    /// Remove entries created more than `days` days ago
    pub async fn prune_older_than(&self, days: u32) -> DepcacheResult<usize> {
        let mut removed = 0;
        for (path, record) in self.entries().await? {
            if record.is_older_than_days(days) {
                removed += self.remove_path(&path).await?;
            }
        }
        Ok(removed)
    }

    /// All readable records, newest first
    pub async fn list(&self) -> DepcacheResult<Vec<ResolutionRecord>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Readable records with the file each came from, newest first
    async fn entries(&self) -> DepcacheResult<Vec<(PathBuf, ResolutionRecord)>> {
        let mut records = Vec::new();
        for path in self.scan(false).await? {
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                // Removed between scan and read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(DepcacheError::io(
                        format!("reading cache entry {}", path.display()),
                        e,
                    ))
                }
            };
            match serde_json::from_str::<ResolutionRecord>(&content) {
                Ok(record) => records.push((path, record)),
                Err(e) => warn!("Skipping corrupt cache entry {}: {}", path.display(), e),
            }
        }

        records.sort_by(|(_, a), (_, b)| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Entry count, size on disk and age range
    pub async fn stats(&self) -> DepcacheResult<CacheStats> {
        let mut stats = CacheStats::default();
        for path in self.scan(false).await? {
            if let Ok(meta) = fs::metadata(&path).await {
                stats.total_bytes += meta.len();
            }
        }

        let records = self.list().await?;
        stats.entries = records.len();
        stats.newest = records.first().map(|r| r.created_at);
        stats.oldest = records.last().map(|r| r.created_at);
        Ok(stats)
    }

    /// Entry files, plus leftover temp files if `include_temp`
    async fn scan(&self, include_temp: bool) -> DepcacheResult<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(DepcacheError::io("reading cache directory", e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DepcacheError::io("reading cache entry", e))?
        {
            let path = entry.path();
            let hidden = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            let keep = match path.extension() {
                Some(ext) if ext == ENTRY_EXT => !hidden,
                Some(ext) if ext == TEMP_EXT => include_temp && hidden,
                _ => false,
            };
            if keep {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    async fn remove_path(&self, path: &Path) -> DepcacheResult<usize> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(1),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(DepcacheError::io(
                format!("removing cache entry {}", path.display()),
                e,
            )),
        }
    }
}
