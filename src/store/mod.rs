//! High-level [`DsStore`] API: the metadata facade.
//!
//! ```no_run
//! use dsstore::DsStore;
//!
//! let mut store = DsStore::open("/some/folder/.DS_Store")?;
//! store.set_icon_location("Documents", 100, 200);
//! store.set_comments("Documents", "quarterly reports");
//! store.save()?;
//! # Ok::<(), dsstore::DsStoreError>(())
//! ```
//!
//! Records live in memory between [`DsStore::load`] and [`DsStore::save`].
//! The first mutation loads the container if that has not happened yet, so
//! edits always apply on top of what is on disk.  Mutations only mark the
//! store dirty; nothing touches the disk until an explicit save.

mod accessors;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::btree::{read_records, write_file};
use crate::buddy::BuddyContainer;
use crate::error::{DsStoreError, Result};
use crate::record::{cmp_filenames, FourCC, Record, Value};

// ── StoreOptions ─────────────────────────────────────────────────────────────

/// Configuration for [`DsStore::with_options`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Reject non-zero offset-table padding instead of logging it.
    pub strict_padding: bool,
    /// Deepest B-tree the reader will follow.
    pub max_depth:      u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            strict_padding: false,
            max_depth:      8,
        }
    }
}

// ── DsStore ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DsStore {
    path:    PathBuf,
    options: StoreOptions,
    records: Vec<Record>,
    loaded:  bool,
    dirty:   bool,
}

impl DsStore {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// A store bound to `path`.  Nothing is read until [`load`](Self::load).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, StoreOptions::default())
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: StoreOptions) -> Self {
        Self {
            path:    path.as_ref().to_owned(),
            options,
            records: Vec::new(),
            loaded:  false,
            dirty:   false,
        }
    }

    /// Construct and load in one step.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// Write a fresh container holding `records` (later duplicates of a key
    /// win) and return the store bound to it.
    pub fn create<P: AsRef<Path>>(path: P, records: Vec<Record>) -> Result<Self> {
        let mut store = Self::new(path);
        store.loaded = true;
        for record in records {
            store.set_entry(record);
        }
        store.dirty = true;
        store.save()?;
        Ok(store)
    }

    // ── Loading and saving ───────────────────────────────────────────────────

    /// Parse the file if not done yet.  A missing file is an empty store.
    /// On failure the record set is left empty.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        match self.read_from_disk() {
            Ok(records) => {
                debug!(path = %self.path.display(), records = records.len(), "loaded");
                self.records = records;
                self.loaded = true;
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "load failed");
                self.records.clear();
                self.dirty = false;
                Err(e)
            }
        }
    }

    /// Discard in-memory state and parse the file again.
    pub fn reload(&mut self) -> Result<()> {
        self.loaded = false;
        self.load()
    }

    fn read_from_disk(&self) -> Result<Vec<Record>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no container on disk");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let container = BuddyContainer::parse(&bytes, self.options.strict_padding)?;
        read_records(&container, self.options.max_depth)
    }

    /// Load before the first mutation.  A failed load is logged by
    /// [`load`](Self::load) and leaves the store unloaded, which makes a later
    /// [`save`](Self::save) refuse to overwrite the unreadable file.
    fn ensure_loaded(&mut self) {
        if !self.loaded {
            let _ = self.load();
        }
    }

    /// Persist pending changes.  A clean store is not written.
    ///
    /// Changes made while the container could not be read are never
    /// written over it: the read error is returned instead.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if !self.loaded {
            self.read_from_disk()?;
            return Err(DsStoreError::format(0, "container became readable after edits were made; reload first"));
        }
        write_file(&self.path, &self.records)?;
        self.dirty = false;
        self.loaded = true;
        Ok(())
    }

    // ── Generic record access ────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entry(&self, filename: &str, code: FourCC) -> Option<&Record> {
        self.records.iter().find(|r| r.matches(filename, code))
    }

    pub fn value(&self, filename: &str, code: FourCC) -> Option<&Value> {
        self.entry(filename, code).map(|r| &r.value)
    }

    /// Insert `record`, replacing any record with the same key.
    pub fn set_entry(&mut self, record: Record) {
        self.ensure_loaded();
        match self.records.iter_mut().find(|r| r.matches(&record.filename, record.code)) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.dirty = true;
    }

    pub fn set_value(&mut self, filename: &str, code: FourCC, value: Value) {
        self.set_entry(Record::new(filename, code, value));
    }

    /// Remove one record.  Returns it if it existed.
    pub fn remove_entry(&mut self, filename: &str, code: FourCC) -> Option<Record> {
        self.ensure_loaded();
        let idx = self.records.iter().position(|r| r.matches(filename, code))?;
        self.dirty = true;
        Some(self.records.remove(idx))
    }

    /// Remove every record of `filename`.  Returns how many were removed.
    pub fn remove_all_entries(&mut self, filename: &str) -> usize {
        self.ensure_loaded();
        let before = self.records.len();
        self.records.retain(|r| r.filename != filename);
        let removed = before - self.records.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Distinct filenames, in serialization order.
    pub fn all_filenames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.records.iter().map(|r| r.filename.as_str()).collect();
        names.sort_by(|a, b| cmp_filenames(a, b));
        names.dedup();
        names
    }

    pub fn all_codes_for_filename(&self, filename: &str) -> Vec<FourCC> {
        let mut codes: Vec<FourCC> =
            self.records.iter().filter(|r| r.filename == filename).map(|r| r.code).collect();
        codes.sort();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn long(name: &str, code: &[u8; 4], v: u32) -> Record {
        Record::new(name, FourCC::new(code), Value::Long(v))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let mut store = DsStore::new(dir.path().join(".DS_Store"));
        store.load().unwrap();
        assert!(store.is_loaded());
        assert!(store.records().is_empty());
    }

    #[test]
    fn set_entry_replaces_same_key() {
        let mut store = DsStore::new("unused");
        store.set_entry(long("a", b"fwsw", 1));
        store.set_entry(long("a", b"fwsw", 2));
        store.set_entry(long("b", b"fwsw", 3));
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.value("a", FourCC::new(b"fwsw")), Some(&Value::Long(2)));
        assert!(store.is_dirty());
    }

    #[test]
    fn removal_marks_dirty_only_when_something_went() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".DS_Store");
        let mut store = DsStore::create(&path, vec![long("a", b"fwsw", 1), long("a", b"lclr", 2)]).unwrap();
        assert!(!store.is_dirty());

        assert_eq!(store.remove_all_entries("zzz"), 0);
        assert!(!store.is_dirty());
        assert!(store.remove_entry("a", FourCC::new(b"nope")).is_none());
        assert!(!store.is_dirty());

        assert!(store.remove_entry("a", FourCC::new(b"lclr")).is_some());
        assert!(store.is_dirty());
        assert_eq!(store.remove_all_entries("a"), 1);
    }

    #[test]
    fn filename_and_code_listing() {
        let mut store = DsStore::new("unused");
        store.set_entry(long("b", b"lclr", 1));
        store.set_entry(long("A", b"lclr", 1));
        store.set_entry(long("b", b"fwsw", 1));
        assert_eq!(store.all_filenames(), ["A", "b"]);
        assert_eq!(store.all_codes_for_filename("b"), [FourCC::new(b"fwsw"), FourCC::new(b"lclr")]);
    }

    #[test]
    fn failed_load_leaves_store_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".DS_Store");
        fs::write(&path, b"definitely not a buddy allocator file, but long enough").unwrap();
        let mut store = DsStore::new(&path);
        store.set_entry(long("a", b"lclr", 1));
        let err = store.load().unwrap_err();
        assert!(err.is_format());
        assert!(store.records().is_empty());
        assert!(!store.is_loaded());
    }

    #[test]
    fn edits_before_load_keep_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".DS_Store");
        DsStore::create(&path, vec![long("keep", b"lclr", 1)]).unwrap();

        let mut store = DsStore::new(&path);
        store.set_entry(long("new", b"lclr", 2));
        store.save().unwrap();
        assert_eq!(DsStore::open(&path).unwrap().all_filenames(), ["keep", "new"]);

        let mut store = DsStore::new(&path);
        store.set_entry(long("later", b"lclr", 3));
        store.load().unwrap();
        assert!(store.is_dirty());
        assert_eq!(store.all_filenames(), ["keep", "later", "new"]);
    }

    #[test]
    fn edits_over_unreadable_file_are_not_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".DS_Store");
        let junk = b"definitely not a buddy allocator file, but long enough";
        fs::write(&path, junk).unwrap();

        let mut store = DsStore::new(&path);
        store.set_entry(long("a", b"lclr", 1));
        assert!(!store.is_loaded());
        assert!(store.save().unwrap_err().is_format());
        assert_eq!(fs::read(&path).unwrap(), junk);
    }
}
