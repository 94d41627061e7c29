//! Local weight store: one JSON object per line, oldest first.
//!
//! Appends go straight to the end of the file. Pruning rewrites the whole
//! file through `write_atomic`, so a crash mid-prune leaves the old file.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weigher_traits::{BoxError, LatestRecord, WeightSink};

use crate::atomic::write_atomic;
use crate::error::{Result, StoreError};

/// One stored reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: u64,
    pub weight: i32,
    pub source_id: String,
    pub group_id: String,
    pub recorded_at: DateTime<Utc>,
}

impl StoredRecord {
    fn matches(&self, source_id: &str, group_id: &str) -> bool {
        (source_id.is_empty() || self.source_id == source_id)
            && (group_id.is_empty() || self.group_id == group_id)
    }
}

pub struct JsonlStore {
    path: PathBuf,
    // next id; the lock also serializes every file access
    next_id: Mutex<u64>,
}

impl JsonlStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;
        let next_id = read_records(&path)?
            .iter()
            .map(|r| r.id)
            .max()
            .map_or(1, |m| m + 1);
        tracing::debug!(path = %path.display(), next_id, "weight store opened");
        Ok(Self {
            path,
            next_id: Mutex::new(next_id),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.next_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append a reading; negative weights are refused.
    pub fn append(&self, weight: i32, source_id: &str, group_id: &str) -> Result<StoredRecord> {
        if weight < 0 {
            return Err(StoreError::NegativeWeight(weight));
        }
        let mut next_id = self.lock();
        let rec = StoredRecord {
            id: *next_id,
            weight,
            source_id: source_id.to_owned(),
            group_id: group_id.to_owned(),
            recorded_at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&rec)?;
        line.push(b'\n');
        let mut f = OpenOptions::new().append(true).open(&self.path)?;
        f.write_all(&line)?;
        f.flush()?;
        *next_id += 1;
        Ok(rec)
    }

    /// Newest record for the station; an empty filter matches anything.
    pub fn newest(&self, source_id: &str, group_id: &str) -> Result<Option<StoredRecord>> {
        let _g = self.lock();
        Ok(read_records(&self.path)?
            .into_iter()
            .rev()
            .find(|r| r.matches(source_id, group_id)))
    }

    pub fn len(&self) -> Result<usize> {
        let _g = self.lock();
        Ok(read_records(&self.path)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Keep only the newest `keep` records; returns how many were removed.
    pub fn prune_to(&self, keep: usize) -> Result<usize> {
        let _g = self.lock();
        let records = read_records(&self.path)?;
        let excess = records.len().saturating_sub(keep);
        if excess == 0 {
            return Ok(0);
        }
        let mut out = Vec::new();
        for rec in &records[excess..] {
            serde_json::to_writer(&mut out, rec)?;
            out.push(b'\n');
        }
        write_atomic(&self.path, &out)?;
        Ok(excess)
    }
}

fn read_records(path: &Path) -> Result<Vec<StoredRecord>> {
    let f = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(&line) {
            Ok(r) => out.push(r),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping unreadable store line"
            ),
        }
    }
    Ok(out)
}

impl WeightSink for JsonlStore {
    fn record(&self, weight: i32, source_id: &str, group_id: &str) -> std::result::Result<(), BoxError> {
        self.append(weight, source_id, group_id)?;
        Ok(())
    }

    fn latest(&self, source_id: &str, group_id: &str) -> std::result::Result<Option<f64>, BoxError> {
        Ok(self.newest(source_id, group_id)?.map(|r| f64::from(r.weight)))
    }

    fn latest_record(
        &self,
        source_id: &str,
        group_id: &str,
    ) -> std::result::Result<Option<LatestRecord>, BoxError> {
        Ok(self.newest(source_id, group_id)?.map(|r| LatestRecord {
            id: Some(r.id),
            weight: f64::from(r.weight),
            source_id: r.source_id,
            group_id: r.group_id,
            recorded_at: Some(r.recorded_at.to_rfc3339()),
        }))
    }

    fn prune(&self, keep: usize) -> std::result::Result<usize, BoxError> {
        Ok(self.prune_to(keep)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store() -> (tempfile::TempDir, JsonlStore) {
        let dir = tempfile::tempdir().unwrap();
        let s = JsonlStore::open(dir.path().join("db").join("weights.jsonl")).unwrap();
        (dir, s)
    }

    #[test]
    fn open_creates_parent_directories() {
        let (dir, s) = store();
        assert!(dir.path().join("db").is_dir());
        assert!(s.path().exists());
        assert!(s.is_empty().unwrap());
    }

    #[test]
    fn negative_weights_are_refused() {
        let (_d, s) = store();
        assert!(matches!(
            s.append(-1, "PC-1", "SITE"),
            Err(StoreError::NegativeWeight(-1))
        ));
        assert!(s.is_empty().unwrap());
    }

    #[rstest]
    #[case("PC-1", "SITE", Some(30))]
    #[case("PC-2", "SITE", Some(20))]
    #[case("", "SITE", Some(30))]
    #[case("", "", Some(40))]
    #[case("PC-3", "", None)]
    fn latest_filters(#[case] src: &str, #[case] grp: &str, #[case] expected: Option<i32>) {
        let (_d, s) = store();
        s.append(10, "PC-1", "SITE").unwrap();
        s.append(20, "PC-2", "SITE").unwrap();
        s.append(30, "PC-1", "SITE").unwrap();
        s.append(40, "PC-1", "OTHER").unwrap();
        assert_eq!(s.newest(src, grp).unwrap().map(|r| r.weight), expected);
    }

    #[test]
    fn latest_record_carries_id_and_timestamp() {
        let (_d, s) = store();
        s.append(10, "PC-1", "SITE").unwrap();
        let stored = s.append(25, "PC-2", "SITE").unwrap();
        let row = WeightSink::latest_record(&s, "", "SITE").unwrap().unwrap();
        assert_eq!(row.id, Some(stored.id));
        assert_eq!(row.weight, 25.0);
        assert_eq!(row.source_id, "PC-2");
        let at = DateTime::parse_from_rfc3339(row.recorded_at.as_deref().unwrap()).unwrap();
        assert_eq!(at.with_timezone(&Utc), stored.recorded_at);
    }

    #[test]
    fn ids_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("w.jsonl");
        {
            let s = JsonlStore::open(&p).unwrap();
            s.append(1, "a", "b").unwrap();
            s.append(2, "a", "b").unwrap();
        }
        let s = JsonlStore::open(&p).unwrap();
        assert_eq!(s.append(3, "a", "b").unwrap().id, 3);
    }

    #[test]
    fn prune_keeps_newest() {
        let (_d, s) = store();
        for w in 0..8 {
            s.append(w, "PC-1", "SITE").unwrap();
        }
        assert_eq!(s.prune_to(5).unwrap(), 3);
        assert_eq!(s.len().unwrap(), 5);
        assert_eq!(s.newest("", "").unwrap().unwrap().weight, 7);
        assert_eq!(s.prune_to(5).unwrap(), 0);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let (_d, s) = store();
        s.append(5, "PC-1", "SITE").unwrap();
        let mut f = OpenOptions::new().append(true).open(s.path()).unwrap();
        f.write_all(b"{not json\n").unwrap();
        assert_eq!(s.len().unwrap(), 1);
        s.append(6, "PC-1", "SITE").unwrap();
        assert_eq!(s.latest("PC-1", "SITE").unwrap(), Some(6.0));
    }
}
