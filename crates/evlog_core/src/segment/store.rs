//! Segment store management.

use crate::config::Config;
use crate::dir::{read_optional, sync_directory, write_atomic, LogDir};
use crate::error::{CoreError, CoreResult};
use crate::lock::{LockGuard, LockMode, ProcessMutex};
use crate::segment::meta::{FileStatus, SegmentMeta, SegmentReport};
use crate::segment::name::SegmentName;
use crate::segment::scan;
use crate::types::{Entry, Position};
use evlog_codec::{encode_event, hash_line, Event};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Owns the segment files of a log directory.
///
/// Public methods take the log lock themselves: exclusive for mutations,
/// shared for reads. The `*_unlocked` variants exist for callers in this
/// crate that already hold the lock across several steps.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: LogDir,
    mutex: ProcessMutex,
    config: Config,
}

impl SegmentStore {
    /// Opens the store at `path`, creating the directory layout and the
    /// first segment if needed.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = LogDir::new(path);
        dir.create_all()?;
        let mutex = ProcessMutex::new(
            dir.lock_path(),
            config.lock_retry_attempts,
            config.lock_retry_interval,
        );
        let store = Self { dir, mutex, config };
        store.init()?;
        Ok(store)
    }

    /// Returns the log directory.
    #[must_use]
    pub fn dir(&self) -> &LogDir {
        &self.dir
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the log lock.
    #[must_use]
    pub fn mutex(&self) -> &ProcessMutex {
        &self.mutex
    }

    /// Ensures the directory layout exists and a latest segment is recorded.
    ///
    /// Idempotent.
    pub fn init(&self) -> CoreResult<()> {
        self.mutex
            .with_lock(LockMode::Exclusive, || self.init_unlocked())
    }

    pub(crate) fn init_unlocked(&self) -> CoreResult<()> {
        self.dir.create_all()?;

        if self.read_latest()?.is_some() {
            return Ok(());
        }

        // A missing pointer with segments on disk means the pointer was
        // lost; resume on the newest segment rather than starting over.
        if let Some(&newest) = self.names_unlocked()?.last() {
            warn!(segment = %newest, "latest pointer missing, repointing to newest segment");
            self.write_latest(newest)?;
            return Ok(());
        }

        self.create_segment(SegmentName::FIRST)?;
        self.write_latest(SegmentName::FIRST)?;
        info!(dir = %self.dir.path().display(), "initialized event log");
        Ok(())
    }

    /// Appends one event to the latest segment, rotating first if the
    /// segment would grow past its size budget.
    ///
    /// Returns the position just past the new record. The record becomes
    /// visible only once its metadata is written, so a failed append
    /// leaves nothing behind for readers.
    pub fn append(&self, event: &Event) -> CoreResult<Position> {
        self.mutex
            .with_lock(LockMode::Exclusive, || self.append_unlocked(event))
    }

    pub(crate) fn append_unlocked(&self, event: &Event) -> CoreResult<Position> {
        let line = encode_event(event)?;
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(&line);
        framed.push(b'\n');

        let mut name = self.latest_unlocked()?;
        let mut meta = self.load_meta(name)?;

        if self
            .config
            .needs_rotation(meta.uncompressed_size, framed.len() as u64)
        {
            name = self.rotate(name)?;
            meta = SegmentMeta::empty();
        }

        let frame = zstd::stream::encode_all(framed.as_slice(), self.config.compression_level)?;

        let path = self.segment_path(name);
        let mut file = OpenOptions::new().write(true).open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CoreError::segment_not_found(name.file_name())
            } else {
                e.into()
            }
        })?;
        let committed = self.repair_tail(name, &file, &meta)?;

        file.seek(SeekFrom::Start(committed))?;
        file.write_all(&frame)?;
        if self.config.sync_on_append {
            file.sync_data()?;
        }
        drop(file);

        if meta.line_count == 0 {
            meta.first_line_hash = hash_line(&line);
        }
        meta.line_count += 1;
        meta.uncompressed_size += framed.len() as u64;
        meta.compressed_size = Some(committed + frame.len() as u64);
        self.save_meta(name, &meta)?;

        debug!(
            segment = %name,
            id = %event.id,
            event_type = %event.event_type,
            offset = meta.uncompressed_size,
            "appended event"
        );

        Ok(Position::new(name.file_name(), meta.uncompressed_size))
    }

    /// Truncates bytes left by an append that wrote data but never
    /// committed its metadata. Returns the committed length.
    fn repair_tail(&self, name: SegmentName, file: &File, meta: &SegmentMeta) -> CoreResult<u64> {
        let physical = file.metadata()?.len();
        let Some(committed) = meta.compressed_size else {
            return Ok(physical);
        };

        if physical > committed {
            warn!(
                segment = %name,
                physical,
                committed,
                "truncating uncommitted segment tail"
            );
            file.set_len(committed)?;
        } else if physical < committed {
            return Err(CoreError::segment_corruption(format!(
                "{name} is {physical} bytes but metadata records {committed}"
            )));
        }

        Ok(committed)
    }

    /// Seals `current` and repoints `latest` at the segment after the
    /// newest one on disk. Returns the new segment.
    ///
    /// An empty segment newer than `current` is the leftover of a rotation
    /// that crashed before repointing `latest`, and is adopted. Any other
    /// existing segment is never reopened.
    fn rotate(&self, current: SegmentName) -> CoreResult<SegmentName> {
        let newest = self
            .names_unlocked()?
            .last()
            .copied()
            .map_or(current, |newest| newest.max(current));

        let next = if newest > current && self.is_empty_file(newest)? {
            self.save_meta(newest, &SegmentMeta::empty())?;
            newest
        } else {
            let next = newest.next();
            self.create_segment(next)?;
            next
        };

        self.write_latest(next)?;
        info!(sealed = %current, latest = %next, "rotated segment");
        Ok(next)
    }

    fn is_empty_file(&self, name: SegmentName) -> CoreResult<bool> {
        Ok(fs::metadata(self.segment_path(name))?.len() == 0)
    }

    fn create_segment(&self, name: SegmentName) -> CoreResult<()> {
        let path = self.segment_path(name);
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        self.save_meta(name, &SegmentMeta::empty())?;
        sync_directory(self.dir.path())?;
        info!(segment = %name, "created segment");
        Ok(())
    }

    /// Reads every event after `from_offset` in `segment`.
    ///
    /// Malformed lines are skipped; an empty segment yields an empty list.
    pub fn read_from(&self, segment: &str, from_offset: u64) -> CoreResult<Vec<Entry>> {
        let name = parse_name(segment)?;
        self.mutex
            .with_lock(LockMode::Shared, || self.read_from_unlocked(name, from_offset))
    }

    pub(crate) fn read_from_unlocked(
        &self,
        name: SegmentName,
        from_offset: u64,
    ) -> CoreResult<Vec<Entry>> {
        let data = self.read_stream(name)?;
        let entries = scan::scan_entries(&name.file_name(), &data, from_offset);
        debug!(segment = %name, from_offset, count = entries.len(), "read segment");
        Ok(entries)
    }

    /// Decompresses the committed part of a segment.
    fn read_stream(&self, name: SegmentName) -> CoreResult<Vec<u8>> {
        let path = self.segment_path(name);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CoreError::segment_not_found(name.file_name())
            } else {
                e.into()
            }
        })?;

        let physical = file.metadata()?.len();
        let committed = match self.read_meta(name)? {
            Some(SegmentMeta {
                compressed_size: Some(size),
                ..
            }) => size.min(physical),
            _ => physical,
        };

        decompress(file, committed)
    }

    /// Returns all segment names in ascending sequence order.
    pub fn list_files(&self) -> CoreResult<Vec<String>> {
        let names = self
            .mutex
            .with_lock(LockMode::Shared, || self.names_unlocked())?;
        Ok(names.into_iter().map(SegmentName::file_name).collect())
    }

    pub(crate) fn names_unlocked(&self) -> CoreResult<Vec<SegmentName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.dir.path())? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str().and_then(SegmentName::parse) {
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// Returns the name of the segment currently open for append.
    pub fn latest(&self) -> CoreResult<String> {
        self.mutex
            .with_lock(LockMode::Shared, || self.latest_unlocked())
            .map(SegmentName::file_name)
    }

    pub(crate) fn latest_unlocked(&self) -> CoreResult<SegmentName> {
        self.read_latest()?
            .ok_or_else(|| CoreError::invalid_format("latest segment pointer is missing"))
    }

    /// Reports sizes and identity of a segment, or of the latest segment
    /// when `segment` is `None`.
    pub fn status(&self, segment: Option<&str>) -> CoreResult<FileStatus> {
        let name = segment.map(parse_name).transpose()?;
        self.mutex
            .with_lock(LockMode::Shared, || self.status_unlocked(name))
    }

    pub(crate) fn status_unlocked(&self, name: Option<SegmentName>) -> CoreResult<FileStatus> {
        let latest = self.latest_unlocked()?;
        let name = name.unwrap_or(latest);

        let compressed_size = match fs::metadata(self.segment_path(name)) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CoreError::segment_not_found(name.file_name()));
            }
            Err(e) => return Err(e.into()),
        };
        let meta = self.load_meta(name)?;

        Ok(FileStatus {
            name: name.file_name(),
            compressed_size,
            uncompressed_size: meta.uncompressed_size,
            line_count: meta.line_count,
            first_line_hash: meta.first_line_hash,
            is_latest: name == latest,
        })
    }

    /// Returns true if `offset` is the start of the segment or sits just
    /// past a newline of its committed content.
    pub(crate) fn is_record_boundary_unlocked(
        &self,
        name: SegmentName,
        offset: u64,
    ) -> CoreResult<bool> {
        if offset == 0 {
            return Ok(true);
        }
        let data = self.read_stream(name)?;
        let Ok(end) = usize::try_from(offset) else {
            return Ok(false);
        };
        Ok(end <= data.len() && data[end - 1] == b'\n')
    }

    /// Returns true if the segment data file exists.
    pub(crate) fn exists(&self, name: SegmentName) -> bool {
        self.segment_path(name).is_file()
    }

    /// Current first-line hash of a segment, from its sidecar or, if the
    /// sidecar is gone, recomputed from content.
    pub(crate) fn first_line_hash_unlocked(&self, name: SegmentName) -> CoreResult<String> {
        if !self.exists(name) {
            return Err(CoreError::segment_not_found(name.file_name()));
        }
        match self.read_meta(name)? {
            Some(meta) => Ok(meta.first_line_hash),
            None => Ok(scan::first_line_hash(&self.read_stream(name)?)),
        }
    }

    /// Recomputes and rewrites a segment's sidecar from its content.
    ///
    /// Used to recover a segment whose sidecar was lost or damaged.
    pub fn rebuild_metadata(&self, segment: &str) -> CoreResult<SegmentMeta> {
        let name = parse_name(segment)?;
        self.mutex
            .with_lock(LockMode::Exclusive, || self.rebuild_metadata_unlocked(name))
    }

    /// Like [`rebuild_metadata`](Self::rebuild_metadata), for a caller that
    /// already holds this store's lock exclusively and has just edited the
    /// segment by hand.
    pub fn rebuild_metadata_held(
        &self,
        guard: &LockGuard,
        segment: &str,
    ) -> CoreResult<SegmentMeta> {
        debug_assert!(guard.is_held() && guard.mode() == LockMode::Exclusive);
        self.rebuild_metadata_unlocked(parse_name(segment)?)
    }

    fn rebuild_metadata_unlocked(&self, name: SegmentName) -> CoreResult<SegmentMeta> {
        let meta = self.compute_meta(name)?.0;
        self.save_meta(name, &meta)?;
        info!(segment = %name, lines = meta.line_count, "rebuilt segment metadata");
        Ok(meta)
    }

    /// Checks a segment's content against its sidecar.
    pub fn verify(&self, segment: &str) -> CoreResult<SegmentReport> {
        let name = parse_name(segment)?;
        self.mutex.with_lock(LockMode::Shared, || {
            let recorded = self.read_meta(name)?;
            let (actual, malformed_lines) = self.compute_meta(name)?;
            Ok(SegmentReport {
                name: name.file_name(),
                recorded,
                actual,
                malformed_lines,
            })
        })
    }

    fn compute_meta(&self, name: SegmentName) -> CoreResult<(SegmentMeta, u64)> {
        let path = self.segment_path(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CoreError::segment_not_found(name.file_name()));
            }
            Err(e) => return Err(e.into()),
        };
        let physical = file.metadata()?.len();
        let data = decompress(file, physical)?;
        let (mut meta, malformed) = scan::summarize(&data);
        meta.compressed_size = Some(physical);
        Ok((meta, malformed))
    }

    /// Loads a sidecar, recomputing it from content when it is missing.
    fn load_meta(&self, name: SegmentName) -> CoreResult<SegmentMeta> {
        match self.read_meta(name)? {
            Some(meta) => Ok(meta),
            None => {
                warn!(segment = %name, "segment metadata missing, recomputing from content");
                Ok(self.compute_meta(name)?.0)
            }
        }
    }

    fn read_meta(&self, name: SegmentName) -> CoreResult<Option<SegmentMeta>> {
        read_optional(&self.meta_path(name))?
            .map(|data| SegmentMeta::decode(&data))
            .transpose()
    }

    fn save_meta(&self, name: SegmentName, meta: &SegmentMeta) -> CoreResult<()> {
        write_atomic(&self.meta_path(name), &meta.encode()?)
    }

    fn read_latest(&self) -> CoreResult<Option<SegmentName>> {
        let Some(data) = read_optional(&self.dir.latest_path())? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&data);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        SegmentName::parse(text)
            .map(Some)
            .ok_or_else(|| CoreError::invalid_format(format!("bad latest pointer: {text:?}")))
    }

    fn write_latest(&self, name: SegmentName) -> CoreResult<()> {
        write_atomic(&self.dir.latest_path(), format!("{name}\n").as_bytes())
    }

    fn segment_path(&self, name: SegmentName) -> PathBuf {
        self.dir.file(&name.file_name())
    }

    fn meta_path(&self, name: SegmentName) -> PathBuf {
        self.dir.file(&name.meta_file_name())
    }
}

/// Parses a segment file name, treating anything else as a missing segment.
pub(crate) fn parse_name(segment: &str) -> CoreResult<SegmentName> {
    SegmentName::parse(segment).ok_or_else(|| CoreError::segment_not_found(segment))
}

/// Decompresses the first `len` bytes of a segment file.
///
/// Each append is an independent zstd frame; the decoder reads the
/// concatenated frames as one stream.
fn decompress(file: File, len: u64) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    if len == 0 {
        return Ok(out);
    }
    let mut decoder = zstd::stream::read::Decoder::new(file.take(len))?;
    decoder.read_to_end(&mut out).map_err(|e| {
        CoreError::segment_corruption(format!("failed to decompress segment: {e}"))
    })?;
    Ok(out)
}
