//! File-drop/LDM transport adapter.
//!
//! Reads fixed-size physical blocks (100 packet slots) from a sequence of
//! files, discovered either from an externally supplied ordered list
//! (archive mode) or by scanning a dated directory tree for the file whose
//! embedded time and sequence number chain onto the previously consumed one
//! (realtime mode). A discovered file must be quiescent before it is
//! opened, to avoid reading a partially written file.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use level2_wire::decompress::{ControlWord, CONTROL_WORD_SIZE, MIN_BLOCK_SIZE};
use level2_wire::{
    Compression, Framer, TitleFormat, VolumeContext, VolumeTitle, PACKETS_PER_LDM_BLOCK,
    PACKET_SIZE, VOLUME_TITLE_SIZE,
};
use radar_common::{MessageKind, RawMessage, TransportStatus};

use crate::paths::{DirTemplate, NameTemplate, ParsedName, SeqToken};
use crate::Transport;

/// Bytes in one uncompressed physical block.
const BLOCK_BYTES: usize = PACKET_SIZE * PACKETS_PER_LDM_BLOCK;

/// File discovery mode.
#[derive(Debug, Clone)]
pub enum LdmMode {
    /// Consume an externally supplied ordered file list, then end.
    Archive { files: Vec<PathBuf> },
    /// Scan a directory tree for the next file in the feed.
    Realtime {
        base_dir: PathBuf,
        /// Dated subdirectory beneath the base, or `None` for a flat feed.
        dir_template: Option<DirTemplate>,
        name_template: NameTemplate,
    },
}

/// Configuration for the file/LDM adapter.
#[derive(Debug, Clone)]
pub struct LdmConfig {
    pub mode: LdmMode,
    pub compression: Compression,
    /// Size/mtime must be stable this long before a file is opened.
    pub quiescence: Duration,
    /// Interval between directory scans and quiescence polls.
    pub poll_interval: Duration,
    pub min_file_size: u64,
    /// Files older than this are ignored when search state resets.
    pub max_valid_age: Duration,
    /// Elapsed-search budget. On expiry the search state resets to "look
    /// for sequence 0 at time >= now - max_valid_age" rather than failing.
    pub max_search_time: Duration,
    /// Feed delivers one whole volume per file (no metadata-only files).
    pub one_file_per_volume: bool,
}

impl LdmConfig {
    pub fn archive(files: Vec<PathBuf>, compression: Compression) -> Self {
        Self {
            mode: LdmMode::Archive { files },
            compression,
            quiescence: Duration::ZERO,
            poll_interval: Duration::from_secs(1),
            min_file_size: 0,
            max_valid_age: Duration::from_secs(3600),
            max_search_time: Duration::from_secs(600),
            // An explicit file list names complete volume files; only a
            // segmented realtime feed starts each AR2V volume with a
            // metadata-only file.
            one_file_per_volume: true,
        }
    }

    pub fn realtime(
        base_dir: PathBuf,
        dir_template: Option<DirTemplate>,
        name_template: NameTemplate,
        compression: Compression,
    ) -> Self {
        Self {
            mode: LdmMode::Realtime {
                base_dir,
                dir_template,
                name_template,
            },
            compression,
            quiescence: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            min_file_size: 0,
            max_valid_age: Duration::from_secs(3600),
            max_search_time: Duration::from_secs(600),
            one_file_per_volume: false,
        }
    }
}

enum OpenOutcome {
    Opened,
    /// Metadata-only file consumed without installing a reader.
    Skipped,
    NoMoreFiles,
}

/// The file/LDM transport.
pub struct LdmTransport {
    cfg: LdmConfig,
    framer: Framer,
    reader: Option<BufReader<File>>,
    /// Partial logical record carried across uncompressed block reads.
    carry: Vec<u8>,
    /// The compressed feed's control word marked the final block.
    last_block_seen: bool,
    archive_idx: usize,
    /// Last consumed (time, sequence) in realtime mode.
    last_consumed: Option<ParsedName>,
}

impl LdmTransport {
    pub fn new(cfg: LdmConfig) -> Self {
        Self {
            cfg,
            framer: Framer::new(MessageKind::DigitalRadarData),
            reader: None,
            carry: Vec::with_capacity(PACKET_SIZE),
            last_block_seen: false,
            archive_idx: 0,
            last_consumed: None,
        }
    }

    fn open_next_file(&mut self) -> OpenOutcome {
        let (path, parsed) = match &self.cfg.mode {
            LdmMode::Archive { files } => match files.get(self.archive_idx) {
                Some(path) => {
                    let path = path.clone();
                    self.archive_idx += 1;
                    (path, None)
                }
                None => return OpenOutcome::NoMoreFiles,
            },
            LdmMode::Realtime { .. } => {
                let (path, parsed) = self.search_next_file();
                (path, Some(parsed))
            }
        };

        let outcome = match self.open_file(&path) {
            Ok(outcome) => {
                // Segment bookkeeping after the open, so a title boundary
                // resetting the context does not erase this segment.
                if let Some(parsed) = parsed {
                    let pos = parsed.seq.position_after(self.framer.context().last_segment);
                    self.framer.context_mut().note_segment(pos);
                    if parsed.seq == SeqToken::EndOfVolume {
                        self.framer.context_mut().note_final_segment(pos);
                    }
                }
                outcome
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open feed file");
                OpenOutcome::Skipped
            }
        };
        if let Some(parsed) = parsed {
            self.last_consumed = Some(parsed);
        }
        outcome
    }

    fn open_file(&mut self, path: &Path) -> std::io::Result<OpenOutcome> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        self.carry.clear();
        self.last_block_seen = false;
        self.framer
            .begin_source(&path.to_string_lossy(), self.cfg.compression);

        // Optional 24-byte volume title at the start of the file.
        let mut probe = [0u8; VOLUME_TITLE_SIZE];
        let mut got = 0;
        while got < VOLUME_TITLE_SIZE {
            let n = reader.read(&mut probe[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }

        match VolumeTitle::parse(&probe[..got]) {
            Ok(title) => {
                info!(
                    path = %path.display(),
                    volume = ?title.volume_num,
                    format = ?title.format,
                    "Volume boundary"
                );
                self.framer.note_title(&title);
                if title.format == TitleFormat::Ar2v && !self.cfg.one_file_per_volume {
                    // Title-bearing segment of a multi-file AR2V feed holds
                    // only metadata messages; consume it in full.
                    info!(path = %path.display(), "Metadata-only segment, skipping file");
                    return Ok(OpenOutcome::Skipped);
                }
            }
            Err(_) => {
                // Not a title: those bytes are the head of the first record.
                self.carry.extend_from_slice(&probe[..got]);
            }
        }

        self.reader = Some(reader);
        Ok(OpenOutcome::Opened)
    }

    /// Read and install one physical block. `Ok(false)` means the file is
    /// exhausted.
    fn read_block(&mut self) -> Result<bool, TransportStatus> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(false),
        };

        match self.cfg.compression {
            Compression::Uncompressed => {
                let mut block = std::mem::take(&mut self.carry);
                let start = block.len();
                block.resize(BLOCK_BYTES, 0);
                let mut filled = start;
                while filled < BLOCK_BYTES {
                    let n = reader.read(&mut block[filled..]).map_err(|e| {
                        warn!(error = %e, "Feed file read failed");
                        TransportStatus::BadData
                    })?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                block.truncate(filled);

                let aligned = filled - filled % PACKET_SIZE;
                if aligned == 0 {
                    // Nothing but a short tail: the file is done.
                    return Ok(false);
                }
                self.carry = block.split_off(aligned);
                self.framer
                    .load_block(&block)
                    .map_err(|_| TransportStatus::BadData)?;
                Ok(true)
            }
            Compression::Bzip2 | Compression::Zlib => loop {
                if self.last_block_seen {
                    return Ok(false);
                }
                // Title-probe leftovers in the carry buffer are the head of
                // the control-word stream.
                let mut cw_buf = [0u8; CONTROL_WORD_SIZE];
                let pre = drain_carry(&mut self.carry, &mut cw_buf);
                match reader.read_exact(&mut cw_buf[pre..]) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        return Ok(false);
                    }
                    Err(e) => {
                        warn!(error = %e, "Feed file read failed");
                        return Err(TransportStatus::BadData);
                    }
                }
                let cw = ControlWord::parse(&cw_buf).map_err(|_| TransportStatus::BadData)?;
                if cw.last_block {
                    self.last_block_seen = true;
                }

                let mut compressed = vec![0u8; cw.length];
                let pre = drain_carry(&mut self.carry, &mut compressed);
                reader.read_exact(&mut compressed[pre..]).map_err(|e| {
                    warn!(error = %e, length = cw.length, "Short compressed block");
                    TransportStatus::BadData
                })?;

                if cw.length <= MIN_BLOCK_SIZE {
                    debug!(length = cw.length, "Skipping empty compressed block");
                    continue;
                }
                self.framer.load_block(&compressed).map_err(|e| {
                    warn!(error = %e, "Block decompression failed");
                    TransportStatus::BadData
                })?;
                return Ok(true);
            },
        }
    }

    /// Scan for the next feed file. Blocks until one is found; on budget
    /// expiry the search state resets instead of propagating failure.
    fn search_next_file(&mut self) -> (PathBuf, ParsedName) {
        let mut deadline = Instant::now() + self.cfg.max_search_time;
        loop {
            if let Some(found) = self.scan_once() {
                if self.wait_quiescent(&found.0, deadline).is_ok() {
                    return found;
                }
            }
            if Instant::now() >= deadline {
                info!(
                    max_age_secs = self.cfg.max_valid_age.as_secs(),
                    "Search budget elapsed, resetting to sequence 0"
                );
                self.last_consumed = None;
                deadline = Instant::now() + self.cfg.max_search_time;
            }
            std::thread::sleep(self.cfg.poll_interval);
        }
    }

    fn scan_once(&self) -> Option<(PathBuf, ParsedName)> {
        let (base_dir, dir_template, name_template) = match &self.cfg.mode {
            LdmMode::Realtime {
                base_dir,
                dir_template,
                name_template,
            } => (base_dir, dir_template, name_template),
            LdmMode::Archive { .. } => return None,
        };

        let now = Utc::now();
        let mut dirs: Vec<PathBuf> = Vec::new();
        match dir_template {
            Some(tmpl) => {
                // The last-consumed hour and the current hour may differ
                // across a boundary; scan both.
                let mut times = vec![now];
                if let Some(last) = self.last_consumed {
                    times.push(last.time);
                }
                for t in times {
                    let dir = base_dir.join(tmpl.format(t));
                    if !dirs.contains(&dir) {
                        dirs.push(dir);
                    }
                }
            }
            None => dirs.push(base_dir.clone()),
        }

        let mut candidates: Vec<(PathBuf, ParsedName)> = Vec::new();
        for dir in dirs {
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(parsed) = name_template.parse(&name) {
                    candidates.push((entry.into_path(), parsed));
                }
            }
        }
        candidates.sort_by_key(|(_, p)| (p.time, p.seq));

        match self.last_consumed {
            Some(last) => candidates.into_iter().find(|(_, p)| {
                let follows_in_time = p.time == last.time
                    && match (last.seq, p.seq) {
                        (SeqToken::Number(n), SeqToken::Number(m)) => m == n + 1,
                        (SeqToken::Number(_), SeqToken::EndOfVolume) => true,
                        // After E only a newer timestamp continues the feed.
                        (SeqToken::EndOfVolume, _) => false,
                    };
                let first_of_newer = p.time > last.time && p.seq == SeqToken::Number(0);
                follows_in_time || first_of_newer
            }),
            None => {
                let min_time = now
                    - chrono::Duration::from_std(self.cfg.max_valid_age)
                        .unwrap_or_else(|_| chrono::Duration::hours(1));
                candidates
                    .into_iter()
                    .find(|(_, p)| p.seq == SeqToken::Number(0) && p.time >= min_time)
            }
        }
    }

    /// Wait until the file's size and mtime have been stable for the
    /// configured interval. The deadline comes from the enclosing search
    /// budget so a file that never settles sends us back to scanning.
    fn wait_quiescent(&self, path: &Path, deadline: Instant) -> Result<(), ()> {
        let stat = |p: &Path| -> Option<(u64, SystemTime)> {
            let meta = fs::metadata(p).ok()?;
            Some((meta.len(), meta.modified().ok()?))
        };

        let mut last = stat(path).ok_or(())?;
        let mut stable_since = Instant::now();
        loop {
            let now = Instant::now();
            if now.duration_since(stable_since) >= self.cfg.quiescence
                && last.0 >= self.cfg.min_file_size
            {
                return Ok(());
            }
            if now >= deadline {
                debug!(path = %path.display(), "File never became quiescent");
                return Err(());
            }
            std::thread::sleep(self.cfg.poll_interval);
            let cur = stat(path).ok_or(())?;
            if cur != last {
                last = cur;
                stable_since = Instant::now();
            }
        }
    }
}

/// Move up to `buf.len()` carried-over bytes into the front of `buf`,
/// returning how many were moved.
fn drain_carry(carry: &mut Vec<u8>, buf: &mut [u8]) -> usize {
    let n = carry.len().min(buf.len());
    buf[..n].copy_from_slice(&carry[..n]);
    carry.drain(..n);
    n
}

impl Transport for LdmTransport {
    fn next_message(&mut self) -> (TransportStatus, Option<RawMessage<'_>>) {
        loop {
            match self.framer.next_record() {
                Ok(Some(rec)) => {
                    let kind = rec.header.kind;
                    let title_seen = rec.title_seen;
                    let data = self.framer.record_bytes(&rec);
                    return (
                        TransportStatus::Ok,
                        Some(RawMessage {
                            data,
                            kind,
                            volume_title_seen: title_seen,
                        }),
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "Bad record in block");
                    return (TransportStatus::BadData, None);
                }
            }

            if self.reader.is_none() {
                match self.open_next_file() {
                    OpenOutcome::Opened | OpenOutcome::Skipped => continue,
                    OpenOutcome::NoMoreFiles => return (TransportStatus::EndOfData, None),
                }
            }

            match self.read_block() {
                Ok(true) => continue,
                Ok(false) => {
                    self.reader = None;
                    return (TransportStatus::EndOfFile, None);
                }
                Err(status) => {
                    self.reader = None;
                    return (status, None);
                }
            }
        }
    }

    fn context(&self) -> &VolumeContext {
        self.framer.context()
    }
}
