//! Tape transport adapter.
//!
//! Tapes deliver variable-length physical records: an 8-byte identification
//! record at load, a 24-byte volume title record at each volume boundary,
//! large packet-aligned data records, and filemarks (zero-length reads)
//! between tape files. Records are classified by size alone. Tapes written
//! with a fixed record size go through the same classifier: a data record
//! is always at least one packet long, so it can never collide with the
//! 8- and 24-byte marker sizes, and a dedicated fixed-size mode would
//! read identically. Two consecutive
//! filemarks mark the end of the tape. Drives mis-read routinely, so each
//! physical read is attempted a fixed number of times before the device is
//! declared unusable.
//!
//! The device seam covers both a local no-rewind drive and a remote drive
//! reached over the rmt protocol (`host:/dev/...` specs).

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use level2_wire::decompress::{ControlWord, CONTROL_WORD_SIZE, MIN_BLOCK_SIZE};
use level2_wire::{
    Compression, Framer, VolumeContext, VolumeTitle, PACKETS_PER_LDM_BLOCK, PACKET_SIZE,
    VOLUME_TITLE_SIZE,
};
use radar_common::{MessageKind, RawMessage, RelayError, RelayResult, TransportStatus};

use crate::Transport;

/// Total attempts per physical record before the drive is given up on.
const READ_ATTEMPTS: usize = 50;
/// Pause between failed read attempts.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Largest physical record a tape can deliver.
const MAX_TAPE_RECORD: usize = PACKET_SIZE * PACKETS_PER_LDM_BLOCK;
/// Size of the tape identification record written before the first title.
const ID_RECORD_SIZE: usize = 8;
/// Default rmt service port.
const RMT_PORT: u16 = 617;

/// Layout of data records on the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapeFraming {
    /// Records hold packet-aligned logical records directly.
    Plain,
    /// Records hold a control word followed by a bzip2 block.
    Bzip2Blocks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapeConfig {
    /// `/dev/nst0` for a local drive, `host:/dev/nst0` for a remote one.
    pub device: String,
    pub framing: TapeFraming,
}

/// One physical tape record per call. A zero-length read is a filemark.
pub trait TapeDevice {
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn describe(&self) -> String;
}

/// Local no-rewind tape drive.
pub struct LocalTape {
    file: File,
    path: PathBuf,
}

impl LocalTape {
    pub fn open(path: impl Into<PathBuf>) -> RelayResult<Self> {
        let path = path.into();
        let file = File::open(&path).map_err(RelayError::DeviceOpen)?;
        info!(device = %path.display(), "Opened tape device");
        Ok(Self { file, path })
    }
}

impl TapeDevice for LocalTape {
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Remote tape drive over the rmt protocol: `O` opens the device, each `R`
/// request answers with `A<count>\n` and that many data bytes, or
/// `E<errno>\n<message>\n` on failure.
pub struct RemoteTape {
    stream: BufReader<TcpStream>,
    spec: String,
}

impl RemoteTape {
    pub fn open(host: &str, device: &str) -> RelayResult<Self> {
        let stream = TcpStream::connect((host, RMT_PORT)).map_err(RelayError::DeviceOpen)?;
        let mut tape = Self {
            stream: BufReader::new(stream),
            spec: format!("{host}:{device}"),
        };
        tape.command(&format!("O{device}\n0\n"))
            .map_err(RelayError::DeviceOpen)?;
        info!(device = %tape.spec, "Opened remote tape device");
        Ok(tape)
    }

    fn command(&mut self, cmd: &str) -> io::Result<usize> {
        self.stream.get_mut().write_all(cmd.as_bytes())?;
        let mut line = String::new();
        self.stream.read_line(&mut line)?;
        match line.as_bytes().first() {
            Some(b'A') => line[1..]
                .trim()
                .parse::<usize>()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad rmt count")),
            Some(b'E') => {
                let mut msg = String::new();
                self.stream.read_line(&mut msg)?;
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("rmt: {}", msg.trim()),
                ))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad rmt response",
            )),
        }
    }
}

impl TapeDevice for RemoteTape {
    fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.command(&format!("R{}\n", buf.len()))?;
        if count > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "rmt record larger than requested",
            ));
        }
        self.stream.read_exact(&mut buf[..count])?;
        Ok(count)
    }

    fn describe(&self) -> String {
        self.spec.clone()
    }
}

/// Open the device named by a `TapeConfig` spec, remote or local.
pub fn open_device(cfg: &TapeConfig) -> RelayResult<Box<dyn TapeDevice>> {
    match cfg.device.split_once(':') {
        Some((host, device)) if !host.is_empty() && device.starts_with('/') => {
            Ok(Box::new(RemoteTape::open(host, device)?))
        }
        _ => Ok(Box::new(LocalTape::open(cfg.device.as_str())?)),
    }
}

/// The tape transport.
pub struct TapeTransport {
    device: Box<dyn TapeDevice>,
    framing: TapeFraming,
    framer: Framer,
    record: Vec<u8>,
    retry_backoff: Duration,
    /// Consecutive filemarks seen; two in a row end the tape.
    filemarks: usize,
}

impl TapeTransport {
    pub fn new(cfg: &TapeConfig) -> RelayResult<Self> {
        let device = open_device(cfg)?;
        Ok(Self::over(device, cfg.framing))
    }

    pub fn over(device: Box<dyn TapeDevice>, framing: TapeFraming) -> Self {
        let compression = match framing {
            TapeFraming::Plain => Compression::Uncompressed,
            TapeFraming::Bzip2Blocks => Compression::Bzip2,
        };
        let mut framer = Framer::new(MessageKind::DigitalRadarData);
        framer.begin_source(&device.describe(), compression);
        Self {
            device,
            framing,
            framer,
            record: vec![0u8; MAX_TAPE_RECORD],
            retry_backoff: RETRY_BACKOFF,
            filemarks: 0,
        }
    }

    /// Override the pause between failed reads.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// One physical record, retried a fixed number of times with a pause
    /// between attempts.
    fn read_physical(&mut self) -> Result<usize, TransportStatus> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            match self.device.read_record(&mut self.record) {
                Ok(n) => return Ok(n),
                Err(e) if attempt >= READ_ATTEMPTS => {
                    warn!(
                        device = %self.device.describe(),
                        attempts = attempt,
                        error = %e,
                        "Tape read failed, giving up on drive"
                    );
                    return Err(TransportStatus::BadInputStream);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Tape read error, retrying");
                    if !self.retry_backoff.is_zero() {
                        thread::sleep(self.retry_backoff);
                    }
                }
            }
        }
    }

    fn load_data_record(&mut self, len: usize) -> Result<(), TransportStatus> {
        match self.framing {
            TapeFraming::Plain => {
                if len < PACKET_SIZE {
                    warn!(len, "Runt tape record");
                    return Err(TransportStatus::BadData);
                }
                self.framer
                    .load_block(&self.record[..len])
                    .map_err(|_| TransportStatus::BadData)
            }
            TapeFraming::Bzip2Blocks => {
                if len < CONTROL_WORD_SIZE {
                    warn!(len, "Runt tape record");
                    return Err(TransportStatus::BadData);
                }
                let cw = ControlWord::parse(&self.record[..CONTROL_WORD_SIZE])
                    .map_err(|_| TransportStatus::BadData)?;
                if cw.length != len - CONTROL_WORD_SIZE {
                    warn!(
                        expected = cw.length,
                        got = len - CONTROL_WORD_SIZE,
                        "Control word disagrees with record length"
                    );
                    return Err(TransportStatus::BadData);
                }
                if cw.length <= MIN_BLOCK_SIZE {
                    return Ok(());
                }
                self.framer
                    .load_block(&self.record[CONTROL_WORD_SIZE..len])
                    .map_err(|e| {
                        warn!(error = %e, "Tape block decompression failed");
                        TransportStatus::BadData
                    })
            }
        }
    }
}

impl Transport for TapeTransport {
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
                    debug!(error = %e, "Bad record on tape");
                    return (TransportStatus::BadData, None);
                }
            }

            let len = match self.read_physical() {
                Ok(n) => n,
                Err(status) => return (status, None),
            };

            if len == 0 {
                self.filemarks += 1;
                if self.filemarks >= 2 {
                    info!(device = %self.device.describe(), "Double filemark, end of tape");
                    return (TransportStatus::EndOfData, None);
                }
                return (TransportStatus::EndOfFile, None);
            }
            self.filemarks = 0;

            if len == ID_RECORD_SIZE {
                debug!(device = %self.device.describe(), "Tape identification record");
                continue;
            }

            if len == VOLUME_TITLE_SIZE {
                match VolumeTitle::parse(&self.record[..len]) {
                    Ok(title) => {
                        info!(
                            device = %self.device.describe(),
                            volume = ?title.volume_num,
                            "Volume boundary on tape"
                        );
                        self.framer.note_title(&title);
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Title-sized record with bad magic");
                        return (TransportStatus::BadData, None);
                    }
                }
            }

            if let Err(status) = self.load_data_record(len) {
                return (status, None);
            }
        }
    }

    fn context(&self) -> &VolumeContext {
        self.framer.context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use level2_wire::CTM_SIZE;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn packet(msg_type: u8) -> Vec<u8> {
        let mut rec = vec![0u8; PACKET_SIZE];
        let half_len = ((PACKET_SIZE - CTM_SIZE) / 2) as u16;
        rec[12..14].copy_from_slice(&half_len.to_be_bytes());
        rec[15] = msg_type;
        rec[18..20].copy_from_slice(&20_000u16.to_be_bytes());
        rec
    }

    fn title() -> Vec<u8> {
        let mut t = vec![0u8; VOLUME_TITLE_SIZE];
        t[..9].copy_from_slice(b"ARCHIVE2.");
        t[9..12].copy_from_slice(b"042");
        t[12..14].copy_from_slice(&20_000i16.to_be_bytes());
        t
    }

    /// Scripted device: each entry is one physical read outcome.
    struct MockTape {
        script: VecDeque<io::Result<Vec<u8>>>,
        reads: Rc<Cell<usize>>,
    }

    impl MockTape {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> (Self, Rc<Cell<usize>>) {
            let reads = Rc::new(Cell::new(0));
            (
                Self {
                    script: script.into(),
                    reads: Rc::clone(&reads),
                },
                reads,
            )
        }
    }

    impl TapeDevice for MockTape {
        fn read_record(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.set(self.reads.get() + 1);
            match self.script.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }

    fn io_err() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "media error")
    }

    #[test]
    fn title_then_records_then_double_filemark() {
        let big = [packet(1), packet(2), packet(1)].concat();
        let (mock, _) = MockTape::new(vec![
            Ok(title()),
            Ok(big),
            Ok(vec![]),
            Ok(vec![]),
        ]);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Plain);

        let (status, msg) = t.next_message();
        assert_eq!(status, TransportStatus::Ok);
        assert!(msg.unwrap().volume_title_seen);
        assert_eq!(t.context().volume_num, Some(42));

        let (status, msg) = t.next_message();
        assert_eq!(status, TransportStatus::Ok);
        assert!(!msg.unwrap().volume_title_seen);

        assert_eq!(t.next_message().0, TransportStatus::EndOfFile);
        assert_eq!(t.next_message().0, TransportStatus::EndOfData);
    }

    #[test]
    fn identification_record_is_skipped() {
        let (mock, _) = MockTape::new(vec![
            Ok(vec![0u8; ID_RECORD_SIZE]),
            Ok(title()),
            Ok(packet(1)),
        ]);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Plain);

        let (status, msg) = t.next_message();
        assert_eq!(status, TransportStatus::Ok);
        assert!(msg.unwrap().volume_title_seen);
    }

    #[test]
    fn read_errors_retry_then_succeed() {
        let (mock, reads) = MockTape::new(vec![
            Err(io_err()),
            Err(io_err()),
            Ok(packet(1)),
        ]);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Plain)
            .with_retry_backoff(Duration::ZERO);

        assert_eq!(t.next_message().0, TransportStatus::Ok);
        assert_eq!(reads.get(), 3);
    }

    #[test]
    fn drive_is_abandoned_after_fixed_attempt_count() {
        let script: Vec<io::Result<Vec<u8>>> =
            (0..200).map(|_| Err(io_err())).collect();
        let (mock, reads) = MockTape::new(script);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Plain)
            .with_retry_backoff(Duration::ZERO);

        assert_eq!(t.next_message().0, TransportStatus::BadInputStream);
        assert_eq!(reads.get(), READ_ATTEMPTS);
    }

    #[test]
    fn intermediate_filemark_separates_tape_files() {
        let (mock, _) = MockTape::new(vec![
            Ok(packet(1)),
            Ok(vec![]),
            Ok(packet(1)),
            Ok(vec![]),
            Ok(vec![]),
        ]);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Plain);

        assert_eq!(t.next_message().0, TransportStatus::Ok);
        assert_eq!(t.next_message().0, TransportStatus::EndOfFile);
        assert_eq!(t.next_message().0, TransportStatus::Ok);
        assert_eq!(t.next_message().0, TransportStatus::EndOfFile);
        assert_eq!(t.next_message().0, TransportStatus::EndOfData);
    }

    #[test]
    fn bzip2_record_is_unpacked() {
        use std::io::Read as _;
        let payload = packet(1);
        let mut enc = bzip2::read::BzEncoder::new(
            payload.as_slice(),
            bzip2::Compression::best(),
        );
        let mut compressed = Vec::new();
        enc.read_to_end(&mut compressed).unwrap();

        let mut record = (compressed.len() as i32).to_be_bytes().to_vec();
        record.extend_from_slice(&compressed);

        let (mock, _) = MockTape::new(vec![Ok(record), Ok(vec![]), Ok(vec![])]);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Bzip2Blocks);

        let (status, msg) = t.next_message();
        assert_eq!(status, TransportStatus::Ok);
        assert_eq!(msg.unwrap().data.len(), PACKET_SIZE);
    }

    #[test]
    fn runt_record_is_bad_data() {
        // Larger than the identification and title records, smaller than a
        // logical record: classifies as data but cannot hold a packet.
        let (mock, _) = MockTape::new(vec![Ok(vec![0u8; 100])]);
        let mut t = TapeTransport::over(Box::new(mock), TapeFraming::Plain);
        assert_eq!(t.next_message().0, TransportStatus::BadData);
    }
}
