//! TCP/IP transport adapter.
//!
//! Consumes a live socket carrying back-to-back fixed-size logical records.
//! A connection can land mid-record, so the adapter starts unsynchronized
//! and slides a byte-at-a-time search window over the stream until it finds
//! a header whose length and time fields are plausible. Some feeds front-pad
//! each record burst with filler blocks carrying a sentinel length field;
//! those are consumed silently.

use std::io::{self, Read};
use std::net::TcpStream;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use level2_wire::{
    MessageHeader, VolumeContext, CTM_SIZE, MESSAGE_HEADER_SIZE, PACKET_SIZE,
};
use radar_common::{MessageKind, RawMessage, RelayError, RelayResult, TransportStatus};

use crate::Transport;

/// Sentinel value in the length field of a front-padding filler block.
const FILLER_SENTINEL: u16 = 0xFFFF;
/// Consecutive filler blocks tolerated before the stream is declared lost.
const MAX_FILLER_BLOCKS: usize = 4;

/// How records are delimited on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TcpFraming {
    /// Records arrive back to back with nothing between them.
    Headerless,
    /// Each record burst is preceded by sentinel-marked filler blocks.
    FrontPadded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    pub host: String,
    pub port: u16,
    pub framing: TcpFraming,
    /// Socket read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Bytes the synchronization search may scan before reporting bad data.
    pub scan_budget: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 10_000,
            framing: TcpFraming::Headerless,
            read_timeout_secs: 60,
            scan_budget: 4 * PACKET_SIZE,
        }
    }
}

/// The TCP transport, generic over the byte source so the synchronization
/// logic is exercisable without a socket.
pub struct TcpTransport<S: Read> {
    stream: S,
    framing: TcpFraming,
    scan_budget: usize,
    synced: bool,
    buf: Vec<u8>,
    context: VolumeContext,
}

impl TcpTransport<TcpStream> {
    /// Connect to the radar stream with the configured read timeout.
    pub fn connect(cfg: &TcpConfig) -> RelayResult<Self> {
        let stream = TcpStream::connect((cfg.host.as_str(), cfg.port))
            .map_err(RelayError::DeviceOpen)?;
        stream
            .set_read_timeout(Some(Duration::from_secs(cfg.read_timeout_secs)))
            .map_err(RelayError::DeviceOpen)?;
        info!(host = %cfg.host, port = cfg.port, "Connected to radar stream");
        Ok(Self::over(
            stream,
            cfg.framing,
            cfg.scan_budget,
            &format!("{}:{}", cfg.host, cfg.port),
        ))
    }
}

impl<S: Read> TcpTransport<S> {
    pub fn over(stream: S, framing: TcpFraming, scan_budget: usize, source: &str) -> Self {
        let mut context = VolumeContext::default();
        context.source = source.to_string();
        Self {
            stream,
            framing,
            scan_budget,
            synced: false,
            buf: vec![0u8; PACKET_SIZE],
            context,
        }
    }

    fn fill(&mut self, range: std::ops::Range<usize>) -> Result<(), TransportStatus> {
        self.stream
            .read_exact(&mut self.buf[range])
            .map_err(|e| read_status(&e))
    }

    /// Slide a one-byte-at-a-time window over the stream until the window
    /// holds a plausible header, then pull in the rest of that record.
    fn resync(&mut self) -> Result<(), TransportStatus> {
        const WINDOW: usize = CTM_SIZE + MESSAGE_HEADER_SIZE;
        self.fill(0..WINDOW)?;

        let mut scanned = 0usize;
        loop {
            let plausible = MessageHeader::parse(&self.buf[..WINDOW])
                .map(|h| h.is_plausible())
                .unwrap_or(false);
            if plausible {
                break;
            }
            if scanned >= self.scan_budget {
                warn!(
                    source = %self.context.source,
                    scanned,
                    "No plausible header within the scan budget"
                );
                return Err(TransportStatus::BadData);
            }
            self.buf.copy_within(1..WINDOW, 0);
            self.fill(WINDOW - 1..WINDOW)?;
            scanned += 1;
        }

        if scanned > 0 {
            info!(source = %self.context.source, skipped = scanned, "Stream resynchronized");
        }
        self.fill(WINDOW..PACKET_SIZE)?;
        self.synced = true;
        Ok(())
    }
}

fn read_status(e: &io::Error) -> TransportStatus {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => TransportStatus::EndOfData,
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            warn!(error = %e, "Radar stream read timed out");
            TransportStatus::BadInputStream
        }
        _ => {
            warn!(error = %e, "Radar stream read failed");
            TransportStatus::BadInputStream
        }
    }
}

impl<S: Read> Transport for TcpTransport<S> {
    fn next_message(&mut self) -> (TransportStatus, Option<RawMessage<'_>>) {
        let mut filler_run = 0usize;
        loop {
            if !self.synced {
                if let Err(status) = self.resync() {
                    return (status, None);
                }
            } else if let Err(status) = self.fill(0..PACKET_SIZE) {
                return (status, None);
            }

            let header = match MessageHeader::parse(&self.buf) {
                Ok(h) => h,
                Err(_) => {
                    self.synced = false;
                    return (TransportStatus::BadData, None);
                }
            };

            if header.is_plausible() {
                if header.kind == MessageKind::DigitalRadarData {
                    return (
                        TransportStatus::Ok,
                        Some(RawMessage {
                            data: &self.buf,
                            kind: header.kind,
                            volume_title_seen: false,
                        }),
                    );
                }
                debug!(
                    msg_type = header.kind.type_code(),
                    "Skipping record of uninteresting type"
                );
                continue;
            }

            if self.framing == TcpFraming::FrontPadded && header.message_len == FILLER_SENTINEL {
                filler_run += 1;
                if filler_run > MAX_FILLER_BLOCKS {
                    warn!(filler_run, "Filler run too long, resynchronizing");
                    self.synced = false;
                    return (TransportStatus::BadData, None);
                }
                debug!(filler_run, "Consumed front-padding block");
                continue;
            }

            // Mid-stream garbage: drop sync and let the caller retry.
            self.synced = false;
            return (TransportStatus::BadData, None);
        }
    }

    fn context(&self) -> &VolumeContext {
        &self.context
    }
}
