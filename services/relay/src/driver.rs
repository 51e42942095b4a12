//! Transport construction and the single-threaded pull loop.

use std::time::Duration;

use tracing::{debug, info};

#[cfg(test)]
use level2_wire::Compression;
use pipeline::{BeamQueue, OutputMux, ShiftRegister};
use radar_common::{RelayError, RelayResult, TransportStatus};
use transport::{
    DirTemplate, LdmConfig, LdmTransport, NameTemplate, TapeTransport, TcpTransport, Transport,
};

use crate::config::InputConfig;
use crate::reformat::Reformatter;

/// Build the configured transport. Resource-acquisition failures here are
/// immediately fatal; everything after this point prefers skip-and-continue.
pub fn build_transport(input: &InputConfig) -> RelayResult<Box<dyn Transport>> {
    match input {
        InputConfig::Archive {
            files,
            compression,
            one_file_per_volume,
        } => {
            if files.is_empty() {
                return Err(RelayError::InvalidConfig(
                    "archive mode needs at least one input file".to_string(),
                ));
            }
            info!(files = files.len(), "Reading archive file list");
            let mut cfg = LdmConfig::archive(files.clone(), *compression);
            cfg.one_file_per_volume = *one_file_per_volume;
            Ok(Box::new(LdmTransport::new(cfg)))
        }
        InputConfig::Realtime {
            base_dir,
            dir_template,
            name_template,
            compression,
            quiescence_secs,
            min_file_size,
            max_valid_age_secs,
            max_search_minutes,
            one_file_per_volume,
        } => {
            let mut cfg = LdmConfig::realtime(
                base_dir.clone(),
                dir_template.as_ref().map(|s| DirTemplate::new(s.as_str())),
                NameTemplate::new(name_template.as_str()),
                *compression,
            );
            cfg.quiescence = Duration::from_secs(*quiescence_secs);
            cfg.min_file_size = *min_file_size;
            cfg.max_valid_age = Duration::from_secs(*max_valid_age_secs);
            cfg.max_search_time = Duration::from_secs(max_search_minutes * 60);
            cfg.one_file_per_volume = *one_file_per_volume;
            info!(base_dir = %base_dir.display(), "Watching realtime feed");
            Ok(Box::new(LdmTransport::new(cfg)))
        }
        InputConfig::Tcp(cfg) => Ok(Box::new(TcpTransport::connect(cfg)?)),
        InputConfig::Tape(cfg) => Ok(Box::new(TapeTransport::new(cfg)?)),
    }
}

/// The pull loop: read a message, reformat it, derive terminal flags for
/// the buffered beam, publish, shift. One beam of lag throughout, so the
/// buffered beam is flushed with terminal flags when the data ends.
pub fn run(
    transport: &mut dyn Transport,
    reformatter: &mut dyn Reformatter,
    register: &mut ShiftRegister,
    mux: &mut OutputMux,
    queue: &mut dyn BeamQueue,
) -> RelayResult<()> {
    loop {
        let (status, msg) = transport.next_message();
        match status {
            TransportStatus::Ok => {
                let Some(raw) = msg else { continue };
                let beam = match reformatter.reformat(&raw) {
                    Ok(beam) => beam,
                    Err(e) => {
                        debug!(error = %e, "Skipping undecodable message");
                        continue;
                    }
                };
                register.load(beam);
                register.note_terminal_flags();
                if register.primed() {
                    mux.publish(
                        register.output(),
                        register.changes(),
                        register.fields_replaced(),
                        queue,
                    )?;
                }
                register.shift();
            }
            TransportStatus::BadData => {
                debug!("Skipping bad record");
            }
            TransportStatus::EndOfFile => {
                debug!(source = %transport.context().source, "Medium exhausted, advancing");
            }
            TransportStatus::EndOfData => {
                if register.primed() {
                    register.flush();
                    mux.publish(
                        register.output(),
                        register.changes(),
                        register.fields_replaced(),
                        queue,
                    )?;
                }
                info!(
                    source = %transport.context().source,
                    volume_complete = transport.context().volume_complete(),
                    "End of data"
                );
                return Ok(());
            }
            TransportStatus::BadInputStream => {
                return Err(RelayError::bad_input(
                    transport.context().source.clone(),
                    "retry or search budget exhausted",
                ));
            }
        }
    }
}
