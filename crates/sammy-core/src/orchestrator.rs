//! Given `{slot -> path}`, sequences parsing, verification, connection,
//! handshake, per-partition flash, and reboot.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{EngineError, IntegrityError};
use crate::flasher::{CancelToken, ChunkSize, ProgressSink};
use crate::package::{self, Integrity};
use crate::session::Session;
use crate::transport::{self, DeviceDescriptor, RusbTransport};

/// How strictly integrity-check failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPolicy {
    /// Skip integrity checks entirely.
    Off,
    /// Check and log, but proceed regardless of the verdict.
    Warn,
    /// Abort before any device I/O if any verdict is invalid.
    Strict,
}

/// One slot of the flash job: a source path, which may be a single firmware
/// file or an archive to expand into sub-slots.
#[derive(Debug, Clone)]
pub struct FlashSource {
    pub slot: String,
    pub path: PathBuf,
}

/// Options governing an orchestrated flash run.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub auto_reboot: bool,
    pub verify: VerifyPolicy,
    pub chunk_size: ChunkSize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            auto_reboot: false,
            verify: VerifyPolicy::Warn,
            chunk_size: ChunkSize::default(),
        }
    }
}

fn is_tar_archive(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tar"))
        .unwrap_or(false)
}

/// Verifies every source per §4.6, recording an (source, verdict) pair per
/// file. Package errors (unreadable files) fail before any device I/O,
/// which this function performs entirely — callers run it before
/// [`run`].
pub fn verify_sources(
    sources: &[FlashSource],
    policy: VerifyPolicy,
) -> Result<Vec<(FlashSource, Integrity)>, EngineError> {
    let mut verdicts = Vec::with_capacity(sources.len());

    if policy == VerifyPolicy::Off {
        for source in sources {
            verdicts.push((source.clone(), Integrity::NoSidecar));
        }
        return Ok(verdicts);
    }

    for source in sources {
        let verdict = package::verify_integrity(&source.path)?;
        match verdict {
            Integrity::Valid => log::info!("{}: integrity OK", source.path.display()),
            Integrity::NoSidecar => log::debug!("{}: no sidecar digest", source.path.display()),
            Integrity::Invalid => {
                log::warn!("{}: integrity check FAILED", source.path.display());
                if policy == VerifyPolicy::Strict {
                    return Err(IntegrityError::Mismatch {
                        path: source.path.display().to_string(),
                        expected: "(see log)".to_string(),
                        computed: "(see log)".to_string(),
                    }
                    .into());
                }
            }
        }
        verdicts.push((source.clone(), verdict));
    }

    Ok(verdicts)
}

/// Expands `source` into `{slot -> bytes}`: a tar archive is parsed with
/// [`package::extract_archive`], anything else is read whole under its own
/// slot name.
fn load_source(source: &FlashSource) -> Result<BTreeMap<String, Vec<u8>>, EngineError> {
    if is_tar_archive(&source.path) {
        Ok(package::extract_archive(&source.path)?)
    } else {
        let data = fs::read(&source.path).map_err(|err| crate::error::PackageError::File {
            path: source.path.display().to_string(),
            source: err,
        })?;
        let mut map = BTreeMap::new();
        map.insert(source.slot.clone(), data);
        Ok(map)
    }
}

/// Runs the full flash job: discover -> connect -> handshake -> flash each
/// source in order -> optional reboot -> unconditional disconnect. Stops on
/// the first failure. Integrity verification (per [`verify_sources`]) is
/// expected to have already run; this function performs device I/O only.
pub fn run(
    sources: &[FlashSource],
    options: &OrchestratorOptions,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    let devices = transport::discover()?;
    let descriptor: &DeviceDescriptor = devices
        .first()
        .ok_or(crate::error::DiscoveryError::NoDeviceFound)?;

    log::info!(
        "connecting to {} (bus {}, address {})",
        descriptor.label(),
        descriptor.bus_number,
        descriptor.address
    );

    let mut session = Session::<RusbTransport>::connect(descriptor)?;
    let flash_result = (|| -> Result<(), EngineError> {
        session.handshake()?;

        for source in sources {
            let slots = load_source(source)?;
            for (slot, data) in slots {
                session.flash_partition(&slot, &data, options.chunk_size, progress, cancel)?;
            }
        }

        if options.auto_reboot {
            session.reboot()?;
        }

        Ok(())
    })();

    session.disconnect();
    flash_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_sources_off_policy_skips_checks() {
        let sources = vec![FlashSource {
            slot: "BL".to_string(),
            path: PathBuf::from("/nonexistent/path/that/is/never/read"),
        }];
        let verdicts = verify_sources(&sources, VerifyPolicy::Off).unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].1, Integrity::NoSidecar);
    }

    #[test]
    fn verify_sources_strict_fails_before_device_io_on_mismatch() {
        let dir = std::env::temp_dir().join(format!(
            "sammy-core-orch-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("BL.bin");
        std::fs::write(&file_path, b"firmware bytes").unwrap();
        std::fs::write(
            dir.join("BL.bin.md5"),
            "00000000000000000000000000000000 BL.bin",
        )
        .unwrap();

        let sources = vec![FlashSource {
            slot: "BL".to_string(),
            path: file_path,
        }];

        let result = verify_sources(&sources, VerifyPolicy::Strict);
        assert!(matches!(result, Err(EngineError::Integrity(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
