//! Opens a firmware tape-archive, classifies members into partition slots
//! by filename heuristic, and verifies an optional sidecar MD5 digest.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::PackageError;

/// Case-insensitive substring rules, first match wins, in priority order.
const SLOT_RULES: &[(&[&str], &str)] = &[
    (&["boot"], "BOOT"),
    (&["recovery"], "RECOVERY"),
    (&["system"], "SYSTEM"),
    (&["userdata"], "USERDATA"),
    (&["cache"], "CACHE"),
    (&["modem", "cp"], "MODEM"),
    (&["sboot", "bl"], "BOOTLOADER"),
];

/// Classifies an archive member's filename into a partition slot, following
/// the priority table above. Falls back to the uppercased basename without
/// extension.
pub fn classify_slot(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    for (needles, slot) in SLOT_RULES {
        if needles.iter().any(|needle| lower.contains(needle)) {
            return (*slot).to_string();
        }
    }

    let basename = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    basename.to_ascii_uppercase()
}

/// Opens `path` as a POSIX tar archive and returns `{slot: bytes}` for every
/// regular-file member.
pub fn extract_archive(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, PackageError> {
    let file = File::open(path).map_err(|source| PackageError::Open {
        path: path.display().to_string(),
        source,
    })?;

    let mut archive = tar::Archive::new(file);
    let mut slots = BTreeMap::new();

    let entries = archive.entries().map_err(|source| PackageError::Open {
        path: path.display().to_string(),
        source,
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|source| PackageError::Member {
            name: path.display().to_string(),
            source,
        })?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry
            .path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|source| PackageError::Member {
                name: name.clone(),
                source,
            })?;

        let slot = classify_slot(&name);
        log::debug!("archive member '{name}' classified as slot {slot}");
        slots.insert(slot, data);
    }

    Ok(slots)
}

/// The integrity verdict for a file checked against an optional `.md5`
/// sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// Sidecar present and digest matched.
    Valid,
    /// Sidecar present and digest did not match.
    Invalid,
    /// No sidecar file; considered valid by policy.
    NoSidecar,
}

impl Integrity {
    pub fn is_ok(self) -> bool {
        !matches!(self, Integrity::Invalid)
    }
}

fn compute_md5(path: &Path) -> Result<String, PackageError> {
    let mut file = File::open(path).map_err(|source| PackageError::File {
        path: path.display().to_string(),
        source,
    })?;

    let mut hasher = Md5::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf).map_err(|source| PackageError::File {
            path: path.display().to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Checks `path` against `path.md5` if it exists: the sidecar's first
/// whitespace-delimited token is the expected hex digest, compared
/// case-insensitively against the computed MD5 of `path`. Absent sidecar is
/// [`Integrity::NoSidecar`], which callers treat as valid by default.
pub fn verify_integrity(path: &Path) -> Result<Integrity, PackageError> {
    let sidecar_path = {
        let mut s = path.as_os_str().to_owned();
        s.push(".md5");
        std::path::PathBuf::from(s)
    };

    if !sidecar_path.exists() {
        return Ok(Integrity::NoSidecar);
    }

    let sidecar = std::fs::read_to_string(&sidecar_path).map_err(|source| PackageError::File {
        path: sidecar_path.display().to_string(),
        source,
    })?;

    let expected = sidecar
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let computed = compute_md5(path)?;

    if computed.eq_ignore_ascii_case(&expected) {
        Ok(Integrity::Valid)
    } else {
        log::warn!(
            "MD5 mismatch for {}: expected {expected}, computed {computed}",
            path.display()
        );
        Ok(Integrity::Invalid)
    }
}
