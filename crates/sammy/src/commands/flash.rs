use std::path::PathBuf;

use anyhow::{bail, Context};
use sammy_core::{ChunkSize, Engine, FlashSource, OrchestratorOptions, VerifyPolicy};

use crate::progress_bar::ProgressBarSink;

/// One `--slot=NAME=path` argument.
#[derive(Debug, Clone)]
pub struct SlotArg {
    pub slot: String,
    pub path: PathBuf,
}

impl std::str::FromStr for SlotArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slot, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=PATH, got '{s}'"))?;
        if slot.is_empty() {
            return Err(format!("empty slot name in '{s}'"));
        }
        Ok(SlotArg {
            slot: slot.to_string(),
            path: PathBuf::from(path),
        })
    }
}

pub struct FlashArgs {
    pub slots: Vec<SlotArg>,
    pub auto_reboot: bool,
    pub verify: bool,
    pub chunk_size: ChunkSize,
}

pub fn flash(args: FlashArgs) -> anyhow::Result<()> {
    if args.slots.is_empty() {
        bail!("flash requires at least one --slot=NAME=PATH");
    }

    let sources: Vec<FlashSource> = args
        .slots
        .iter()
        .map(|s| FlashSource {
            slot: s.slot.clone(),
            path: s.path.clone(),
        })
        .collect();

    for source in &sources {
        if !source.path.exists() {
            bail!("source path does not exist: {}", source.path.display());
        }
    }

    let policy = if args.verify {
        VerifyPolicy::Strict
    } else {
        VerifyPolicy::Warn
    };

    sammy_core::orchestrator::verify_sources(&sources, policy)
        .context("verifying firmware source integrity")?;

    let options = OrchestratorOptions {
        auto_reboot: args.auto_reboot,
        verify: policy,
        chunk_size: args.chunk_size,
    };

    let mut progress = ProgressBarSink::new();
    let cancel = sammy_core::CancelToken::new();

    Engine::Native.flash(&sources, &options, &mut progress, &cancel)?;

    log::info!("flash complete");
    Ok(())
}
