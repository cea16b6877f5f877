use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::Level;
use sammy_core::EngineError;

use crate::commands::flash::{FlashArgs, SlotArg};

pub mod commands;
pub mod progress_bar;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None, author = "the sammy maintainers")]
struct Opts {
    /// Verbose (debug-level) logging
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List Samsung download-mode USB devices currently attached
    Devices,
    /// Retrieve the device's PIT (partition information table)
    Pit {
        /// Write the raw PIT image here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Flash one or more partitions
    Flash {
        /// A partition to flash, as NAME=PATH. Repeatable.
        #[clap(long = "slot", value_name = "NAME=PATH")]
        slots: Vec<SlotArg>,

        /// Reboot the device once every slot has flashed
        #[clap(long)]
        auto_reboot: bool,

        /// Abort before any device I/O if a source fails its MD5 sidecar check
        #[clap(long)]
        verify: bool,

        /// Bytes per FLASH_SEND_DATA frame
        #[clap(long, default_value = "1m")]
        chunk_size: sammy_core::ChunkSize,
    },
    /// Print the connected device's type and bootloader version
    Info,
}

fn init_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .format(|buf, record| {
                use std::io::Write;
                let level = record.level();
                if level == Level::Info {
                    writeln!(buf, "{}", record.args())
                } else {
                    writeln!(buf, "{}: {}", record.level(), record.args())
                }
            })
            .init();
    }
}

/// Maps a failure to the process exit code spelled out for this tool: 0
/// success, 1 usage, 2 no device, 3 handshake failure, 4 flash failure, 5
/// verification failure.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        return match engine_err {
            EngineError::Discovery(_) => 2,
            EngineError::Protocol(_) | EngineError::State(_) => 3,
            EngineError::Integrity(_) => 5,
            EngineError::Transport(_)
            | EngineError::Package(_)
            | EngineError::Cancelled(_)
            | EngineError::Unsupported(_) => 4,
        };
    }
    1
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    let result = match opts.command {
        Command::Devices => commands::devices::devices(),
        Command::Pit { output } => commands::pit::pit(output),
        Command::Flash {
            slots,
            auto_reboot,
            verify,
            chunk_size,
        } => commands::flash::flash(FlashArgs {
            slots,
            auto_reboot,
            verify,
            chunk_size,
        }),
        Command::Info => commands::info::info(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn flash_parses_repeated_slots_and_flags() {
        let opts = Opts::try_parse_from([
            "sammy",
            "flash",
            "--slot=BOOT=boot.img",
            "--slot=SYSTEM=system.img",
            "--verify",
            "--auto-reboot",
            "--chunk-size=2m",
        ])
        .unwrap();

        match opts.command {
            Command::Flash {
                slots,
                auto_reboot,
                verify,
                chunk_size,
            } => {
                assert_eq!(slots.len(), 2);
                assert_eq!(slots[0].slot, "BOOT");
                assert_eq!(slots[1].slot, "SYSTEM");
                assert!(auto_reboot);
                assert!(verify);
                assert_eq!(chunk_size.bytes(), 2 * 1024 * 1024);
            }
            other => panic!("expected Flash, got {other:?}"),
        }
    }

    #[test]
    fn flash_defaults_chunk_size_to_one_megabyte() {
        let opts = Opts::try_parse_from(["sammy", "flash", "--slot=BOOT=boot.img"]).unwrap();
        match opts.command {
            Command::Flash { chunk_size, .. } => {
                assert_eq!(chunk_size.bytes(), 1024 * 1024);
            }
            other => panic!("expected Flash, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_slot_argument() {
        let err = Opts::try_parse_from(["sammy", "flash", "--slot=no-equals-sign"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_invalid_chunk_size() {
        let err =
            Opts::try_parse_from(["sammy", "flash", "--slot=BOOT=boot.img", "--chunk-size=3m"])
                .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn pit_defaults_to_stdout() {
        let opts = Opts::try_parse_from(["sammy", "pit"]).unwrap();
        match opts.command {
            Command::Pit { output } => assert!(output.is_none()),
            other => panic!("expected Pit, got {other:?}"),
        }
    }
}
