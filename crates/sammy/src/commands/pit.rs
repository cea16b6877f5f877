use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use sammy_core::error::DiscoveryError;
use sammy_core::transport::RusbTransport;
use sammy_core::Session;

pub fn pit(output: Option<PathBuf>) -> anyhow::Result<()> {
    let devices = sammy_core::discover()?;
    let descriptor = devices.first().ok_or(DiscoveryError::NoDeviceFound)?;

    let mut session = Session::<RusbTransport>::connect(descriptor)?;
    let result = (|| -> Result<Vec<u8>, sammy_core::EngineError> {
        session.handshake()?;
        session.get_pit()
    })();
    session.disconnect();
    let pit = result?;

    match output {
        Some(path) => {
            fs::write(&path, &pit).with_context(|| format!("writing {}", path.display()))?;
            log::info!("wrote {} bytes to {}", pit.len(), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&pit)?;
        }
    }

    Ok(())
}
