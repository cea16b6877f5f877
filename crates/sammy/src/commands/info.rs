use sammy_core::error::DiscoveryError;
use sammy_core::transport::RusbTransport;
use sammy_core::Session;

pub fn info() -> anyhow::Result<()> {
    let devices = sammy_core::discover()?;
    let descriptor = devices.first().ok_or(DiscoveryError::NoDeviceFound)?;

    println!(
        "device: {} (bus {:03} address {:03})",
        descriptor.label(),
        descriptor.bus_number,
        descriptor.address,
    );
    if let Some(model) = &descriptor.model {
        println!("model: {model}");
    }
    if let Some(serial) = &descriptor.serial_number {
        println!("serial: {serial}");
    }

    let mut session = Session::<RusbTransport>::connect(descriptor)?;
    let result = (|| -> Result<sammy_core::DeviceInfo, sammy_core::EngineError> {
        session.handshake()?;
        session.device_info()
    })();
    session.disconnect();
    let device_info = result?;

    match device_info.device_type() {
        Some(t) => println!("device type: {t:#010x}"),
        None => println!("device type: (unavailable, payload too short)"),
    }
    match device_info.bootloader_version() {
        Some(v) => println!("bootloader version: {v:#010x}"),
        None => println!("bootloader version: (unavailable, payload too short)"),
    }

    Ok(())
}
