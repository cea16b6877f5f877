use anyhow::Result;
use sammy_core::discover;

pub fn devices() -> Result<()> {
    let devices = discover()?;

    if devices.is_empty() {
        log::info!("No Samsung download-mode devices found");
        return Ok(());
    }

    log::info!("Found {} device(s):", devices.len());
    for device in &devices {
        println!(
            "bus={:03} address={:03} vid={:#06x} pid={:#06x} ({}){}{}",
            device.bus_number,
            device.address,
            device.vendor_id,
            device.product_id,
            device.label(),
            device
                .model
                .as_ref()
                .map(|m| format!(" model={m}"))
                .unwrap_or_default(),
            device
                .serial_number
                .as_ref()
                .map(|s| format!(" serial={s}"))
                .unwrap_or_default(),
        );
    }

    Ok(())
}
