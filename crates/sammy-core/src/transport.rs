//! USB transport: discovers download-mode devices and exposes blocking
//! bulk-in/bulk-out byte channels with per-operation timeouts.

use std::time::Duration;

use rusb::{Direction, GlobalContext, TransferType, UsbContext};

use crate::error::{DiscoveryError, TransportError};

/// Samsung's USB vendor id, fixed across all download-mode product ids.
pub const SAMSUNG_VENDOR_ID: u16 = 0x04e8;

/// Known download-mode product ids and their human-readable labels.
pub const DOWNLOAD_MODE_PRODUCT_IDS: &[(u16, &str)] = &[
    (0x6601, "Download Mode"),
    (0x685d, "Download Mode (Newer)"),
    (0x6860, "Download Mode (S3/S4)"),
    (0x68c3, "Download Mode (Note)"),
    (0x685e, "Download Mode (Alternative)"),
];

fn label_for_product_id(product_id: u16) -> Option<&'static str> {
    DOWNLOAD_MODE_PRODUCT_IDS
        .iter()
        .find(|(id, _)| *id == product_id)
        .map(|(_, label)| *label)
}

/// The operating mode a Samsung device is currently believed to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Normal,
    Download,
    Recovery,
}

/// A USB device candidate discovered on the bus. Produced by [`discover`],
/// consumed read-only by [`connect`].
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub address: u8,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub mode: DeviceMode,
}

impl DeviceDescriptor {
    pub fn label(&self) -> &'static str {
        label_for_product_id(self.product_id).unwrap_or("Unknown Download Mode")
    }
}

/// Enumerates every USB device on the bus matching Samsung's vendor id and a
/// known download-mode product id. Discovery is stateless and read-only.
pub fn discover() -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
    let mut found = Vec::new();

    for device in rusb::devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        if desc.vendor_id() != SAMSUNG_VENDOR_ID {
            continue;
        }
        if label_for_product_id(desc.product_id()).is_none() {
            continue;
        }

        let (model, serial_number) = match device.open() {
            Ok(handle) => {
                let timeout = Duration::from_millis(500);
                let model = handle
                    .read_languages(timeout)
                    .ok()
                    .and_then(|langs| langs.first().copied())
                    .and_then(|lang| handle.read_product_string(lang, &desc, timeout).ok());
                let serial_number = handle
                    .read_languages(timeout)
                    .ok()
                    .and_then(|langs| langs.first().copied())
                    .and_then(|lang| {
                        handle
                            .read_serial_number_string(lang, &desc, timeout)
                            .ok()
                    });
                (model, serial_number)
            }
            Err(_) => (None, None),
        };

        log::debug!(
            "found candidate device bus={} address={} vid={:#06x} pid={:#06x}",
            device.bus_number(),
            device.address(),
            desc.vendor_id(),
            desc.product_id(),
        );

        found.push(DeviceDescriptor {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            bus_number: device.bus_number(),
            address: device.address(),
            model,
            serial_number,
            mode: DeviceMode::Download,
        });
    }

    Ok(found)
}

/// A blocking byte channel to a claimed USB interface. Mockable for tests;
/// [`RusbTransport`] is the real implementation used against hardware.
pub trait UsbTransport {
    /// Writes `bytes` to the bulk-OUT endpoint, blocking up to `timeout`.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Reads exactly `len` bytes from the bulk-IN endpoint, blocking up to
    /// `timeout`. A short transfer is a [`TransportError::ShortRead`], not a
    /// partial success.
    fn read(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// A claimed USB interface plus its bulk endpoints, backed by `rusb`.
pub struct RusbTransport {
    handle: rusb::DeviceHandle<GlobalContext>,
    interface_number: u8,
    in_address: u8,
    out_address: u8,
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(self.interface_number);
    }
}

struct MassStorageLikeEndpoints {
    interface_number: u8,
    in_address: u8,
    out_address: u8,
}

fn find_endpoints(
    device: &rusb::Device<GlobalContext>,
) -> Result<MassStorageLikeEndpoints, DiscoveryError> {
    let config_desc = device
        .active_config_descriptor()
        .or_else(|_| device.config_descriptor(0))?;

    for interface in config_desc.interfaces() {
        for interface_desc in interface.descriptors() {
            if interface_desc.interface_number() != 0 {
                continue;
            }

            let mut in_address = None;
            let mut out_address = None;

            for endpoint in interface_desc.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    Direction::In => in_address = Some(endpoint.address()),
                    Direction::Out => out_address = Some(endpoint.address()),
                }
            }

            if let (Some(in_address), Some(out_address)) = (in_address, out_address) {
                return Ok(MassStorageLikeEndpoints {
                    interface_number: interface_desc.interface_number(),
                    in_address,
                    out_address,
                });
            }
        }
    }

    Err(DiscoveryError::NoBulkEndpoints)
}

impl RusbTransport {
    /// Opens the device named by `descriptor`, detaches any kernel driver on
    /// interface 0, selects the default configuration, claims the interface,
    /// and locates one bulk-OUT and one bulk-IN endpoint.
    pub fn open(descriptor: &DeviceDescriptor) -> Result<Self, DiscoveryError> {
        let device = rusb::devices()?
            .iter()
            .find(|d| {
                d.bus_number() == descriptor.bus_number && d.address() == descriptor.address
            })
            .ok_or(DiscoveryError::NoDeviceFound)?;

        let endpoints = find_endpoints(&device)?;

        let mut handle = device.open().map_err(|err| match err {
            rusb::Error::Access => DiscoveryError::PermissionDenied {
                bus: descriptor.bus_number,
                address: descriptor.address,
            },
            other => DiscoveryError::Usb(other),
        })?;

        if handle
            .kernel_driver_active(endpoints.interface_number)
            .unwrap_or(false)
        {
            handle
                .detach_kernel_driver(endpoints.interface_number)
                .ok();
        }

        handle.set_active_configuration(1).ok();

        handle
            .claim_interface(endpoints.interface_number)
            .map_err(|err| match err {
                rusb::Error::Busy => DiscoveryError::AlreadyClaimed {
                    bus: descriptor.bus_number,
                    address: descriptor.address,
                },
                rusb::Error::Access => DiscoveryError::PermissionDenied {
                    bus: descriptor.bus_number,
                    address: descriptor.address,
                },
                other => DiscoveryError::Usb(other),
            })?;

        log::info!(
            "claimed interface {} on bus {} address {}",
            endpoints.interface_number,
            descriptor.bus_number,
            descriptor.address
        );

        Ok(Self {
            handle,
            interface_number: endpoints.interface_number,
            in_address: endpoints.in_address,
            out_address: endpoints.out_address,
        })
    }
}

fn classify(err: rusb::Error, timeout: Duration) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout(timeout),
        rusb::Error::Pipe => TransportError::Stall,
        rusb::Error::NoDevice => TransportError::Disconnected,
        other => TransportError::Usb(other),
    }
}

impl UsbTransport for RusbTransport {
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        self.handle
            .write_bulk(self.out_address, bytes, timeout)
            .map_err(|err| classify(err, timeout))
    }

    fn read(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        let n = self
            .handle
            .read_bulk(self.in_address, &mut buf, timeout)
            .map_err(|err| classify(err, timeout))?;
        if n != len {
            return Err(TransportError::ShortRead { expected: len, got: n });
        }
        Ok(buf)
    }
}
