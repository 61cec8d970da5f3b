//! Serial port handling
//!
//! Opens the terminal's download port and lists candidate devices.

use serialport::{SerialPortInfo, SerialPortType};
use std::time::Duration;
use tracing::debug;

use super::{ProtocolError, SerialChannel};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product)
            }
            _ => (None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// USB adapters first, then everything else, each group sorted by name
fn port_sort_key(port: &PortInfo) -> (u8, String) {
    let group = if port.vid.is_some() { 0 } else { 1 };
    (group, port.name.clone())
}

/// List all available serial ports in a deterministic order
pub fn list_ports() -> Result<Vec<PortInfo>, ProtocolError> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .map_err(|e| ProtocolError::Serial(e.to_string()))?
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(port_sort_key);
    Ok(ports)
}

/// Open the download port as a non-blocking 8N1 channel
pub fn open_port(name: &str, baud_rate: u32) -> Result<SerialChannel, ProtocolError> {
    debug!("opening {} at {} baud", name, baud_rate);

    // Zero timeout: reads return immediately with whatever is buffered
    let port = serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::ZERO)
        .open()
        .map_err(|e| ProtocolError::Serial(format!("{}: {}", name, e)))?;

    Ok(SerialChannel::new(port))
}
