//! OS serial ports via the `serialport` crate

use std::io::{self, Read, Write};
use std::time::Duration;

use autodrive_core::config::ChannelConfig;
use autodrive_core::link::{LinkError, PortCandidate, SerialConnector, SerialLink};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

use crate::ConnectorError;

/// Longest device line kept; longer output is split
const MAX_LINE_BYTES: usize = 256;

/// Bytes read from the port per call
const READ_CHUNK: usize = 64;

/// List the OS serial ports
pub fn discover_ports() -> Result<Vec<PortCandidate>, ConnectorError> {
    let ports =
        serialport::available_ports().map_err(|e| ConnectorError::Enumeration(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|info| PortCandidate::new(info.port_name, describe(&info.port_type)))
        .collect())
}

/// List the OS serial ports whose description or name contains `pattern`
pub fn discover_matching(pattern: &str) -> Result<Vec<PortCandidate>, ConnectorError> {
    let matching = filter_candidates(discover_ports()?, pattern);
    if matching.is_empty() {
        return Err(ConnectorError::NoMatchingPort(pattern.to_string()));
    }
    Ok(matching)
}

fn filter_candidates(candidates: Vec<PortCandidate>, pattern: &str) -> Vec<PortCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.matches(pattern))
        .collect()
}

/// Human-readable port description
///
/// USB adapters always mention "USB" so the default port pattern selects them.
pub fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let mut description = String::from("USB Serial");
            for part in [&usb.manufacturer, &usb.product].into_iter().flatten() {
                description.push(' ');
                description.push_str(part);
            }
            description.push_str(&format!(" ({:04x}:{:04x})", usb.vid, usb.pid));
            description
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "serial".to_string(),
    }
}

/// Opens ports at the channel's baud rate, 8N1, no flow control
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortConnector {
    /// Connector with explicit settings
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
        }
    }

    /// Connector using the channel configuration's baud rate and timeout
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.baud_rate,
            Duration::from_millis(config.read_timeout_ms),
        )
    }
}

impl SerialConnector for SerialPortConnector {
    fn open(&mut self, port: &PortCandidate) -> Result<Box<dyn SerialLink>, LinkError> {
        log::debug!("Opening {} at {} baud", port.name, self.baud_rate);
        let opened = serialport::new(port.name.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| LinkError::Open {
                port: port.name.clone(),
                detail: e.to_string(),
            })?;
        Ok(Box::new(SerialPortLink::new(opened)))
    }
}

/// Splits a byte stream into lines
///
/// `\n` terminates a line, a trailing `\r` is dropped and invalid UTF-8 is
/// replaced. Lines longer than [`MAX_LINE_BYTES`] are emitted in pieces.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
    ready: std::collections::VecDeque<String>,
}

impl LineAssembler {
    /// Empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                self.finish_line();
            } else {
                self.partial.push(byte);
                if self.partial.len() >= MAX_LINE_BYTES {
                    self.finish_line();
                }
            }
        }
    }

    fn finish_line(&mut self) {
        if self.partial.last() == Some(&b'\r') {
            self.partial.pop();
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        self.ready.push_back(line);
    }

    /// Next complete line
    pub fn pop_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Buffered bytes, complete lines included
    pub fn buffered(&self) -> usize {
        self.partial.len() + self.ready.iter().map(|l| l.len() + 1).sum::<usize>()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.partial.clear();
        self.ready.clear();
    }
}

/// [`SerialLink`] over an open OS port
pub struct SerialPortLink {
    port: Option<Box<dyn SerialPort>>,
    lines: LineAssembler,
}

impl SerialPortLink {
    /// Wrap an open port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port: Some(port),
            lines: LineAssembler::new(),
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::Closed)
    }
}

/// Map an I/O error, treating a vanished device as closed
fn classify(error: io::Error, wrap: fn(String) -> LinkError) -> LinkError {
    match error.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotFound => LinkError::Closed,
        _ => wrap(error.to_string()),
    }
}

fn classify_port(error: serialport::Error, wrap: fn(String) -> LinkError) -> LinkError {
    match error.kind() {
        serialport::ErrorKind::NoDevice => LinkError::Closed,
        serialport::ErrorKind::Io(kind) => classify(io::Error::new(kind, error.description), wrap),
        _ => wrap(error.to_string()),
    }
}

impl SerialLink for SerialPortLink {
    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.port()?
            .write_all(line.as_bytes())
            .map_err(|e| classify(e, LinkError::Write))
    }

    fn flush(&mut self) -> Result<(), LinkError> {
        self.port()?
            .flush()
            .map_err(|e| classify(e, LinkError::Write))
    }

    fn bytes_available(&mut self) -> Result<usize, LinkError> {
        let pending = self
            .port()?
            .bytes_to_read()
            .map_err(|e| classify_port(e, LinkError::Read))?;
        Ok(pending as usize + self.lines.buffered())
    }

    fn read_line(&mut self) -> nb::Result<String, LinkError> {
        if let Some(line) = self.lines.pop_line() {
            return Ok(line);
        }

        let port = self.port().map_err(nb::Error::Other)?;
        let pending = port
            .bytes_to_read()
            .map_err(|e| nb::Error::Other(classify_port(e, LinkError::Read)))?;
        if pending == 0 {
            return Err(nb::Error::WouldBlock);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let want = (pending as usize).min(READ_CHUNK);
        match port.read(&mut chunk[..want]) {
            Ok(0) => return Err(nb::Error::Other(LinkError::Closed)),
            Ok(n) => self.lines.extend(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(nb::Error::Other(classify(e, LinkError::Read))),
        }

        self.lines.pop_line().ok_or(nb::Error::WouldBlock)
    }

    fn clear_buffers(&mut self) -> Result<(), LinkError> {
        self.lines.clear();
        self.port()?
            .clear(ClearBuffer::All)
            .map_err(|e| classify_port(e, LinkError::Read))
    }

    fn close(&mut self) -> Result<(), LinkError> {
        match self.port.take() {
            Some(port) => {
                log::debug!("Closing {}", port.name().unwrap_or_default());
                Ok(())
            }
            None => Err(LinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb(manufacturer: Option<&str>, product: Option<&str>) -> SerialPortType {
        SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x1a86,
            pid: 0x7523,
            serial_number: None,
            manufacturer: manufacturer.map(str::to_string),
            product: product.map(str::to_string),
        })
    }

    #[test]
    fn test_usb_description_matches_default_pattern() {
        let description = describe(&usb(Some("QinHeng"), Some("CH340")));
        assert_eq!(description, "USB Serial QinHeng CH340 (1a86:7523)");
        let candidate = PortCandidate::new("/dev/ttyUSB0", description);
        assert!(candidate.matches("USB"));

        assert_eq!(describe(&usb(None, None)), "USB Serial (1a86:7523)");
    }

    #[test]
    fn test_non_usb_ports_are_not_selected() {
        let candidates = vec![
            PortCandidate::new("/dev/ttyS0", describe(&SerialPortType::Unknown)),
            PortCandidate::new("/dev/rfcomm0", describe(&SerialPortType::BluetoothPort)),
            PortCandidate::new("/dev/ttyACM0", describe(&usb(None, Some("Arduino")))),
        ];

        let matching = filter_candidates(candidates, "USB");
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].name, "/dev/ttyACM0");
    }

    #[test]
    fn test_assembler_splits_lines() {
        let mut lines = LineAssembler::new();
        lines.extend(b"ready\r\nspe");
        assert_eq!(lines.pop_line().as_deref(), Some("ready"));
        assert_eq!(lines.pop_line(), None);

        lines.extend(b"ed 450\n\n");
        assert_eq!(lines.pop_line().as_deref(), Some("speed 450"));
        assert_eq!(lines.pop_line().as_deref(), Some(""));
        assert_eq!(lines.buffered(), 0);
    }

    #[test]
    fn test_assembler_bounds_runaway_lines() {
        let mut lines = LineAssembler::new();
        lines.extend(&[b'x'; MAX_LINE_BYTES + 10]);

        assert_eq!(lines.pop_line().map(|l| l.len()), Some(MAX_LINE_BYTES));
        assert_eq!(lines.buffered(), 10);
        lines.clear();
        assert_eq!(lines.buffered(), 0);
    }

    #[test]
    fn test_assembler_replaces_invalid_utf8() {
        let mut lines = LineAssembler::new();
        lines.extend(&[b'o', 0xff, b'k', b'\n']);
        assert_eq!(lines.pop_line().as_deref(), Some("o\u{fffd}k"));
    }

    #[test]
    fn test_vanished_device_is_closed() {
        let gone = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert_eq!(classify(gone, LinkError::Write), LinkError::Closed);

        let busy = io::Error::new(io::ErrorKind::WouldBlock, "busy");
        let busy = classify(busy, LinkError::Write);
        assert!(matches!(busy, LinkError::Write(_)));

        let unplugged = serialport::Error::new(serialport::ErrorKind::NoDevice, "unplugged");
        assert_eq!(classify_port(unplugged, LinkError::Read), LinkError::Closed);
    }

    #[test]
    fn test_connector_takes_channel_settings() {
        let mut config = ChannelConfig::default();
        config.read_timeout_ms = 250;
        let connector = SerialPortConnector::from_config(&config);

        assert_eq!(connector.baud_rate, 115_200);
        assert_eq!(connector.read_timeout, Duration::from_millis(250));
    }
}
