//! 基于 `serialport` 的串口实现

use crate::{SerialError, SerialReader, SerialWriter, SplittableSource};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 打开串口所需的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// 设备路径，允许以 `*` 结尾（如 `/dev/ttyACM*`）
    pub device: String,
    pub baud_rate: u32,
    /// 单次读取的超时
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            read_timeout: Duration::from_millis(100),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// 真实串口（全双工）
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialPortAdapter {
    /// 打开串口（8N1，无流控）
    ///
    /// 设备路径以 `*` 结尾时先解析为第一个匹配的设备。
    pub fn open(settings: &SerialSettings) -> Result<Self, SerialError> {
        let path = resolve_device(&settings.device)?;
        let port = serialport::new(&path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()?;

        info!("Opened serial port: {} at {} baud", path, settings.baud_rate);
        Ok(Self { port, path })
    }

    /// 实际打开的设备路径
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for SerialPortAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortAdapter").field("path", &self.path).finish()
    }
}

fn map_io_error(e: std::io::Error) -> SerialError {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => SerialError::Timeout,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            SerialError::Disconnected
        },
        _ => SerialError::Io(e),
    }
}

impl SerialReader for SerialPortAdapter {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        match self.port.read(buf) {
            Ok(0) => Err(SerialError::Timeout),
            Ok(n) => Ok(n),
            Err(e) => Err(map_io_error(e)),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl SerialWriter for SerialPortAdapter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(data).map_err(map_io_error)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.port.flush().map_err(map_io_error)
    }
}

/// [`SerialPortAdapter::split`] 得到的写端
pub struct SerialPortWriter {
    port: Box<dyn SerialPort>,
}

impl SerialWriter for SerialPortWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(data).map_err(map_io_error)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        self.port.flush().map_err(map_io_error)
    }
}

impl SplittableSource for SerialPortAdapter {
    type Reader = SerialPortAdapter;
    type Writer = SerialPortWriter;

    fn split(self) -> Result<(Self::Reader, Self::Writer), SerialError> {
        let writer = SerialPortWriter {
            port: self.port.try_clone()?,
        };
        debug!("Split serial port {} into reader/writer", self.path);
        Ok((self, writer))
    }
}

/// 解析设备路径
///
/// 不以 `*` 结尾的路径原样返回（是否存在由打开时判断）。
/// 以 `*` 结尾时，在系统枚举到的串口中按名称排序取第一个前缀匹配项；
/// 枚举失败或没有匹配时退回扫描所在目录。
pub fn resolve_device(pattern: &str) -> Result<String, SerialError> {
    let Some(prefix) = pattern.strip_suffix('*') else {
        return Ok(pattern.to_string());
    };

    let enumerated = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Serial port enumeration failed: {}", e);
            Vec::new()
        },
    };
    if let Some(found) = first_match(prefix, enumerated) {
        return Ok(found);
    }

    if let Some(found) = first_match(prefix, scan_parent_dir(prefix)) {
        return Ok(found);
    }

    Err(SerialError::DeviceNotFound {
        pattern: pattern.to_string(),
    })
}

fn scan_parent_dir(prefix: &str) -> Vec<String> {
    let dir = Path::new(prefix).parent().unwrap_or_else(|| Path::new("."));
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect()
}

fn first_match(prefix: &str, mut candidates: Vec<String>) -> Option<String> {
    candidates.retain(|name| name.starts_with(prefix));
    candidates.sort();
    candidates.into_iter().next()
}
