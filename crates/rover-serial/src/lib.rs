//! # Rover Serial Transport Layer
//!
//! 串口硬件抽象层：底盘主链路、激光雷达、辅助传感器共用同一组读写 trait。
//!
//! - [`SerialReader`] / [`SerialWriter`]：字节级读写（读带超时）
//! - [`SplittableSource`]：把全双工链路拆成独立的读端与写端，分别交给 IO 线程
//! - [`SerialPortAdapter`]：基于 `serialport` 的真实串口实现
//! - `mock` feature：无硬件依赖的 [`MockSerial`]

use thiserror::Error;

pub mod port;

pub use port::{SerialPortAdapter, SerialPortWriter, SerialSettings, resolve_device};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockSerial;

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Device disconnected")]
    Disconnected,
    #[error("No serial device matches '{pattern}'")]
    DeviceNotFound { pattern: String },
}

impl SerialError {
    /// 是否为可重试的超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, SerialError::Timeout)
    }
}

/// 串口读端
pub trait SerialReader: Send {
    /// 读取可用字节，最多填满 `buf`
    ///
    /// 在读超时内没有任何数据时返回 [`SerialError::Timeout`]，从不返回 `Ok(0)`。
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;

    /// 设备输入缓冲区中已到达、尚未读取的字节数
    fn bytes_available(&mut self) -> Result<usize, SerialError>;

    /// 丢弃设备输入缓冲区中所有未读字节
    fn clear_input(&mut self) -> Result<(), SerialError>;

    /// 读满 `buf`
    ///
    /// 任意一次读取超时即返回 [`SerialError::Timeout`]，已读取的部分被丢弃。
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SerialError> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.read(&mut buf[filled..])?;
        }
        Ok(())
    }
}

/// 串口写端
pub trait SerialWriter: Send {
    /// 完整写入 `data`
    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError>;

    /// 刷新发送缓冲
    fn flush(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
}

/// 可拆分为独立读端/写端的全双工链路
pub trait SplittableSource: SerialReader {
    type Reader: SerialReader + 'static;
    type Writer: SerialWriter + 'static;

    fn split(self) -> Result<(Self::Reader, Self::Writer), SerialError>;
}

impl<T: SerialReader + ?Sized> SerialReader for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        (**self).read(buf)
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        (**self).bytes_available()
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        (**self).clear_input()
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SerialError> {
        (**self).read_exact(buf)
    }
}

impl<T: SerialWriter + ?Sized> SerialWriter for Box<T> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        (**self).flush()
    }
}
