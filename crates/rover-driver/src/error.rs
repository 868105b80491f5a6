//! 驱动层错误类型定义

use crate::config::ConfigError;
use rover_protocol::ProtocolError;
use rover_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口错误
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 命令通道已关闭（写线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use rover_protocol::ProtocolError;
    use rover_serial::SerialError;

    #[test]
    fn test_driver_error_display() {
        let msg = format!("{}", DriverError::Serial(SerialError::Timeout));
        assert!(msg.contains("Serial") && msg.contains("Read timeout"), "{}", msg);

        let msg = format!(
            "{}",
            DriverError::Protocol(ProtocolError::InvalidLength {
                expected: 47,
                actual: 3
            })
        );
        assert!(msg.contains("Protocol"), "{}", msg);

        assert_eq!(format!("{}", DriverError::ChannelClosed), "Command channel closed");
        assert_eq!(format!("{}", DriverError::Timeout), "Operation timeout");

        let msg = format!("{}", DriverError::IoThread("lidar".to_string()));
        assert!(msg.contains("IO thread") && msg.contains("lidar"));
    }

    #[test]
    fn test_from_serial_error() {
        let err: DriverError = SerialError::Disconnected.into();
        assert!(matches!(err, DriverError::Serial(SerialError::Disconnected)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::MissingTypeTag.into();
        assert!(matches!(
            err,
            DriverError::Protocol(ProtocolError::MissingTypeTag)
        ));
    }
}
