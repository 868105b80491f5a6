//! Builder 模式实现
//!
//! 按 [`RoverConfig`] 打开三条串口并启动 [`Rover`]。

use crate::config::RoverConfig;
use crate::error::DriverError;
use crate::lidar::SourceOpener;
use crate::rover::{AuxLinks, Rover};
use rover_serial::{SerialPortAdapter, SerialSettings};
use std::path::Path;
use tracing::{info, warn};

/// Rover Builder（链式构造）
///
/// - 底盘主链路打不开是致命错误
/// - 雷达、辅助传感器打不开只记录警告，对应子系统保持惰性
///
/// # Example
///
/// ```no_run
/// use rover_driver::{RoverBuilder, RoverConfig};
///
/// let rover = RoverBuilder::new(RoverConfig::default())
///     .base_device("/dev/ttyAMA0")
///     .without_sensor()
///     .build()
///     .unwrap();
/// rover.send_boot_sequence();
/// ```
pub struct RoverBuilder {
    config: RoverConfig,
}

impl RoverBuilder {
    pub fn new(config: RoverConfig) -> Self {
        Self { config }
    }

    /// 从 TOML 配置文件创建
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        Ok(Self::new(RoverConfig::load_from_file(path)?))
    }

    /// 覆盖底盘主链路设备路径
    pub fn base_device(mut self, device: impl Into<String>) -> Self {
        self.config.base.device = device.into();
        self
    }

    /// 覆盖雷达设备路径（可以以 `*` 结尾）
    pub fn lidar_device(mut self, device: impl Into<String>) -> Self {
        self.config.lidar.device = device.into();
        self
    }

    /// 覆盖辅助传感器设备路径（可以以 `*` 结尾）
    pub fn sensor_device(mut self, device: impl Into<String>) -> Self {
        self.config.sensor.device = device.into();
        self
    }

    /// 不启用激光雷达
    pub fn without_lidar(mut self) -> Self {
        self.config.lidar.enabled = false;
        self
    }

    /// 不启用辅助传感器
    pub fn without_sensor(mut self) -> Self {
        self.config.sensor.enabled = false;
        self
    }

    pub fn config(&self) -> &RoverConfig {
        &self.config
    }

    /// 打开设备并启动 IO 线程
    ///
    /// # 错误
    /// - `DriverError::Config`: 配置校验失败
    /// - `DriverError::Serial`: 底盘主链路打开失败
    /// - `DriverError::IoThread`: 线程创建失败
    pub fn build(self) -> Result<Rover, DriverError> {
        self.config.validate()?;

        let base = SerialPortAdapter::open(&self.config.base.serial_settings())?;
        info!("Chassis link: {}", base.path());

        let mut aux = AuxLinks::<SerialPortAdapter, SerialPortAdapter>::default();

        if self.config.lidar.enabled {
            let mut opener = lidar_opener(self.config.lidar.serial_settings());
            match opener() {
                Ok(port) => {
                    info!("Lidar link: {}", port.path());
                    aux.lidar = Some(port);
                    aux.lidar_opener = Some(opener);
                },
                Err(e) => warn!(
                    "Lidar not available ({}): {}; range-finder disabled until restart",
                    self.config.lidar.device, e
                ),
            }
        }

        if self.config.sensor.enabled {
            match SerialPortAdapter::open(&self.config.sensor.serial_settings()) {
                Ok(port) => {
                    info!("Auxiliary sensor link: {}", port.path());
                    aux.sensor = Some(port);
                },
                Err(e) => warn!(
                    "Auxiliary sensor not available ({}): {}; sensor batch disabled until restart",
                    self.config.sensor.device, e
                ),
            }
        }

        Rover::spawn(base, aux, &self.config)
    }
}

/// 每次调用都重新解析设备模式（重新插拔后设备号可能变化）
fn lidar_opener(settings: SerialSettings) -> SourceOpener<SerialPortAdapter> {
    Box::new(move || SerialPortAdapter::open(&settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let builder = RoverBuilder::new(RoverConfig::default())
            .base_device("/dev/ttyS9")
            .lidar_device("/dev/ttyLIDAR*")
            .without_sensor();
        assert_eq!(builder.config().base.device, "/dev/ttyS9");
        assert_eq!(builder.config().lidar.device, "/dev/ttyLIDAR*");
        assert!(!builder.config().sensor.enabled);
        assert!(builder.config().lidar.enabled);
    }

    #[test]
    fn test_missing_base_device_is_fatal() {
        let result = RoverBuilder::new(RoverConfig::default())
            .base_device("/nonexistent/rover-base-port")
            .without_lidar()
            .without_sensor()
            .build();
        assert!(matches!(result, Err(DriverError::Serial(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_opening() {
        let mut config = RoverConfig::default();
        config.sensor.max_line_len = 0;
        let result = RoverBuilder::new(config).build();
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rover.toml");
        std::fs::write(&path, "[base]\ndevice = \"/dev/ttyS3\"\n").unwrap();
        let builder = RoverBuilder::from_file(&path).unwrap();
        assert_eq!(builder.config().base.device, "/dev/ttyS3");
    }
}
