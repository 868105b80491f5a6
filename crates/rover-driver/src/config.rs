//! 运行配置
//!
//! 启动时从 TOML 文件构造一次，按值传入 [`RoverBuilder`](crate::RoverBuilder)，
//! 之后由各组件持有自己需要的部分。没有全局可变配置。
//!
//! ```toml
//! [base]
//! device = "/dev/ttyAMA0"
//! baud_rate = 115200
//!
//! [lidar]
//! device = "/dev/ttyACM*"
//! baud_rate = 230400
//!
//! [sensor]
//! enabled = false
//! ```

use rover_protocol::tags::{
    DEFAULT_TAG_SERVO_TORQUE, DEFAULT_TAG_SET_SERVO_ID, DEFAULT_TAG_SET_SERVO_MID,
};
use rover_serial::SerialSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub base: BaseLinkConfig,
    pub lidar: LidarConfig,
    pub sensor: SensorConfig,
    pub pipeline: PipelineSettings,
    pub commands: CommandConfig,
}

/// 底盘主串口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseLinkConfig {
    /// 设备路径（RPi5: `/dev/ttyAMA0`，RPi4B: `/dev/serial0`）
    pub device: String,
    pub baud_rate: u32,
    /// 单次读取超时（毫秒）
    pub read_timeout_ms: u64,
}

impl Default for BaseLinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyAMA0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
        }
    }
}

/// 激光雷达串口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LidarConfig {
    pub enabled: bool,
    /// 设备路径或以 `*` 结尾的模式
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// 重新打开失败后，两次尝试之间的间隔（毫秒）
    pub retry_interval_ms: u64,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: "/dev/ttyACM*".to_string(),
            baud_rate: 230_400,
            read_timeout_ms: 1000,
            retry_interval_ms: 1000,
        }
    }
}

/// 辅助传感器串口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub enabled: bool,
    pub device: String,
    pub baud_rate: u32,
    /// 单条记录的最大长度（去掉行尾 2 字节之后）
    pub max_line_len: usize,
    /// 两次轮询之间的最小间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device: "/dev/ttyUSB*".to_string(),
            baud_rate: 115_200,
            max_line_len: 51,
            poll_interval_ms: 1000,
        }
    }
}

/// IO 线程参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// 遥测轮询周期（毫秒）
    pub feedback_interval_ms: u64,
    /// 行读取器单次读取上限（字节）
    pub read_chunk_size: usize,
    /// 单行读取的总超时；缺省时无限等待
    pub line_timeout_ms: Option<u64>,
    /// 关闭时等待每个线程退出的时间（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            feedback_interval_ms: 25,
            read_chunk_size: 512,
            line_timeout_ms: None,
            join_timeout_ms: 2000,
        }
    }
}

/// 随产品变化的命令参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub set_servo_id: i64,
    pub servo_torque: i64,
    pub set_servo_mid: i64,
    /// 产品型号（1: RaspRover, 2: UGV Rover, 3: UGV Beast）
    pub main_type: u8,
    /// 外挂模块（0: 无, 1: 机械臂, 2: 云台）
    pub module_type: u8,
    /// 下发给固件的反馈间隔（毫秒）
    pub feedback_interval: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            set_servo_id: DEFAULT_TAG_SET_SERVO_ID,
            servo_torque: DEFAULT_TAG_SERVO_TORQUE,
            set_servo_mid: DEFAULT_TAG_SET_SERVO_MID,
            main_type: 2,
            module_type: 0,
            feedback_interval: 50,
        }
    }
}

impl RoverConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RoverConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base.device.is_empty() {
            return Err(ConfigError::Invalid("base.device must not be empty".into()));
        }
        for (name, baud) in [
            ("base", self.base.baud_rate),
            ("lidar", self.lidar.baud_rate),
            ("sensor", self.sensor.baud_rate),
        ] {
            if baud == 0 {
                return Err(ConfigError::Invalid(format!("{name}.baud_rate must be > 0")));
            }
        }
        if self.sensor.max_line_len == 0 {
            return Err(ConfigError::Invalid("sensor.max_line_len must be > 0".into()));
        }
        if self.pipeline.read_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.read_chunk_size must be > 0".into(),
            ));
        }
        if self.pipeline.feedback_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.feedback_interval_ms must be > 0".into(),
            ));
        }
        if self.commands.module_type > 2 {
            return Err(ConfigError::Invalid(format!(
                "commands.module_type must be 0, 1 or 2 (got {})",
                self.commands.module_type
            )));
        }
        Ok(())
    }
}

impl BaseLinkConfig {
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(&self.device, self.baud_rate)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
    }
}

impl LidarConfig {
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(&self.device, self.baud_rate)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
    }
}

impl SensorConfig {
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(&self.device, self.baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RoverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lidar.baud_rate, 230_400);
        assert_eq!(config.sensor.max_line_len, 51);
        assert_eq!(config.pipeline.feedback_interval_ms, 25);
        assert_eq!(config.pipeline.read_chunk_size, 512);
        assert_eq!(config.commands.set_servo_id, 501);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RoverConfig::from_toml_str(
            r#"
            [base]
            device = "/dev/serial0"

            [sensor]
            enabled = false

            [pipeline]
            line_timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.base.device, "/dev/serial0");
        assert_eq!(config.base.baud_rate, 115_200);
        assert!(!config.sensor.enabled);
        assert!(config.lidar.enabled);
        assert_eq!(config.pipeline.line_timeout_ms, Some(500));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RoverConfig::from_toml_str("[sensor]\nmax_line_len = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RoverConfig::from_toml_str("[commands]\nmodule_type = 7\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RoverConfig::from_toml_str("[base\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rover.toml");

        let mut config = RoverConfig::default();
        config.lidar.enabled = false;
        config.commands.module_type = 2;
        config.save_to_file(&path).unwrap();

        let loaded = RoverConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
