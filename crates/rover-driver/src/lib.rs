//! 驱动层
//!
//! 串口底盘的命令/遥测子系统：
//! - IO 线程管理（写线程、遥测、激光雷达、辅助传感器各一个线程）
//! - 状态同步（ArcSwap 无锁读取，读者拿到不可变快照）
//! - 单写者 FIFO 命令队列
//! - 钩子系统：遥测记录、命令写出回调
//! - 原子计数器：被循环吸收的错误都留下计数
//!
//! # Example
//!
//! ```no_run
//! use rover_driver::{RoverBuilder, RoverConfig};
//! use rover_protocol::control;
//! use std::time::Duration;
//!
//! rover_driver::init_logger();
//! let rover = RoverBuilder::new(RoverConfig::default()).build().unwrap();
//! rover.send_boot_sequence();
//! rover.submit(control::speed_ctrl(0.2, 0.2));
//!
//! if let Some(rotation) = rover.wait_rotation(Duration::from_secs(1)) {
//!     println!("{} samples", rotation.len());
//! }
//! ```

mod builder;
pub mod command;
pub mod config;
mod error;
pub mod heartbeat;
pub mod hooks;
pub mod lidar;
pub mod line_reader;
pub mod metrics;
pub mod pipeline;
mod rover;
pub mod sensor;
pub mod state;
pub mod telemetry;

pub use builder::RoverBuilder;
pub use command::{CommandQueue, boot_sequence};
pub use config::{ConfigError, RoverConfig};
pub use error::DriverError;
pub use heartbeat::ConnectionMonitor;
pub use hooks::{EventForwarder, HookManager, TelemetryCallback};
pub use lidar::{LidarDecoder, Rotation, RotationAssembler};
pub use line_reader::FramedReader;
pub use metrics::{MetricsSnapshot, RoverMetrics};
pub use pipeline::{
    PipelineConfig, RequestInbox, lidar_loop, sensor_loop, telemetry_loop, writer_loop,
};
pub use rover::{AuxLinks, Rover};
pub use sensor::{SensorBatch, SensorMultiplexer};
pub use state::RoverContext;
pub use telemetry::{TelemetryDecoder, TelemetryRequest};

/// 安装默认的 `tracing` 订阅者
///
/// 过滤规则取自 `RUST_LOG`，缺省为 `rover_driver=info`。已经安装过订阅者时什么也不做。
pub fn init_logger() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rover_driver=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_logger_is_idempotent() {
        super::init_logger();
        super::init_logger();
    }
}
