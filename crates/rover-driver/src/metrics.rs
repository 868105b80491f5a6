//! 性能指标模块
//!
//! 原子计数器，记录各 IO 线程吸收掉的错误与吞吐量。
//! 所有计数器都可以在任何线程安全读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 链路指标
///
/// 循环内部"记录并继续"的错误都会在这里留下计数，测试与监控通过快照观察。
///
/// ```rust
/// use rover_driver::RoverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = RoverMetrics::new();
/// metrics.commands_written.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().commands_written, 1);
/// ```
#[derive(Debug, Default)]
pub struct RoverMetrics {
    // === 命令路径 ===
    /// 入队命令数
    pub commands_submitted: AtomicU64,
    /// 成功写入串口的命令数
    pub commands_written: AtomicU64,
    /// 写入失败（不重试）
    pub command_write_errors: AtomicU64,
    /// 序列化失败或写线程已退出而被丢弃的命令
    pub commands_dropped: AtomicU64,

    // === 底盘遥测 ===
    /// 读到的遥测行数
    pub telemetry_lines: AtomicU64,
    /// 状态记录（覆盖缓存）
    pub telemetry_states: AtomicU64,
    /// 事件记录
    pub telemetry_events: AtomicU64,
    /// 无法解析的行
    pub telemetry_decode_errors: AtomicU64,
    /// 缺少 `"T"` 而被丢弃的记录
    pub telemetry_missing_tag: AtomicU64,
    /// 串口读取错误
    pub telemetry_read_errors: AtomicU64,
    /// 清空设备接收缓冲区的次数
    pub telemetry_resyncs: AtomicU64,

    // === 激光雷达 ===
    pub lidar_frames: AtomicU64,
    pub lidar_rotations: AtomicU64,
    /// 寻找帧头时丢弃的非帧头字节
    pub lidar_noise_bytes: AtomicU64,
    pub lidar_read_errors: AtomicU64,
    pub lidar_reopen_attempts: AtomicU64,
    pub lidar_reopen_failures: AtomicU64,

    // === 辅助传感器 ===
    pub sensor_lines: AtomicU64,
    pub sensor_batches: AtomicU64,
    /// 超长被拆成两条的行
    pub sensor_split_lines: AtomicU64,
    pub sensor_read_errors: AtomicU64,
}

impl RoverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计数器加一
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_submitted: self.commands_submitted.load(Ordering::Relaxed),
            commands_written: self.commands_written.load(Ordering::Relaxed),
            command_write_errors: self.command_write_errors.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            telemetry_lines: self.telemetry_lines.load(Ordering::Relaxed),
            telemetry_states: self.telemetry_states.load(Ordering::Relaxed),
            telemetry_events: self.telemetry_events.load(Ordering::Relaxed),
            telemetry_decode_errors: self.telemetry_decode_errors.load(Ordering::Relaxed),
            telemetry_missing_tag: self.telemetry_missing_tag.load(Ordering::Relaxed),
            telemetry_read_errors: self.telemetry_read_errors.load(Ordering::Relaxed),
            telemetry_resyncs: self.telemetry_resyncs.load(Ordering::Relaxed),
            lidar_frames: self.lidar_frames.load(Ordering::Relaxed),
            lidar_rotations: self.lidar_rotations.load(Ordering::Relaxed),
            lidar_noise_bytes: self.lidar_noise_bytes.load(Ordering::Relaxed),
            lidar_read_errors: self.lidar_read_errors.load(Ordering::Relaxed),
            lidar_reopen_attempts: self.lidar_reopen_attempts.load(Ordering::Relaxed),
            lidar_reopen_failures: self.lidar_reopen_failures.load(Ordering::Relaxed),
            sensor_lines: self.sensor_lines.load(Ordering::Relaxed),
            sensor_batches: self.sensor_batches.load(Ordering::Relaxed),
            sensor_split_lines: self.sensor_split_lines.load(Ordering::Relaxed),
            sensor_read_errors: self.sensor_read_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.commands_submitted,
            &self.commands_written,
            &self.command_write_errors,
            &self.commands_dropped,
            &self.telemetry_lines,
            &self.telemetry_states,
            &self.telemetry_events,
            &self.telemetry_decode_errors,
            &self.telemetry_missing_tag,
            &self.telemetry_read_errors,
            &self.telemetry_resyncs,
            &self.lidar_frames,
            &self.lidar_rotations,
            &self.lidar_noise_bytes,
            &self.lidar_read_errors,
            &self.lidar_reopen_attempts,
            &self.lidar_reopen_failures,
            &self.sensor_lines,
            &self.sensor_batches,
            &self.sensor_split_lines,
            &self.sensor_read_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commands_submitted: u64,
    pub commands_written: u64,
    pub command_write_errors: u64,
    pub commands_dropped: u64,
    pub telemetry_lines: u64,
    pub telemetry_states: u64,
    pub telemetry_events: u64,
    pub telemetry_decode_errors: u64,
    pub telemetry_missing_tag: u64,
    pub telemetry_read_errors: u64,
    pub telemetry_resyncs: u64,
    pub lidar_frames: u64,
    pub lidar_rotations: u64,
    pub lidar_noise_bytes: u64,
    pub lidar_read_errors: u64,
    pub lidar_reopen_attempts: u64,
    pub lidar_reopen_failures: u64,
    pub sensor_lines: u64,
    pub sensor_batches: u64,
    pub sensor_split_lines: u64,
    pub sensor_read_errors: u64,
}

impl MetricsSnapshot {
    /// 尚在队列中（已入队、未写出也未丢弃）的命令数
    pub fn commands_in_flight(&self) -> u64 {
        self.commands_submitted
            .saturating_sub(self.commands_written)
            .saturating_sub(self.command_write_errors)
            .saturating_sub(self.commands_dropped)
    }

    /// 遥测行解析失败率（百分比）
    ///
    /// `telemetry_lines` 为 0 时返回 0.0。
    pub fn telemetry_error_rate(&self) -> f64 {
        if self.telemetry_lines == 0 {
            return 0.0;
        }
        (self.telemetry_decode_errors as f64 / self.telemetry_lines as f64) * 100.0
    }
}
