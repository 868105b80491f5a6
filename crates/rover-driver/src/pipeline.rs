//! Pipeline IO 循环模块
//!
//! 四个后台线程各自独占一条串口方向：
//!
//! - `writer_loop`：命令队列的唯一消费者，逐条写出
//! - `telemetry_loop`：周期性拉取底盘遥测
//! - `sensor_loop`：按最小间隔读完辅助传感器的行
//! - `lidar_loop`：连续读取激光雷达，每完成一圈发布一次
//!
//! 所有循环都在 `is_running` 变为 `false` 后的下一次检查点退出。

use crate::command::CommandQueue;
use crate::config::RoverConfig;
use crate::lidar::LidarDecoder;
use crate::metrics::RoverMetrics;
use crate::sensor::SensorMultiplexer;
use crate::state::RoverContext;
use crate::telemetry::{TelemetryDecoder, TelemetryRequest};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rover_protocol::Command;
use rover_serial::{SerialError, SerialReader, SerialWriter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 等待期间检查运行标志的最大间隔
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use rover_driver::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.feedback_interval, Duration::from_millis(25));
///
/// let config = PipelineConfig {
///     sensor_poll_interval: Duration::from_millis(200),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 遥测轮询周期
    pub feedback_interval: Duration,
    /// 辅助传感器两次轮询之间的最小间隔
    pub sensor_poll_interval: Duration,
    /// 雷达断开后两次重开尝试之间的间隔
    pub lidar_retry_interval: Duration,
    /// 写线程等待新命令的超时（用于检查运行标志）
    pub writer_poll_timeout: Duration,
    /// 关闭时等待每个线程退出的时间
    pub join_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feedback_interval: Duration::from_millis(25),
            sensor_poll_interval: Duration::from_secs(1),
            lidar_retry_interval: Duration::from_secs(1),
            writer_poll_timeout: Duration::from_millis(10),
            join_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&RoverConfig> for PipelineConfig {
    fn from(config: &RoverConfig) -> Self {
        Self {
            feedback_interval: Duration::from_millis(config.pipeline.feedback_interval_ms),
            sensor_poll_interval: Duration::from_millis(config.sensor.poll_interval_ms),
            lidar_retry_interval: Duration::from_millis(config.lidar.retry_interval_ms),
            join_timeout: Duration::from_millis(config.pipeline.join_timeout_ms),
            ..Default::default()
        }
    }
}

/// 命令写线程
///
/// 每条命令序列化为一行 JSON 后只调用一次 `write_all`，因此不同命令的字节不会交错。
/// 写入失败只记录，不重试也不重新入队。链路断开后线程退出，之后入队的命令被计为丢弃。
///
/// 运行标志清除后，退出前写出此刻已在队列中的命令（最多用 `join_timeout` 的一半），
/// 来不及写或链路已断开的计入 `commands_dropped`。
///
/// # 参数
/// - `writer`: 底盘链路写端
/// - `cmd_rx`: 命令队列消费端
/// - `ctx`: 共享状态上下文（用于触发命令写出回调）
/// - `config`: Pipeline 配置
/// - `is_running`: 运行标志
/// - `metrics`: 性能指标
pub fn writer_loop(
    mut writer: impl SerialWriter,
    cmd_rx: Receiver<Command>,
    ctx: Arc<RoverContext>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RoverMetrics>,
) {
    let mut link_up = true;
    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("Writer thread: is_running flag is false, exiting");
            break;
        }

        let command = match cmd_rx.recv_timeout(config.writer_poll_timeout) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                trace!("Writer thread: command channel disconnected");
                break;
            },
        };

        if !write_command(&mut writer, &command, &ctx, &metrics) {
            error!("Writer thread: chassis link disconnected, exiting");
            link_up = false;
            break;
        }
    }

    // 只处理退出时刻已入队的命令，之后提交的由 CommandQueue 在发送失败时计数
    let deadline = Instant::now() + config.join_timeout / 2;
    let backlog = cmd_rx.len();
    let (mut flushed, mut dropped) = (0usize, 0usize);
    for command in cmd_rx.try_iter().take(backlog) {
        if link_up && Instant::now() < deadline {
            link_up = write_command(&mut writer, &command, &ctx, &metrics);
            flushed += 1;
        } else {
            RoverMetrics::incr(&metrics.commands_dropped);
            dropped += 1;
        }
    }
    if backlog > 0 {
        debug!(
            "Writer thread: shutdown backlog {} (flushed {}, dropped {})",
            backlog, flushed, dropped
        );
    }

    trace!("Writer thread: loop exited");
}

/// 写出一条命令，返回链路是否仍可用
fn write_command(
    writer: &mut impl SerialWriter,
    command: &Command,
    ctx: &RoverContext,
    metrics: &RoverMetrics,
) -> bool {
    let wire = match command.to_wire() {
        Ok(wire) => wire,
        Err(e) => {
            error!("Writer thread: failed to serialize command: {}", e);
            RoverMetrics::incr(&metrics.commands_dropped);
            return true;
        },
    };

    match writer.write_all(&wire).and_then(|()| writer.flush()) {
        Ok(()) => {
            RoverMetrics::incr(&metrics.commands_written);
            if let Ok(hooks) = ctx.hooks.try_read() {
                hooks.trigger_command_sent(command);
            }
            true
        },
        Err(SerialError::Disconnected) => {
            RoverMetrics::incr(&metrics.command_write_errors);
            false
        },
        Err(e) => {
            error!("Writer thread: failed to write command T={}: {}", command.tag(), e);
            RoverMetrics::incr(&metrics.command_write_errors);
            true
        },
    }
}

/// 遥测线程的请求入口
pub struct RequestInbox {
    pub requests: Receiver<TelemetryRequest>,
    /// 请求命令经由同一个命令队列发出，保持与其他命令的顺序
    pub queue: CommandQueue,
    /// 与遥测读端共享的中断标志，有请求待处理时置位
    pub pending: Arc<AtomicBool>,
}

impl RequestInbox {
    fn serve<R: SerialReader>(&self, decoder: &mut TelemetryDecoder<R>) {
        // 先清标志再取请求：之后到达的请求会重新置位
        self.pending.store(false, Ordering::Release);
        while let Ok(request) = self.requests.try_recv() {
            decoder.serve_request(request, &self.queue);
        }
    }
}

/// 遥测线程
///
/// 每个周期调用一次 [`TelemetryDecoder::poll_feedback`]，结果已经写入共享状态，
/// 随后处理排队的请求。底盘链路断开后退出（主链路没有自动重连）。
pub fn telemetry_loop<R: SerialReader>(
    mut decoder: TelemetryDecoder<R>,
    inbox: RequestInbox,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Telemetry thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set telemetry thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Telemetry thread: is_running flag is false, exiting");
            break;
        }

        let cycle_start = Instant::now();
        if let Some(record) = decoder.poll_feedback() {
            trace!("Telemetry record T={}", record.tag());
        }
        inbox.serve(&mut decoder);
        if decoder.is_closed() {
            warn!("Telemetry thread: chassis link closed, exiting");
            break;
        }

        // 使用 spin_sleep 保持稳定的轮询周期
        if let Some(rest) = config.feedback_interval.checked_sub(cycle_start.elapsed()) {
            spin_sleep::sleep(rest);
        }
    }

    trace!("Telemetry thread: loop exited");
}

/// 辅助传感器线程
///
/// 启动时没有设备则立即退出。
pub fn sensor_loop<S: SerialReader>(
    mut multiplexer: SensorMultiplexer<S>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
) {
    if multiplexer.is_inert() {
        info!("Sensor thread: no auxiliary device, staying idle");
        return;
    }

    while is_running.load(Ordering::Acquire) {
        if let Some(count) = multiplexer.poll() {
            debug!("Sensor thread: batch of {} records", count);
        }
        sleep_while_running(&is_running, config.sensor_poll_interval);
    }

    trace!("Sensor thread: loop exited");
}

/// 激光雷达线程
///
/// 每完成一圈就发布到共享状态。一次读取中止后（无论重开是否成功）按重试间隔等待再试。
pub fn lidar_loop<S: SerialReader>(
    mut decoder: LidarDecoder<S>,
    ctx: Arc<RoverContext>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
) {
    if decoder.is_inert() {
        info!("Lidar thread: no range-finder device, staying idle");
        return;
    }

    while is_running.load(Ordering::Acquire) {
        match decoder.read_rotation() {
            Some(rotation) => ctx.publish_rotation(rotation),
            None if decoder.last_cycle_failed() || !decoder.is_connected() => {
                sleep_while_running(&is_running, config.lidar_retry_interval);
            },
            None => {},
        }
    }

    trace!("Lidar thread: loop exited");
}

/// 分段睡眠，运行标志变为 `false` 时提前返回
fn sleep_while_running(is_running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while is_running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        spin_sleep::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}
