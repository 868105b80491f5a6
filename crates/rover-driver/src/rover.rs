//! Rover API 模块
//!
//! 提供对外的 `Rover` 结构体，封装后台 IO 线程和状态同步细节。

use crate::command::{CommandQueue, boot_sequence};
use crate::config::{CommandConfig, RoverConfig};
use crate::error::DriverError;
use crate::hooks::TelemetryCallback;
use crate::lidar::{LidarDecoder, Rotation, SourceOpener};
use crate::line_reader::FramedReader;
use crate::metrics::{MetricsSnapshot, RoverMetrics};
use crate::pipeline::*;
use crate::sensor::SensorMultiplexer;
use crate::state::RoverContext;
use crate::telemetry::{TelemetryDecoder, TelemetryRequest};
use crossbeam_channel::{RecvTimeoutError, Sender};
use rover_protocol::{BaseFeedback, Command, TelemetryRecord, control};
use rover_serial::{SerialReader, SplittableSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // Watchdog thread joins the target so the caller can wait with a deadline
        thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 激光雷达与辅助传感器链路
///
/// 两者都可以缺席：缺席的子系统不启动线程，直到重启前保持惰性。
pub struct AuxLinks<A, B> {
    /// 已打开的雷达设备
    pub lidar: Option<A>,
    /// 雷达出错后重新打开设备的回调
    pub lidar_opener: Option<SourceOpener<A>>,
    /// 已打开的辅助传感器设备
    pub sensor: Option<B>,
}

impl<A, B> Default for AuxLinks<A, B> {
    fn default() -> Self {
        Self {
            lidar: None,
            lidar_opener: None,
            sensor: None,
        }
    }
}

/// 底盘驱动（对外 API）
///
/// 持有写线程、遥测线程，以及（设备存在时）雷达线程和传感器线程。
/// Drop 时清除运行标志，并在限定时间内等待每个线程退出。
pub struct Rover {
    queue: CommandQueue,
    requests: Sender<TelemetryRequest>,
    request_pending: Arc<AtomicBool>,
    ctx: Arc<RoverContext>,
    metrics: Arc<RoverMetrics>,
    is_running: Arc<AtomicBool>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
    join_timeout: Duration,
    /// 请求截止后再等待遥测线程应答的时间（覆盖一次设备读超时和一个轮询周期）
    request_grace: Duration,
    commands: CommandConfig,
}

impl Rover {
    /// 用已经打开的链路启动全部 IO 线程
    ///
    /// # 参数
    /// - `base`: 底盘主链路（拆分为读端交给遥测线程、写端交给写线程）
    /// - `aux`: 雷达与辅助传感器链路
    /// - `config`: 运行配置
    ///
    /// # 错误
    /// - `DriverError::Serial`: 拆分主链路失败
    /// - `DriverError::IoThread`: 线程创建失败
    pub fn spawn<L, A, B>(
        base: L,
        aux: AuxLinks<A, B>,
        config: &RoverConfig,
    ) -> Result<Self, DriverError>
    where
        L: SplittableSource,
        A: SerialReader + 'static,
        B: SerialReader + 'static,
    {
        let pipeline = PipelineConfig::from(config);
        let (reader, writer) = base.split()?;

        let metrics = Arc::new(RoverMetrics::new());
        let ctx = Arc::new(RoverContext::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let (queue, cmd_rx) = CommandQueue::new(metrics.clone());
        let (requests, request_rx) = crossbeam_channel::unbounded();
        let request_pending = Arc::new(AtomicBool::new(false));

        let mut rover = Self {
            queue: queue.clone(),
            requests,
            request_pending: request_pending.clone(),
            ctx: ctx.clone(),
            metrics: metrics.clone(),
            is_running: is_running.clone(),
            threads: Vec::with_capacity(4),
            join_timeout: pipeline.join_timeout,
            request_grace: Duration::from_millis(config.base.read_timeout_ms)
                + pipeline.feedback_interval,
            commands: config.commands.clone(),
        };

        // 构造过程中任何一步失败，已经启动的线程都由 Drop 回收
        {
            let (ctx, config, running, metrics) = (
                ctx.clone(),
                pipeline.clone(),
                is_running.clone(),
                metrics.clone(),
            );
            rover.spawn_thread("rover-writer", move || {
                writer_loop(writer, cmd_rx, ctx, config, running, metrics)
            })?;
        }

        {
            let line_reader = FramedReader::with_chunk_size(reader, config.pipeline.read_chunk_size)
                .with_line_timeout(config.pipeline.line_timeout_ms.map(Duration::from_millis))
                .with_running_flag(is_running.clone())
                .with_interrupt(request_pending.clone());
            let decoder = TelemetryDecoder::new(line_reader, ctx.clone(), metrics.clone());
            let inbox = RequestInbox {
                requests: request_rx,
                queue,
                pending: request_pending,
            };
            let (config, running) = (pipeline.clone(), is_running.clone());
            rover.spawn_thread("rover-telemetry", move || {
                telemetry_loop(decoder, inbox, config, running)
            })?;
        }

        let mut lidar = LidarDecoder::new(aux.lidar, metrics.clone())
            .with_running_flag(is_running.clone());
        if let Some(opener) = aux.lidar_opener {
            lidar = lidar.with_opener(opener);
        }
        if lidar.is_inert() {
            info!("Lidar not connected; range-finder subsystem is inert");
        } else {
            let (ctx, config, running) = (ctx.clone(), pipeline.clone(), is_running.clone());
            rover.spawn_thread("rover-lidar", move || {
                lidar_loop(lidar, ctx, config, running)
            })?;
        }

        let sensor = SensorMultiplexer::new(
            aux.sensor,
            config.sensor.max_line_len,
            ctx.sensor_batch.clone(),
            metrics.clone(),
        )
        .with_line_timeout(Some(pipeline.sensor_poll_interval));
        if sensor.is_inert() {
            info!("Auxiliary sensor not connected; sensor subsystem is inert");
        } else {
            let (config, running) = (pipeline.clone(), is_running.clone());
            rover.spawn_thread("rover-sensor", move || sensor_loop(sensor, config, running))?;
        }

        info!("Rover IO threads started ({} threads)", rover.threads.len());
        Ok(rover)
    }

    fn spawn_thread<F>(&mut self, name: &'static str, body: F) -> Result<(), DriverError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|e| DriverError::IoThread(format!("failed to spawn {name}: {e}")))?;
        self.threads.push((name, handle));
        Ok(())
    }

    // ==================== 命令 ====================

    /// 提交命令（非阻塞，FIFO）
    pub fn submit(&self, command: Command) {
        self.queue.submit(command);
    }

    /// 命令队列的生产者端（可克隆到其他线程）
    pub fn queue(&self) -> CommandQueue {
        self.queue.clone()
    }

    /// 下发启动命令序列
    pub fn send_boot_sequence(&self) {
        self.queue.submit_all(boot_sequence(&self.commands));
    }

    /// 急停并把轮速清零
    pub fn stop(&self) {
        self.submit(control::emergency_stop());
        self.submit(control::speed_ctrl(0.0, 0.0));
    }

    /// 灯光 PWM 控制（同时记录灯光状态）
    pub fn lights_ctrl(&self, base_pwm: u8, head_pwm: u8) {
        self.ctx.lights.set(base_pwm, head_pwm);
        self.submit(control::lights_ctrl(base_pwm, head_pwm));
    }

    /// 底盘灯在 0 和 255 之间切换
    pub fn toggle_base_light(&self) {
        let (base, head) = self.ctx.lights.get();
        let base = if base == 0 { 255 } else { 0 };
        self.lights_ctrl(base, head);
    }

    /// 最近一次下发的灯光 PWM `(base, head)`
    pub fn lights(&self) -> (u8, u8) {
        self.ctx.lights.get()
    }

    /// 修改舵机 ID（标签取自配置）
    pub fn set_servo_id(&self, old_id: u8, new_id: u8) {
        self.submit(control::servo_id_set(self.commands.set_servo_id, old_id, new_id));
    }

    /// 舵机力矩锁定/释放
    pub fn servo_torque_lock(&self, id: u8, locked: bool) {
        self.submit(control::servo_torque_lock(self.commands.servo_torque, id, locked));
    }

    /// 把舵机当前位置设为中位
    pub fn set_servo_mid(&self, id: u8) {
        self.submit(control::servo_mid_set(self.commands.set_servo_mid, id));
    }

    /// 请求/应答：发出命令，返回紧随其后的下一条底盘记录
    ///
    /// 由遥测线程执行（清空输入、经命令队列发出、读一行），应答不写入状态缓存也不触发回调。
    /// 截止时间到达时遥测线程还没开始处理的请求不会发出命令。
    ///
    /// # 错误
    /// - `DriverError::Timeout`: 截止前没有读到完整的一行
    /// - `DriverError::Protocol`: 应答不是合法的记录
    /// - `DriverError::ChannelClosed`: 遥测线程已退出
    pub fn request(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<TelemetryRecord, DriverError> {
        let deadline = Instant::now() + timeout;
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        self.requests
            .send(TelemetryRequest {
                command,
                deadline,
                reply,
            })
            .map_err(|_| DriverError::ChannelClosed)?;
        self.request_pending.store(true, Ordering::Release);

        match reply_rx.recv_deadline(deadline + self.request_grace) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DriverError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::ChannelClosed),
        }
    }

    // ==================== 状态读取 ====================

    /// 最近缓存的状态记录（无锁读取）
    pub fn feedback(&self) -> Option<Arc<TelemetryRecord>> {
        self.ctx.feedback.load_full()
    }

    /// 最近的底盘周期反馈（T=1001）
    pub fn base_feedback(&self) -> Option<BaseFeedback> {
        let record = self.ctx.feedback.load_full()?;
        BaseFeedback::try_from(record.as_ref()).ok()
    }

    /// 最近一条事件记录
    pub fn last_event(&self) -> Option<Arc<TelemetryRecord>> {
        self.ctx.last_event.load_full()
    }

    /// 最近完成的一圈（还没有完成任何一圈时为空）
    pub fn latest_rotation(&self) -> Arc<Rotation> {
        self.ctx.rotation.load_full()
    }

    /// 等待下一圈完成
    pub fn wait_rotation(&self, timeout: Duration) -> Option<Arc<Rotation>> {
        self.ctx.wait_rotation(timeout)
    }

    /// 取走最近一批传感器记录（第二次调用前没有新输入时返回空）
    pub fn drain_sensor_batch(&self) -> Vec<String> {
        self.ctx.sensor_batch.drain()
    }

    /// 注册接收全部记录的回调
    pub fn add_callback(&self, callback: Arc<dyn TelemetryCallback>) {
        if let Ok(mut hooks) = self.ctx.hooks.write() {
            hooks.add_callback(callback);
        }
    }

    /// 注册只接收指定类型标签的处理器
    pub fn add_tag_handler(&self, tag: i64, handler: Arc<dyn TelemetryCallback>) {
        if let Ok(mut hooks) = self.ctx.hooks.write() {
            hooks.add_tag_handler(tag, handler);
        }
    }

    /// 共享状态上下文
    pub fn context(&self) -> &Arc<RoverContext> {
        &self.ctx
    }

    // ==================== 健康状态 ====================

    /// 获取性能指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 已启动的线程是否都还在运行
    pub fn is_healthy(&self) -> bool {
        self.threads.iter().all(|(_, handle)| !handle.is_finished())
    }

    /// 超时窗口内是否收到过底盘记录
    pub fn is_connected(&self) -> bool {
        self.ctx.connection.is_alive()
    }

    /// 已启动的线程名
    pub fn thread_names(&self) -> Vec<&'static str> {
        self.threads.iter().map(|(name, _)| *name).collect()
    }
}

impl Drop for Rover {
    fn drop(&mut self) {
        // Release: 之前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);

        for (name, handle) in self.threads.drain(..) {
            if let Err(_e) = handle.join_timeout(self.join_timeout) {
                error!(
                    "{} thread panicked or failed to shut down within {:?}",
                    name, self.join_timeout
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_serial::MockSerial;

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn spawn_base(base: &MockSerial) -> Rover {
        Rover::spawn(
            base.clone(),
            AuxLinks::<MockSerial, MockSerial>::default(),
            &RoverConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_spawn_without_aux_links() {
        let base = MockSerial::new();
        let rover = spawn_base(&base);
        assert_eq!(rover.thread_names(), vec!["rover-writer", "rover-telemetry"]);
        assert!(rover.is_healthy());
        assert!(rover.latest_rotation().is_empty());
        assert!(rover.drain_sensor_batch().is_empty());
    }

    #[test]
    fn test_boot_sequence_reaches_link() {
        let base = MockSerial::new();
        let rover = spawn_base(&base);
        rover.send_boot_sequence();
        assert!(wait_until(|| base.written().len() == 5));
        assert!(base.written()[0].starts_with(b"{\"T\":142"));
    }

    #[test]
    fn test_light_toggle() {
        let base = MockSerial::new();
        let rover = spawn_base(&base);
        rover.toggle_base_light();
        assert_eq!(rover.lights(), (255, 0));
        rover.toggle_base_light();
        assert_eq!(rover.lights(), (0, 0));

        assert!(wait_until(|| base.written().len() == 2));
        assert_eq!(base.written()[0], b"{\"T\":132,\"IO4\":255,\"IO5\":0}\n");
    }

    #[test]
    fn test_servo_commands_use_configured_tags() {
        let base = MockSerial::new();
        let mut config = RoverConfig::default();
        config.commands.set_servo_id = 601;
        let rover = Rover::spawn(
            base.clone(),
            AuxLinks::<MockSerial, MockSerial>::default(),
            &config,
        )
        .unwrap();

        rover.set_servo_id(255, 2);
        assert!(wait_until(|| base.written().len() == 1));
        assert_eq!(base.written()[0], b"{\"T\":601,\"raw\":255,\"new\":2}\n");
    }

    #[test]
    fn test_request_returns_next_record() {
        let base = MockSerial::new();
        base.push(b"{\"T\":1001,\"v\":12.0}\n");
        let rover = spawn_base(&base);
        assert!(wait_until(|| rover.feedback().is_some()));

        // 命令写出后才回应，模拟底盘的应答
        let responder = {
            let base = base.clone();
            thread::spawn(move || {
                let sent =
                    wait_until(|| base.written().iter().any(|w| w.starts_with(b"{\"T\":900")));
                base.push(b"{\"T\":900,\"main\":2,\"module\":0}\n");
                sent
            })
        };

        let reply = rover
            .request(control::product_version(2, 0), Duration::from_secs(2))
            .unwrap();
        assert!(responder.join().unwrap());
        assert_eq!(reply.tag(), 900);
        assert_eq!(reply.get_f64("main"), Some(2.0));
        assert_eq!(rover.feedback().unwrap().tag(), 1001);
    }

    #[test]
    fn test_request_times_out_on_silent_link() {
        let base = MockSerial::new();
        let rover = spawn_base(&base);

        let start = Instant::now();
        let result = rover.request(control::emergency_stop(), Duration::from_millis(100));
        assert!(matches!(result, Err(DriverError::Timeout)));
        assert!(start.elapsed() < Duration::from_secs(1));
        // 命令本身照常发出
        assert!(wait_until(|| base.written().len() == 1));
    }

    #[test]
    fn test_request_after_link_closed() {
        let base = MockSerial::new();
        base.close();
        let rover = spawn_base(&base);
        assert!(wait_until(|| !rover.is_healthy()));

        let result = rover.request(control::emergency_stop(), Duration::from_millis(100));
        assert!(matches!(result, Err(DriverError::ChannelClosed)));
    }

    #[test]
    fn test_drop_joins_threads_promptly() {
        let base = MockSerial::new();
        let rover = spawn_base(&base);
        let start = Instant::now();
        drop(rover);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
