//! 共享状态上下文
//!
//! 每个槽位只有一个写者（对应的 IO 线程），读者拿到的是 `Arc` 快照，
//! 不会看到写了一半的数据。

use crate::heartbeat::ConnectionMonitor;
use crate::hooks::HookManager;
use crate::lidar::Rotation;
use crate::sensor::SensorBatch;
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::{Condvar, Mutex};
use rover_protocol::TelemetryRecord;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// 超过这个时间没有收到底盘记录即视为连接断开
pub const DEFAULT_FEEDBACK_TIMEOUT: Duration = Duration::from_secs(1);

/// 共享状态上下文
pub struct RoverContext {
    /// 最近一条状态记录（单槽，后写覆盖）
    pub feedback: ArcSwapOption<TelemetryRecord>,
    /// 最近一条事件记录（仅供观察，不参与状态缓存）
    pub last_event: ArcSwapOption<TelemetryRecord>,
    /// 最近完成的一圈激光雷达数据
    pub rotation: ArcSwap<Rotation>,
    rotation_seq: Mutex<u64>,
    rotation_ready: Condvar,
    /// 最近一批辅助传感器记录
    pub sensor_batch: Arc<SensorBatch>,
    /// 钩子管理器（IO 线程中用 `try_read` 触发）
    pub hooks: RwLock<HookManager>,
    /// 底盘链路活性
    pub connection: ConnectionMonitor,
    /// 最近一次下发的灯光 PWM
    pub lights: LightState,
}

impl RoverContext {
    pub fn new() -> Self {
        Self::with_feedback_timeout(DEFAULT_FEEDBACK_TIMEOUT)
    }

    pub fn with_feedback_timeout(timeout: Duration) -> Self {
        Self {
            feedback: ArcSwapOption::empty(),
            last_event: ArcSwapOption::empty(),
            rotation: ArcSwap::from_pointee(Rotation::default()),
            rotation_seq: Mutex::new(0),
            rotation_ready: Condvar::new(),
            sensor_batch: Arc::new(SensorBatch::new()),
            hooks: RwLock::new(HookManager::new()),
            connection: ConnectionMonitor::new(timeout),
            lights: LightState::default(),
        }
    }

    /// 缓存状态记录并刷新链路活性
    pub fn store_feedback(&self, record: Arc<TelemetryRecord>) {
        self.feedback.store(Some(record));
        self.connection.record_seen();
    }

    /// 记录最近的事件（不触碰状态缓存）
    pub fn store_event(&self, record: Arc<TelemetryRecord>) {
        self.last_event.store(Some(record));
        self.connection.record_seen();
    }

    /// 发布新完成的一圈并唤醒等待者
    pub fn publish_rotation(&self, rotation: Rotation) {
        self.rotation.store(Arc::new(rotation));
        let mut seq = self.rotation_seq.lock();
        *seq += 1;
        self.rotation_ready.notify_all();
    }

    /// 已发布的圈数
    pub fn rotation_count(&self) -> u64 {
        *self.rotation_seq.lock()
    }

    /// 等待下一圈（从调用时刻算起的新一圈）
    ///
    /// 超时返回 `None`。
    pub fn wait_rotation(&self, timeout: Duration) -> Option<Arc<Rotation>> {
        let deadline = Instant::now() + timeout;
        let mut seq = self.rotation_seq.lock();
        let start = *seq;
        while *seq == start {
            if self
                .rotation_ready
                .wait_until(&mut seq, deadline)
                .timed_out()
            {
                if *seq == start {
                    return None;
                }
                break;
            }
        }
        Some(self.rotation.load_full())
    }
}

impl Default for RoverContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 灯光状态（底盘灯 IO4，头灯 IO5）
#[derive(Debug, Default)]
pub struct LightState {
    base: AtomicU8,
    head: AtomicU8,
}

impl LightState {
    pub fn set(&self, base_pwm: u8, head_pwm: u8) {
        self.base.store(base_pwm, Ordering::Relaxed);
        self.head.store(head_pwm, Ordering::Relaxed);
    }

    /// `(base_pwm, head_pwm)`
    pub fn get(&self) -> (u8, u8) {
        (
            self.base.load(Ordering::Relaxed),
            self.head.load(Ordering::Relaxed),
        )
    }
}
