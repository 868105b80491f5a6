//! 钩子系统（Hook System）
//!
//! 在遥测记录解码、命令写出之后触发自定义回调。
//!
//! - **非阻塞**: 回调运行在 IO 线程上，必须立即返回；需要耗时处理时转发到 Channel
//! - **两种注册方式**: 接收全部记录的回调，或按类型标签注册的处理器（注册时即确定分派表）
//!
//! # 使用示例
//!
//! ```rust
//! use rover_driver::hooks::{EventForwarder, HookManager, TelemetryCallback};
//! use rover_protocol::TelemetryRecord;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut hooks = HookManager::new();
//! let (forwarder, rx) = EventForwarder::new(16);
//! hooks.add_callback(Arc::new(forwarder));
//!
//! let event = TelemetryRecord::from_value(json!({"T": 1003, "mac": "AA"})).unwrap();
//! hooks.trigger_record(&event);
//! assert_eq!(rx.try_recv().unwrap().tag(), 1003);
//! ```

use crossbeam_channel::{Receiver, Sender, bounded};
use rover_protocol::{Command, RecordKind, TelemetryRecord};
use std::collections::HashMap;
use std::sync::Arc;

/// 遥测回调 Trait
///
/// 所有方法都有空的默认实现，只需覆盖关心的部分。
pub trait TelemetryCallback: Send + Sync {
    /// 收到事件记录（不会进入状态缓存）
    fn on_event(&self, record: &TelemetryRecord) {
        let _ = record;
    }

    /// 收到状态记录（已写入状态缓存）
    fn on_state(&self, record: &TelemetryRecord) {
        let _ = record;
    }

    /// 命令成功写入串口之后调用
    ///
    /// 写入失败的命令不会触发。
    fn on_command_sent(&self, command: &Command) {
        let _ = command;
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，由 `RoverContext` 中的 `RwLock` 保护。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn TelemetryCallback>>,
    tag_handlers: HashMap<i64, Vec<Arc<dyn TelemetryCallback>>>,
}

impl HookManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加接收全部记录的回调
    pub fn add_callback(&mut self, callback: Arc<dyn TelemetryCallback>) {
        self.callbacks.push(callback);
    }

    /// 添加只接收指定类型标签的处理器
    pub fn add_tag_handler(&mut self, tag: i64, handler: Arc<dyn TelemetryCallback>) {
        self.tag_handlers.entry(tag).or_default().push(handler);
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.callbacks.clear();
        self.tag_handlers.clear();
    }

    /// 分派一条已解码的记录（在遥测线程中调用）
    pub fn trigger_record(&self, record: &TelemetryRecord) {
        let by_tag = self.tag_handlers.get(&record.tag()).into_iter().flatten();
        for callback in self.callbacks.iter().chain(by_tag) {
            match record.kind() {
                RecordKind::Event => callback.on_event(record),
                RecordKind::State => callback.on_state(record),
            }
        }
    }

    /// 命令写出后调用（在写线程中调用）
    pub fn trigger_command_sent(&self, command: &Command) {
        for callback in self.callbacks.iter() {
            callback.on_command_sent(command);
        }
    }

    /// 回调总数（含按标签注册的）
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len() + self.tag_handlers.values().map(Vec::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 把事件记录转发到有界 Channel 的回调
///
/// Channel 满时丢弃新事件（`try_send`），不会阻塞遥测线程。
pub struct EventForwarder {
    tx: Sender<TelemetryRecord>,
}

impl EventForwarder {
    pub fn new(capacity: usize) -> (Self, Receiver<TelemetryRecord>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl TelemetryCallback for EventForwarder {
    fn on_event(&self, record: &TelemetryRecord) {
        let _ = self.tx.try_send(record.clone());
    }
}
