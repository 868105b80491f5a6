//! 类型标签常量定义和枚举
//!
//! 底盘固件通过 `"T"` 字段区分命令/反馈语义。

use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 反馈标签
// ============================================================================

/// 底盘周期反馈（轮速、姿态、电压）
pub const TAG_BASE_FEEDBACK: i64 = 1001;

/// 传感器事件（保留值，事件记录不进入状态缓存）
pub const TAG_SENSOR_EVENT: i64 = 1003;

// ============================================================================
// 舵机标签默认值（随产品变化，运行时以配置为准）
// ============================================================================

/// 设置舵机 ID
pub const DEFAULT_TAG_SET_SERVO_ID: i64 = 501;

/// 舵机力矩锁定
pub const DEFAULT_TAG_SERVO_TORQUE: i64 = 210;

/// 设置舵机中位
pub const DEFAULT_TAG_SET_SERVO_MID: i64 = 502;

/// 已知的固定命令标签
///
/// 固件侧的命令语义完全由标签决定；本子系统只透传命令体。
/// 未列出的标签仍可通过 [`Command::new`](crate::Command::new) 直接发送。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(i64)]
pub enum CommandTag {
    /// 急停
    EmergencyStop = 0,
    /// 左右轮速度控制
    SpeedCtrl = 1,
    /// OLED 单行显示
    OledCtrl = 3,
    /// OLED 恢复默认显示
    OledDefault = -3,
    /// 选择外挂模块（0: 无, 1: 机械臂, 2: 云台）
    ModuleSelect = 4,
    /// 开关串口反馈流
    FeedbackFlow = 131,
    /// 灯光 PWM 控制
    LightsCtrl = 132,
    /// 云台位置控制（带速度、加速度）
    GimbalCtrl = 133,
    /// 云台基础控制
    GimbalBaseCtrl = 141,
    /// 设置反馈间隔
    FeedbackInterval = 142,
    /// 开关串口回显
    UartEcho = 143,
    /// ESP-NOW 模式
    EspNowMode = 300,
    /// 产品版本
    ProductVersion = 900,
}

impl CommandTag {
    /// 标签数值
    pub fn value(self) -> i64 {
        self.into()
    }
}

/// 入站记录的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// 事件记录：立即返回，不缓存
    Event,
    /// 状态记录：覆盖单槽缓存
    State,
}

impl RecordKind {
    /// 根据类型标签分类
    pub fn from_tag(tag: i64) -> Self {
        if tag == TAG_SENSOR_EVENT {
            RecordKind::Event
        } else {
            RecordKind::State
        }
    }
}
