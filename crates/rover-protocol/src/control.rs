//! 控制命令构建
//!
//! 底盘常用 JSON 命令的类型化构造函数。字段名与固件保持一致（大小写敏感）。

use crate::{Command, CommandTag};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 急停（云台/底盘立即停止）
pub fn emergency_stop() -> Command {
    Command::from(CommandTag::EmergencyStop)
}

/// 左右轮速度控制
///
/// # 参数
/// - `left`: 左轮速度（m/s，负值后退）
/// - `right`: 右轮速度（m/s）
pub fn speed_ctrl(left: f64, right: f64) -> Command {
    Command::from(CommandTag::SpeedCtrl)
        .with("L", left)
        .with("R", right)
}

/// OLED 显示一行文本（`line`: 0-3）
pub fn oled_line(line: u8, text: impl Into<String>) -> Command {
    Command::from(CommandTag::OledCtrl)
        .with("lineNum", line)
        .with("Text", text.into())
}

/// OLED 恢复默认显示
pub fn oled_default() -> Command {
    Command::from(CommandTag::OledDefault)
}

/// 外挂模块类型（未知数值按无模块处理）
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ModuleKind {
    /// 无模块
    #[num_enum(default)]
    None = 0,
    /// 机械臂
    Arm = 1,
    /// 云台
    PanTilt = 2,
}

impl ModuleKind {
    /// 从配置数值转换
    pub fn from_config(value: u8) -> Self {
        Self::try_from(value).unwrap_or(ModuleKind::None)
    }
}

/// 选择外挂模块
pub fn module_select(kind: ModuleKind) -> Command {
    Command::from(CommandTag::ModuleSelect).with("cmd", u8::from(kind))
}

/// 开关串口反馈流
pub fn feedback_flow(enabled: bool) -> Command {
    Command::from(CommandTag::FeedbackFlow).with("cmd", u8::from(enabled))
}

/// 设置反馈间隔（毫秒）
pub fn feedback_interval(interval_ms: u32) -> Command {
    Command::from(CommandTag::FeedbackInterval).with("cmd", interval_ms)
}

/// 开关串口回显
pub fn uart_echo(enabled: bool) -> Command {
    Command::from(CommandTag::UartEcho).with("cmd", u8::from(enabled))
}

/// 灯光 PWM 控制
///
/// - `base_pwm`: 底盘灯（IO4）
/// - `head_pwm`: 头灯（IO5）
pub fn lights_ctrl(base_pwm: u8, head_pwm: u8) -> Command {
    Command::from(CommandTag::LightsCtrl)
        .with("IO4", base_pwm)
        .with("IO5", head_pwm)
}

/// 云台位置控制
///
/// - `x`: 水平角（-180 ~ 180，正值向右）
/// - `y`: 俯仰角（-30 ~ 90，正值向上）
pub fn gimbal_ctrl(x: f64, y: f64, speed: f64, acceleration: f64) -> Command {
    Command::from(CommandTag::GimbalCtrl)
        .with("X", x)
        .with("Y", y)
        .with("SPD", speed)
        .with("ACC", acceleration)
}

/// 云台基础控制（无加速度参数）
pub fn gimbal_base_ctrl(x: f64, y: f64, speed: f64) -> Command {
    Command::from(CommandTag::GimbalBaseCtrl)
        .with("X", x)
        .with("Y", y)
        .with("SPD", speed)
}

/// 产品版本（`main`: 1 RaspRover / 2 UGV Rover / 3 UGV Beast）
pub fn product_version(main: u8, module: u8) -> Command {
    Command::from(CommandTag::ProductVersion)
        .with("main", main)
        .with("module", module)
}

/// 设置舵机 ID（标签随产品变化，由调用方从配置传入）
pub fn servo_id_set(tag: i64, old_id: u8, new_id: u8) -> Command {
    Command::new(tag).with("raw", old_id).with("new", new_id)
}

/// 舵机力矩锁定（`id` 255 为广播）
pub fn servo_torque_lock(tag: i64, id: u8, locked: bool) -> Command {
    Command::new(tag).with("id", id).with("cmd", u8::from(locked))
}

/// 设置舵机中位
pub fn servo_mid_set(tag: i64, id: u8) -> Command {
    Command::new(tag).with("id", id)
}
