//! 入站遥测记录解析
//!
//! 每一行 JSON 文本解析为一条 [`TelemetryRecord`]。缺少 `"T"` 的记录在解析阶段即被拒绝。

use crate::tags::{RecordKind, TAG_BASE_FEEDBACK};
use crate::{ProtocolError, TYPE_TAG_KEY, tag_from_value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 遥测记录
///
/// 不可变快照；读者拿到的是副本或 `Arc`，从不引用解析缓冲区。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(skip)]
    tag: i64,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TelemetryRecord {
    /// 从一行原始字节解析（允许带 `\r\n` 结尾）
    ///
    /// # 错误
    /// - `InvalidUtf8` / `InvalidJson`: 内容损坏
    /// - `NotAnObject`: 顶层不是 JSON 对象
    /// - `MissingTypeTag` / `InvalidTypeTag`: 缺少或非法的 `"T"`
    pub fn from_line(line: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(line)?;
        let value: Value = serde_json::from_str(text.trim()).map_err(ProtocolError::InvalidJson)?;
        Self::from_value(value)
    }

    /// 从 JSON 值构造
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let tag = tag_from_value(fields.get(TYPE_TAG_KEY).ok_or(ProtocolError::MissingTypeTag)?)?;
        Ok(Self { tag, fields })
    }

    /// 类型标签
    pub fn tag(&self) -> i64 {
        self.tag
    }

    /// 记录分类（事件 / 状态）
    pub fn kind(&self) -> RecordKind {
        RecordKind::from_tag(self.tag)
    }

    /// 是否为传感器事件记录
    pub fn is_event(&self) -> bool {
        self.kind() == RecordKind::Event
    }

    /// 读取字段
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 读取数值字段
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// 全部字段（包含 `"T"`）
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// 消费并返回字段映射
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// 底盘周期反馈（T=1001）
///
/// 不同产品的固件上报字段不完全相同，因此全部为可选。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BaseFeedback {
    /// 左轮速度
    #[serde(rename = "L")]
    pub left_speed: Option<f64>,
    /// 右轮速度
    #[serde(rename = "R")]
    pub right_speed: Option<f64>,
    /// 横滚角（度）
    #[serde(rename = "r")]
    pub roll: Option<f64>,
    /// 俯仰角（度）
    #[serde(rename = "p")]
    pub pitch: Option<f64>,
    /// 偏航角（度）
    #[serde(rename = "y")]
    pub yaw: Option<f64>,
    /// 温度（°C）
    pub temp: Option<f64>,
    /// 电池电压（V）
    #[serde(rename = "v")]
    pub voltage: Option<f64>,
}

impl TryFrom<&TelemetryRecord> for BaseFeedback {
    type Error = ProtocolError;

    fn try_from(record: &TelemetryRecord) -> Result<Self, Self::Error> {
        if record.tag() != TAG_BASE_FEEDBACK {
            return Err(ProtocolError::InvalidTypeTag {
                value: record.tag().to_string(),
            });
        }
        BaseFeedback::deserialize(Value::Object(record.fields.clone()))
            .map_err(ProtocolError::InvalidJson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_line_with_terminator() {
        let record = TelemetryRecord::from_line(b"{\"T\":1001,\"L\":0.1,\"v\":12.1}\r\n").unwrap();
        assert_eq!(record.tag(), 1001);
        assert_eq!(record.get_f64("L"), Some(0.1));
        assert_eq!(record.kind(), RecordKind::State);
    }

    #[test]
    fn test_event_record() {
        let record = TelemetryRecord::from_line(b"{\"T\":1003,\"mac\":\"AA\"}\n").unwrap();
        assert!(record.is_event());
        assert_eq!(record.get("mac"), Some(&json!("AA")));
    }

    #[test]
    fn test_from_line_errors() {
        assert!(matches!(
            TelemetryRecord::from_line(b"{\"L\":1}\n"),
            Err(ProtocolError::MissingTypeTag)
        ));
        assert!(matches!(
            TelemetryRecord::from_line(b"{\"T\":1001\n"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            TelemetryRecord::from_line(&[0xFF, 0xFE, b'\n']),
            Err(ProtocolError::InvalidUtf8(_))
        ));
        assert!(matches!(
            TelemetryRecord::from_line(b"42\n"),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn test_base_feedback_view() {
        let record = TelemetryRecord::from_value(json!({
            "T": 1001, "L": 0.2, "R": 0.3, "r": 1.5, "p": -2.0, "v": 11.9
        }))
        .unwrap();
        let fb = BaseFeedback::try_from(&record).unwrap();
        assert_eq!(fb.left_speed, Some(0.2));
        assert_eq!(fb.right_speed, Some(0.3));
        assert_eq!(fb.roll, Some(1.5));
        assert_eq!(fb.pitch, Some(-2.0));
        assert_eq!(fb.yaw, None);
        assert_eq!(fb.voltage, Some(11.9));

        let other = TelemetryRecord::from_value(json!({"T": 1003})).unwrap();
        assert!(BaseFeedback::try_from(&other).is_err());
    }

    #[test]
    fn test_record_serializes_back_to_object() {
        let record = TelemetryRecord::from_value(json!({"T": 1001, "v": 12.0})).unwrap();
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"T":1001,"v":12.0}"#);
    }
}
