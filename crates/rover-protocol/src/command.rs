//! 出站命令
//!
//! 命令是一个有序的字符串键到 JSON 值的映射，必须包含整数 `"T"` 标签。
//! 本子系统只关心标签，命令体对它是不透明的。

use crate::{CommandTag, ProtocolError, TYPE_TAG_KEY, tag_from_value};
use serde::Serialize;
use serde_json::{Map, Value};

/// 底盘命令
///
/// 入队后不可变；写入串口后销毁。
///
/// # Example
///
/// ```
/// use rover_protocol::Command;
///
/// let cmd = Command::new(1).with("L", 0.2).with("R", 0.2);
/// assert_eq!(cmd.tag(), 1);
/// assert_eq!(cmd.to_wire().unwrap(), b"{\"T\":1,\"L\":0.2,\"R\":0.2}\n");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Command {
    body: Map<String, Value>,
}

impl Command {
    /// 创建只含类型标签的命令
    pub fn new(tag: impl Into<i64>) -> Self {
        let mut body = Map::new();
        body.insert(TYPE_TAG_KEY.to_string(), Value::from(tag.into()));
        Self { body }
    }

    /// 追加字段（链式）
    ///
    /// 对 `"T"` 的覆盖会被忽略，保证标签始终是构造时给定的整数。
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != TYPE_TAG_KEY {
            self.body.insert(key, value.into());
        }
        self
    }

    /// 从已有映射构造（必须包含整数 `"T"`）
    pub fn from_map(body: Map<String, Value>) -> Result<Self, ProtocolError> {
        let tag = body.get(TYPE_TAG_KEY).ok_or(ProtocolError::MissingTypeTag)?;
        tag_from_value(tag)?;
        Ok(Self { body })
    }

    /// 从 JSON 文本构造（CLI / Web 层透传原始命令时使用）
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        match serde_json::from_str::<Value>(text).map_err(ProtocolError::InvalidJson)? {
            Value::Object(body) => Self::from_map(body),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// 类型标签
    pub fn tag(&self) -> i64 {
        self.body
            .get(TYPE_TAG_KEY)
            .and_then(|v| tag_from_value(v).ok())
            .unwrap_or_default()
    }

    /// 已知标签（未知返回 `None`）
    pub fn known_tag(&self) -> Option<CommandTag> {
        CommandTag::try_from(self.tag()).ok()
    }

    /// 读取字段
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// 命令体（只读）
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// 序列化为线路格式：JSON 文本 + `\n`
    pub fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = serde_json::to_vec(&self.body).map_err(ProtocolError::Serialize)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

impl From<CommandTag> for Command {
    fn from(tag: CommandTag) -> Self {
        Command::new(tag.value())
    }
}

impl TryFrom<Map<String, Value>> for Command {
    type Error = ProtocolError;

    fn try_from(body: Map<String, Value>) -> Result<Self, Self::Error> {
        Command::from_map(body)
    }
}

impl TryFrom<Value> for Command {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(body) => Command::from_map(body),
            _ => Err(ProtocolError::NotAnObject),
        }
    }
}
