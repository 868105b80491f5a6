//! Mock 串口（无硬件依赖，用于测试）
//!
//! 输入侧是一个数据块队列：每次 `read` 最多返回队首的一个数据块，
//! 用来模拟字节"分批到达"。[`MockSerial::push_pause`] 插入一次读超时，
//! 暂停之后的数据对 `bytes_available` / `clear_input` 不可见，相当于"稍后才到达"。
//!
//! 克隆共享同一份内部状态，测试代码持有一份克隆即可在链路被拆分、
//! 被移交给 IO 线程之后继续注入数据与检查写入。

use crate::{SerialError, SerialReader, SerialWriter, SplittableSource};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
enum MockChunk {
    Data(Vec<u8>),
    Pause,
}

#[derive(Debug, Default)]
struct MockState {
    chunks: VecDeque<MockChunk>,
    closed: bool,
    written: Vec<Vec<u8>>,
    fail_writes: usize,
    clear_count: usize,
}

/// Mock 串口
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    state: Arc<Mutex<MockState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一块到达的数据
    pub fn push(&self, data: impl AsRef<[u8]>) {
        let data = data.as_ref();
        if !data.is_empty() {
            self.state.lock().chunks.push_back(MockChunk::Data(data.to_vec()));
        }
    }

    /// 插入一次读超时
    pub fn push_pause(&self) {
        self.state.lock().chunks.push_back(MockChunk::Pause);
    }

    /// 关闭输入：数据读完后 `read` 返回 [`SerialError::Disconnected`]
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// 尚未被读取的数据字节数（含暂停之后的数据）
    pub fn pending_input(&self) -> usize {
        self.state
            .lock()
            .chunks
            .iter()
            .map(|chunk| match chunk {
                MockChunk::Data(d) => d.len(),
                MockChunk::Pause => 0,
            })
            .sum()
    }

    /// 已写入的每一次 `write_all`
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// 已写入的全部字节
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().written.concat()
    }

    /// 让接下来 `count` 次写入失败
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().fail_writes = count;
    }

    /// `clear_input` 被调用的次数
    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_count
    }
}

impl SerialReader for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        {
            let mut state = self.state.lock();
            match state.chunks.pop_front() {
                Some(MockChunk::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        state.chunks.push_front(MockChunk::Data(data.split_off(n)));
                    }
                    return Ok(n);
                },
                Some(MockChunk::Pause) => return Err(SerialError::Timeout),
                None if state.closed => return Err(SerialError::Disconnected),
                None => {},
            }
        }
        std::thread::sleep(Duration::from_millis(1));
        Err(SerialError::Timeout)
    }

    fn bytes_available(&mut self) -> Result<usize, SerialError> {
        let state = self.state.lock();
        Ok(state
            .chunks
            .iter()
            .take_while(|chunk| matches!(chunk, MockChunk::Data(_)))
            .map(|chunk| match chunk {
                MockChunk::Data(d) => d.len(),
                MockChunk::Pause => 0,
            })
            .sum())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        state.clear_count += 1;
        while matches!(state.chunks.front(), Some(MockChunk::Data(_))) {
            state.chunks.pop_front();
        }
        Ok(())
    }
}

impl SerialWriter for MockSerial {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        let mut state = self.state.lock();
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(SerialError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        state.written.push(data.to_vec());
        Ok(())
    }
}

impl SplittableSource for MockSerial {
    type Reader = MockSerial;
    type Writer = MockSerial;

    fn split(self) -> Result<(Self::Reader, Self::Writer), SerialError> {
        Ok((self.clone(), self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_returns_one_chunk_at_a_time() {
        let mut mock = MockSerial::new();
        mock.push(b"abc");
        mock.push(b"def\n");

        let mut buf = [0u8; 16];
        assert_eq!(mock.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(mock.read(&mut buf).unwrap(), 4);
        assert!(mock.read(&mut buf).unwrap_err().is_timeout());
    }

    #[test]
    fn test_partial_read_keeps_remainder() {
        let mut mock = MockSerial::new();
        mock.push(b"hello");
        let mut buf = [0u8; 2];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(mock.bytes_available().unwrap(), 3);
    }

    #[test]
    fn test_pause_hides_later_data() {
        let mut mock = MockSerial::new();
        mock.push(b"old");
        mock.push_pause();
        mock.push(b"new");

        assert_eq!(mock.bytes_available().unwrap(), 3);
        mock.clear_input().unwrap();
        assert_eq!(mock.clear_count(), 1);
        assert_eq!(mock.bytes_available().unwrap(), 0);
        assert_eq!(mock.pending_input(), 3);

        let mut buf = [0u8; 8];
        assert!(mock.read(&mut buf).unwrap_err().is_timeout());
        assert_eq!(mock.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"new");
    }

    #[test]
    fn test_closed_reports_disconnect() {
        let mut mock = MockSerial::new();
        mock.close();
        let mut buf = [0u8; 1];
        assert!(matches!(mock.read(&mut buf), Err(SerialError::Disconnected)));
    }

    #[test]
    fn test_split_shares_state() {
        let mock = MockSerial::new();
        let (mut reader, mut writer) = mock.clone().split().unwrap();

        writer.write_all(b"{\"T\":0}\n").unwrap();
        mock.fail_next_writes(1);
        assert!(writer.write_all(b"x").is_err());
        assert_eq!(mock.written(), vec![b"{\"T\":0}\n".to_vec()]);

        mock.push(b"z");
        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
    }
}
