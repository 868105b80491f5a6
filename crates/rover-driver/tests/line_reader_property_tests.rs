//! 行读取器属性测试
//!
//! 无论字节如何分批到达，读出的行与写入的行逐字节一致，部分前缀从不丢失。

use proptest::prelude::*;
use rover_driver::FramedReader;
use rover_serial::MockSerial;

fn push_in_chunks(mock: &MockSerial, bytes: &[u8], sizes: &[usize]) {
    let mut offset = 0;
    let mut i = 0;
    while offset < bytes.len() {
        let size = sizes[i % sizes.len()].min(bytes.len() - offset);
        mock.push(&bytes[offset..offset + size]);
        offset += size;
        i += 1;
    }
}

proptest! {
    #[test]
    fn prop_lines_survive_arbitrary_chunking(
        lines in prop::collection::vec("[a-zA-Z0-9{}:,\" ]{0,40}", 1..12),
        sizes in prop::collection::vec(1usize..24, 1..16),
        chunk_size in 1usize..64,
    ) {
        let mut stream = Vec::new();
        for line in &lines {
            stream.extend_from_slice(line.as_bytes());
            stream.push(b'\n');
        }

        let mock = MockSerial::new();
        push_in_chunks(&mock, &stream, &sizes);
        let mut reader = FramedReader::with_chunk_size(mock, chunk_size);

        for line in &lines {
            let got = reader.read_line().unwrap();
            prop_assert_eq!(&got[..got.len() - 1], line.as_bytes());
            prop_assert_eq!(got.last(), Some(&b'\n'));
        }
        prop_assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn prop_unterminated_tail_is_kept(
        head in "[a-z]{1,20}",
        tail in "[a-z]{1,20}",
    ) {
        let mock = MockSerial::new();
        mock.push(format!("{head}\n{tail}"));
        let mut reader = FramedReader::new(mock.clone());

        prop_assert_eq!(reader.read_line().unwrap(), format!("{head}\n").into_bytes());
        prop_assert_eq!(reader.buffered_len(), tail.len());

        mock.push("!\n");
        prop_assert_eq!(reader.read_line().unwrap(), format!("{tail}!\n").into_bytes());
    }
}

#[test]
fn test_prefix_across_two_reads() {
    let mock = MockSerial::new();
    mock.push("abc");
    mock.push("def\n");
    let mut reader = FramedReader::new(mock);
    assert_eq!(reader.read_line().unwrap(), b"abcdef\n");
}
