//! ### English
//! Byte sinks and sources used when exporting rendered images or reading scene data.
//!
//! Both traits report progress as a byte count: a short count (usually `0`) is the only
//! failure signal, mirroring how the stream layer is consumed by the scene-graph writers.
//!
//! ### 中文
//! 导出渲染图像或读取场景数据时使用的字节输出端与输入端。
//!
//! 两个 trait 都以字节数报告进度：返回的字节数不足（通常为 `0`）是唯一的失败信号，
//! 与场景图写出器使用流层的方式一致。

mod reader;
mod writer;

pub use reader::{FileReader, MemoryReader, StreamReader};
pub use writer::{FileWriter, MemoryWriter, Reallocator, StreamWriter, grow_reallocator};

/// ### English
/// Which concrete sink or source a trait object wraps.
///
/// ### 中文
/// trait 对象所包装的具体输出端/输入端类别。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    File,
    Memory,
    Stream,
}

/// ### English
/// Destination for serialized output.
///
/// ### 中文
/// 序列化输出的目标。
pub trait Writer {
    /// ### English
    /// Writes `buf` and returns the number of bytes accepted. `is_binary` tells the sink
    /// whether the payload is binary or text; sinks that make no distinction ignore it.
    ///
    /// ### 中文
    /// 写入 `buf` 并返回被接受的字节数。`is_binary` 表示数据是二进制还是文本；
    /// 不区分两者的输出端会忽略该参数。
    fn write(&mut self, buf: &[u8], is_binary: bool) -> usize;

    /// ### English
    /// Total bytes accepted so far.
    ///
    /// ### 中文
    /// 迄今为止已接受的总字节数。
    fn bytes_in_buffer(&self) -> usize;

    fn kind(&self) -> StreamKind;

    fn flush(&mut self) -> bool {
        true
    }
}

/// ### English
/// Source of serialized input.
///
/// ### 中文
/// 序列化输入的来源。
pub trait Reader {
    /// ### English
    /// Fills as much of `buf` as possible; `0` means end of input or a read error.
    ///
    /// ### 中文
    /// 尽可能填充 `buf`；返回 `0` 表示输入结束或读取出错。
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// ### English
    /// Name of the underlying file; empty for in-memory and stream sources.
    ///
    /// ### 中文
    /// 底层文件名；内存与流来源为空字符串。
    fn filename(&self) -> &str {
        ""
    }

    fn kind(&self) -> StreamKind;

    /// ### English
    /// Drains the source into a vector.
    ///
    /// ### 中文
    /// 将来源中的剩余数据全部读入一个 vector。
    fn read_to_end(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk);
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }
}
