//! 缓冲分配器

use crate::PktBuf;

/// 单包默认上限（与总线最大传输单元同量级）
pub const DEFAULT_MAX_PACKET: usize = 2048;

/// 缓冲分配器协作者。
///
/// 分配失败是普通返回值（`None`），调用方将其转换为内存不足错误。
pub trait BufferPool: Send + Sync {
    /// 分配 data 长度为 `len`、前端预留 `headroom` 的缓冲（内容清零）。
    fn acquire(&self, len: usize, headroom: usize) -> Option<PktBuf>;

    /// 归还缓冲。
    fn release(&self, pkt: PktBuf) {
        drop(pkt);
    }
}

/// 全局堆分配器，超过 `max_len` 的请求失败。
#[derive(Debug, Clone, Copy)]
pub struct HeapPool {
    max_len: usize,
}

impl HeapPool {
    pub const fn new(max_len: usize) -> Self {
        HeapPool { max_len }
    }
}

impl Default for HeapPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET)
    }
}

impl BufferPool for HeapPool {
    fn acquire(&self, len: usize, headroom: usize) -> Option<PktBuf> {
        if len.saturating_add(headroom) > self.max_len {
            log::warn!(target: "wireless::skb", "acquire {}+{} exceeds pool limit {}", headroom, len, self.max_len);
            return None;
        }
        Some(PktBuf::with_headroom(len, headroom))
    }
}
