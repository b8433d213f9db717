//! PktBuf：控制/事件/数据帧共用的包缓冲
//!
//! 布局：`[ headroom | data (len) | tailroom ]`。

use alloc::vec::Vec;
use core::fmt;
use core::ops::{Deref, DerefMut};

/// 单包缓冲。
///
/// - `push(n)`：在 data 前占用 n 字节 headroom（写帧头）
/// - `pull(n)`：从 data 头部剥离 n 字节（解帧头）
/// - `put(n)`：在尾部追加 n 字节
/// - `resize(len)`：在 tailroom 范围内改变 data 长度，新增部分清零
#[derive(Clone, PartialEq, Eq)]
pub struct PktBuf {
    storage: Vec<u8>,
    head: usize,
    len: usize,
}

impl PktBuf {
    /// 分配 `headroom + len` 字节，data 长度为 `len`（内容清零）。
    pub fn with_headroom(len: usize, headroom: usize) -> Self {
        let mut storage = Vec::with_capacity(headroom + len);
        storage.resize(headroom + len, 0);
        PktBuf {
            storage,
            head: headroom,
            len,
        }
    }

    /// 复制 `data` 到新缓冲，并在前端预留 `headroom`。
    pub fn from_slice(data: &[u8], headroom: usize) -> Self {
        let mut pkt = Self::with_headroom(data.len(), headroom);
        pkt.data_mut().copy_from_slice(data);
        pkt
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.storage[self.head..self.head + self.len]
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.head..self.head + self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.head
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.storage.len() - self.head - self.len
    }

    /// 在尾部追加 n 字节，返回可写切片；tailroom 不足时按需扩容。
    pub fn put(&mut self, n: usize) -> &mut [u8] {
        let start = self.head + self.len;
        if self.tailroom() < n {
            self.storage.resize(start + n, 0);
        }
        self.len += n;
        &mut self.storage[start..start + n]
    }

    /// 剥离 data 头部 n 字节；n 超过 data 长度时返回 false 且不修改缓冲。
    pub fn pull(&mut self, n: usize) -> bool {
        if n > self.len {
            return false;
        }
        self.head += n;
        self.len -= n;
        true
    }

    /// 在 data 前占用 n 字节 headroom，返回新头部的可写切片；headroom 不足返回 None。
    pub fn push(&mut self, n: usize) -> Option<&mut [u8]> {
        if self.head < n {
            return None;
        }
        self.head -= n;
        self.len += n;
        Some(&mut self.storage[self.head..self.head + n])
    }

    /// 截断到 `len`（不大于当前长度时生效）。
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// 改变 data 长度；增长部分清零，不移动 data 起点。
    pub fn resize(&mut self, len: usize) {
        if len <= self.len {
            self.len = len;
            return;
        }
        let old_end = self.head + self.len;
        let new_end = self.head + len;
        if new_end > self.storage.len() {
            self.storage.resize(new_end, 0);
        }
        self.storage[old_end..new_end].fill(0);
        self.len = len;
    }
}

impl Deref for PktBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.data()
    }
}

impl DerefMut for PktBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl fmt::Debug for PktBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PktBuf")
            .field("headroom", &self.head)
            .field("len", &self.len)
            .finish()
    }
}
