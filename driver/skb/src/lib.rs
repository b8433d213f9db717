//! 包缓冲模块
//!
//! - **[PktBuf]**：带前端预留空间（headroom）的单包缓冲，总线帧头、CDC/BDC 头从前端压入或剥离
//! - **[BufferPool]**：缓冲分配器协作者（acquire / release，resize 由 [PktBuf::resize] 完成）
//! - **[HeapPool]**：基于全局堆的默认分配器，带单包上限

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod pkt;
mod pool;

pub use pkt::PktBuf;
pub use pool::{BufferPool, HeapPool, DEFAULT_MAX_PACKET};
