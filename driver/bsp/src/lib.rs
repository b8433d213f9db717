//! BSP 层：FullMAC 芯片控制面的底层
//!
//! - **error**：错误分类 [WhdError] 与 "unsupported" 软失败路径
//! - **bus / sync**：平台协作者（总线、信号量与时钟），由 [Platform] 汇总
//! - **cdc / ioctl**：CDC/BDC 帧头、IOVAR 名称编码、命令号
//! - **cmd**：命令通道（单一未完成请求、关联 id 校验、超时）
//! - **awake**：总线保活计数
//! - **chip**：按 chip id 选取的常量表

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[cfg(all(feature = "testing", not(test)))]
extern crate std;

mod awake;
mod bus;
pub mod cdc;
mod chip;
mod cmd;
mod error;
pub mod ioctl;
mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use awake::{AwakeGuard, KeepAwake};
pub use bus::{Bus, BusChannel};
pub use cdc::{BdcHeader, CdcHeader, CmdKind, IovarName};
pub use chip::{detect_chip, ChipConfig, CHIPCOMMON_CHIPID_ADDR};
pub use cmd::{CmdChannel, DEFAULT_IOCTL_TIMEOUT};
pub use error::{Tolerate, WhdError, WhdResult, BCME_UNSUPPORTED};
pub use skb::{BufferPool, PktBuf};
pub use sync::{drain, Os, SemLock, SemLockGuard, Semaphore};

/// 总线层帧头预留（SDPCM 头与对齐填充）
pub const BUS_HEADROOM: usize = 16;

/// 驱动所需的全部平台协作者
pub trait Platform: Bus + Os + BufferPool + 'static {}

impl<T: Bus + Os + BufferPool + 'static> Platform for T {}
