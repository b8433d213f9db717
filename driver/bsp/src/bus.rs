//! 总线协作者
//!
//! 物理总线（SDIO/SPI）与背板寄存器访问由平台实现；本层只按逻辑通道收发整帧。

use crate::WhdResult;
use skb::PktBuf;

/// 逻辑通道：控制（CDC 命令/响应）、事件（BDC 事件帧）、数据（BDC 数据帧）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusChannel {
    Control = 0,
    Event = 1,
    Data = 2,
}

pub trait Bus: Send + Sync {
    /// 发送一帧；`pkt` 的 headroom 供总线层写自己的帧头
    fn transmit(&self, channel: BusChannel, pkt: PktBuf) -> WhdResult<()>;

    /// 非阻塞取一帧，无数据返回 None
    fn receive(&self) -> Option<(BusChannel, PktBuf)>;

    fn read_backplane(&self, addr: u32, width: u8) -> WhdResult<u32>;

    fn write_backplane(&self, addr: u32, width: u8, value: u32) -> WhdResult<()>;

    /// 唤醒总线（保持时钟）
    fn wake(&self) -> WhdResult<()>;

    /// 延迟睡眠通知：不再有持有者，总线可进入低功耗
    fn allow_sleep(&self);
}
