//! wireless crate
//!
//! FullMAC Wi-Fi 主机侧控制面：BSP + FDRV
//! - BSP: 错误分类、平台协作者、CDC/BDC 编解码、命令通道、总线保活
//! - FDRV: 事件注册与分发、join / escan 状态机、RX 分类、控制平面 (WiphyOps)
//!
//! 平台提供 [bsp::Platform]（总线、信号量与时钟、缓冲分配），经 [wireless_driver_init]
//! 得到 [WirelessDriver]；RX 线程运行 [WirelessDriver::rx_task] 返回的闭包。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

pub use bsp;
pub use fdrv;
pub use ieee80211;
pub use skb;

use bsp::{Platform, WhdResult};
use fdrv::{DriverConfig, FmacDriver};

/// 无线驱动上下文：驱动实例 + RX 线程停止标志
/// 平台初始化时创建，可交给 api/syscall 或上层使用
pub struct WirelessDriver<P: Platform> {
    core: Arc<FmacDriver<P>>,
    rx_stop: Arc<AtomicBool>,
}

impl<P: Platform> WirelessDriver<P> {
    pub fn new(platform: P, config: DriverConfig) -> WhdResult<Self> {
        Ok(Self {
            core: Arc::new(FmacDriver::new(platform, config)?),
            rx_stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn driver(&self) -> &FmacDriver<P> {
        &self.core
    }

    /// 控制平面入口
    pub fn wiphy(&self) -> &dyn fdrv::WiphyOps {
        &*self.core
    }

    /// RX 线程主体：在平台线程中运行，[Self::stop] 后返回
    pub fn rx_task(&self) -> impl FnOnce() + Send + 'static {
        let core = self.core.clone();
        let stop = self.rx_stop.clone();
        move || core.run_rx(&stop)
    }

    /// 停止 RX 线程并复位驱动状态
    pub fn stop(&self) {
        if self.rx_stop.load(Ordering::Acquire) {
            return;
        }
        // 清除订阅需要 RX 线程送回响应
        self.core.shutdown();
        self.rx_stop.store(true, Ordering::Release);
        log::info!(target: "wireless", "wireless: driver stopped");
    }
}

/// 由平台与文本配置创建驱动上下文
///
/// `cfg_text` 为 `TAG=value` 行（见 [fdrv::parse_configfile]），为空时全部使用默认值；
/// 未指定 `CHIP_ID` 时经背板识别芯片。
pub fn wireless_driver_init<P: Platform>(platform: P, cfg_text: &[u8]) -> WhdResult<WirelessDriver<P>> {
    let mut cfg = DriverConfig::default();
    fdrv::parse_configfile(cfg_text, &mut cfg);
    let drv = WirelessDriver::new(platform, cfg)?;
    log::info!(target: "wireless", "wireless: driver ready, chip {:#x}", drv.driver().chip().chip_id);
    Ok(drv)
}
