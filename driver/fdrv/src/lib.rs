//! FullMAC 驱动控制面 (FDRV)
//!
//! 运行在 [bsp] 的命令通道之上：
//! - **event**：固件事件帧解析、订阅注册表与分发
//! - **iface**：接口表（ifidx / bsscfg / 角色 / 各消费者的事件槽位）
//! - **security / join**：安全类型、关联状态归约与 join 流程
//! - **bss / scan**：escan 结果解析、异步与同步扫描
//! - **rx**：按逻辑通道分类收包，RX 线程主体
//! - **config**：驱动配置与文本配置解析
//! - **wiphy**：面向上层的 errno 接口

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod bss;
mod config;
mod driver;
mod event;
mod iface;
mod join;
mod rx;
mod scan;
mod security;
mod wiphy;

#[cfg(test)]
mod testutil;

pub use bss::{classify_security, parse_escan_result, BssType, ResultFlags, ScanRecord};
pub use config::{parse_configfile, DriverConfig};
pub use driver::{FmacDriver, RxDataHandler};
pub use event::{
    events, parse_event_frame, status, sup_reason, sup_status, DispatchOutcome, EventHandler, EventHeader, EventMask,
    EventRegistry, FrameError, HandlerAction, Registration, SlotIndex, EVENT_FLAG_LINK, MAX_EVENTS_PER_SLOT,
    MAX_EVENT_SLOTS, NOT_REGISTERED,
};
pub use iface::{Consumer, IfaceId, Interface, Role, MAX_INTERFACES, PRIMARY_IFACE};
pub use join::{join_result, reduce, JoinStatus, JoinStep, JoinTarget, JoinTracker};
pub use scan::{escan_params, ScanCallback, ScanControl, ScanFilters, ScanStatus, ScanType};
pub use security::{wep_keys, Security, WepKey};
pub use wiphy::{ScanResult, WiphyOps, SCAN_RESULT_CAP};
