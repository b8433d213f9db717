//! 异步事件：帧解析、订阅注册表与分发
//!
//! 事件帧（BDC 之后）：以太网头 14 字节（ethertype 0x886c）+ 厂商头 10 字节 + 事件消息 48 字节（大端）+ 载荷。
//! 固件在不同事件族间复用 status/reason 数值，解析时按事件类型平移到各自的区间（见 [remap_status_reason]）。
//!
//! 注册表为定长槽位数组，以小整数索引；一帧会投递给所有匹配的槽（按槽序）。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use bsp::{WhdError, WhdResult};
use thiserror::Error;

/// 事件号
pub mod events {
    pub const SET_SSID: u32 = 0;
    pub const JOIN: u32 = 1;
    pub const AUTH: u32 = 3;
    pub const DEAUTH: u32 = 5;
    pub const DEAUTH_IND: u32 = 6;
    pub const ASSOC: u32 = 7;
    pub const DISASSOC: u32 = 11;
    pub const DISASSOC_IND: u32 = 12;
    pub const LINK: u32 = 16;
    pub const PRUNE: u32 = 23;
    pub const PSK_SUP: u32 = 46;
    pub const ESCAN_RESULT: u32 = 69;
    pub const CSA_COMPLETE_IND: u32 = 80;
}

/// 通用事件状态
pub mod status {
    pub const SUCCESS: u32 = 0;
    pub const FAIL: u32 = 1;
    pub const TIMEOUT: u32 = 2;
    pub const NO_NETWORKS: u32 = 3;
    pub const ABORT: u32 = 4;
    pub const NO_ACK: u32 = 5;
    pub const UNSOLICITED: u32 = 6;
    pub const ATTEMPT: u32 = 7;
    pub const PARTIAL: u32 = 8;
    pub const NEWSCAN: u32 = 9;
    pub const NEWASSOC: u32 = 10;
}

/// PSK_SUP 平移后的 status
pub mod sup_status {
    pub const OFFSET: u32 = 256;
    pub const KEYXCHANGE_WAIT_M1: u32 = OFFSET + 4;
    pub const KEYED: u32 = OFFSET + 6;
    pub const KEYXCHANGE_WAIT_M3: u32 = OFFSET + 8;
    pub const KEYXCHANGE_WAIT_G1: u32 = OFFSET + 10;
}

/// PSK_SUP 平移后的 reason
pub mod sup_reason {
    pub const OFFSET: u32 = 256;
    pub const DEAUTH: u32 = OFFSET + 14;
    pub const WPA_PSK_TMO: u32 = OFFSET + 15;
}

pub const PRUNE_REASON_OFFSET: u32 = 512;
pub const DOT11_STATUS_OFFSET: u32 = 512;
pub const DOT11_REASON_OFFSET: u32 = 512;

/// 事件 flags：链路建立
pub const EVENT_FLAG_LINK: u16 = 0x01;

pub const ETH_P_BRCM: u16 = 0x886c;
pub const BRCM_OUI: [u8; 3] = [0x00, 0x10, 0x18];
pub const BCMILCP_SUBTYPE_VENDOR_LONG: u16 = 0x8001;
pub const BCMILCP_BCM_SUBTYPE_EVENT: u16 = 1;

pub const ETH_HEADER_LEN: usize = 14;
pub const BCM_HEADER_LEN: usize = 10;
pub const EVENT_MSG_LEN: usize = 48;
pub const EVENT_FRAME_HEADER_LEN: usize = ETH_HEADER_LEN + BCM_HEADER_LEN + EVENT_MSG_LEN;

/// 事件消息头（已转为主机字节序并完成 status/reason 平移）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventHeader {
    pub version: u16,
    pub flags: u16,
    pub event_type: u32,
    pub status: u32,
    pub reason: u32,
    pub auth_type: u32,
    pub datalen: u32,
    pub addr: [u8; 6],
    pub ifidx: u8,
    pub bsscfgidx: u8,
}

impl EventHeader {
    #[inline]
    pub fn link_up(&self) -> bool {
        self.flags & EVENT_FLAG_LINK != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("event frame shorter than its header")]
    Truncated,
    #[error("not a vendor event frame")]
    Signature,
    #[error("event payload length exceeds frame")]
    DataLength,
}

/// 按事件族平移 status/reason
pub fn remap_status_reason(hdr: &mut EventHeader) {
    match hdr.event_type {
        events::PSK_SUP => {
            hdr.status = hdr.status.wrapping_add(sup_status::OFFSET);
            hdr.reason = hdr.reason.wrapping_add(sup_reason::OFFSET);
        }
        events::PRUNE => hdr.reason = hdr.reason.wrapping_add(PRUNE_REASON_OFFSET),
        events::DEAUTH | events::DEAUTH_IND | events::DISASSOC | events::DISASSOC_IND => {
            hdr.status = hdr.status.wrapping_add(DOT11_STATUS_OFFSET);
            hdr.reason = hdr.reason.wrapping_add(DOT11_REASON_OFFSET);
        }
        _ => {}
    }
}

/// 解析事件帧，返回事件头与载荷
pub fn parse_event_frame(frame: &[u8]) -> Result<(EventHeader, &[u8]), FrameError> {
    if frame.len() < EVENT_FRAME_HEADER_LEN {
        return Err(FrameError::Truncated);
    }
    let be16 = |o: usize| u16::from_be_bytes([frame[o], frame[o + 1]]);
    let be32 = |o: usize| u32::from_be_bytes([frame[o], frame[o + 1], frame[o + 2], frame[o + 3]]);

    let bcm = ETH_HEADER_LEN;
    if be16(12) != ETH_P_BRCM
        || be16(bcm) != BCMILCP_SUBTYPE_VENDOR_LONG
        || frame[bcm + 5..bcm + 8] != BRCM_OUI
        || be16(bcm + 8) != BCMILCP_BCM_SUBTYPE_EVENT
    {
        return Err(FrameError::Signature);
    }

    let m = ETH_HEADER_LEN + BCM_HEADER_LEN;
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&frame[m + 24..m + 30]);
    let mut hdr = EventHeader {
        version: be16(m),
        flags: be16(m + 2),
        event_type: be32(m + 4),
        status: be32(m + 8),
        reason: be32(m + 12),
        auth_type: be32(m + 16),
        datalen: be32(m + 20),
        addr,
        ifidx: frame[m + 46],
        bsscfgidx: frame[m + 47],
    };
    let avail = frame.len() - EVENT_FRAME_HEADER_LEN;
    if hdr.datalen as usize > avail {
        return Err(FrameError::DataLength);
    }
    remap_status_reason(&mut hdr);
    let data = &frame[EVENT_FRAME_HEADER_LEN..EVENT_FRAME_HEADER_LEN + hdr.datalen as usize];
    Ok((hdr, data))
}

/// 订阅掩码长度（传统格式）
pub const LEGACY_MASK_LEN: usize = 16;
/// 可订阅的最大事件号
pub const MAX_EVENT_NUMBER: u32 = 255;
const EVENTMSGS_EXT_VER: u8 = 1;
const EVENTMSGS_SET_MASK: u8 = 2;

/// 订阅掩码：事件号均 ≤127 时用 16 字节传统格式，否则用按最大事件号定长的扩展格式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMask {
    Legacy([u8; LEGACY_MASK_LEN]),
    Extended(Vec<u8>),
}

impl EventMask {
    pub fn from_events(events: impl IntoIterator<Item = u32>) -> Self {
        let mut bits = [0u8; (MAX_EVENT_NUMBER as usize + 1) / 8];
        let mut max = 0;
        for e in events.into_iter().filter(|&e| e <= MAX_EVENT_NUMBER) {
            bits[(e / 8) as usize] |= 1 << (e % 8);
            max = max.max(e);
        }
        if max > 127 {
            EventMask::Extended(bits[..(max / 8 + 1) as usize].to_vec())
        } else {
            let mut legacy = [0u8; LEGACY_MASK_LEN];
            legacy.copy_from_slice(&bits[..LEGACY_MASK_LEN]);
            EventMask::Legacy(legacy)
        }
    }

    pub fn bits(&self) -> &[u8] {
        match self {
            EventMask::Legacy(m) => m,
            EventMask::Extended(m) => m,
        }
    }

    pub fn contains(&self, event: u32) -> bool {
        self.bits()
            .get((event / 8) as usize)
            .is_some_and(|b| b & (1 << (event % 8)) != 0)
    }

    /// 下发所用的 IOVAR 名称与载荷
    pub fn to_iovar(&self) -> (&'static str, Vec<u8>) {
        match self {
            EventMask::Legacy(m) => (bsp::ioctl::iovar::EVENT_MSGS, m.to_vec()),
            EventMask::Extended(m) => {
                let mut payload = Vec::with_capacity(4 + m.len());
                payload.extend_from_slice(&[EVENTMSGS_EXT_VER, EVENTMSGS_SET_MASK, m.len() as u8, 0]);
                payload.extend_from_slice(m);
                (bsp::ioctl::iovar::EVENT_MSGS_EXT, payload)
            }
        }
    }
}

pub type SlotIndex = u8;
/// "未注册" 索引，注销它是空操作
pub const NOT_REGISTERED: SlotIndex = 0xFF;
pub const MAX_EVENT_SLOTS: usize = 5;
pub const MAX_EVENTS_PER_SLOT: usize = 33;

/// 处理函数的返回：保留订阅，或在本次分发中释放自己的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    Keep,
    Release,
}

/// 事件处理者
///
/// 在 RX 线程上、持有注册表锁时被调用，不得再调用注册表或命令通道。
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &EventHeader, data: &[u8], user_data: usize) -> HandlerAction;
}

struct Slot {
    ifidx: u8,
    events: heapless::Vec<u32, MAX_EVENTS_PER_SLOT>,
    handler: Arc<dyn EventHandler>,
    user_data: usize,
}

impl Slot {
    fn same_as(&self, ifidx: u8, events: &[u32], handler: &Arc<dyn EventHandler>, user_data: usize) -> bool {
        self.ifidx == ifidx
            && self.user_data == user_data
            && self.events.as_slice() == events
            && Arc::ptr_eq(&self.handler, handler)
    }
}

/// 注册结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// 完全相同的订阅已存在
    Existing(SlotIndex),
    /// 新分配的槽位及新的订阅掩码
    New(SlotIndex, EventMask),
}

impl Registration {
    pub fn index(&self) -> SlotIndex {
        match self {
            Registration::Existing(i) | Registration::New(i, _) => *i,
        }
    }
}

/// 一次分发的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub event: Option<EventHeader>,
    pub delivered: usize,
    pub released: usize,
}

pub struct EventRegistry {
    slots: spin::Mutex<[Option<Slot>; MAX_EVENT_SLOTS]>,
    dropped: AtomicU32,
}

impl EventRegistry {
    pub fn new() -> Self {
        EventRegistry {
            slots: spin::Mutex::new(core::array::from_fn(|_| None)),
            dropped: AtomicU32::new(0),
        }
    }

    /// 注册订阅；完全相同的订阅返回已有索引
    pub fn register(
        &self,
        ifidx: u8,
        events: &[u32],
        handler: Arc<dyn EventHandler>,
        user_data: usize,
    ) -> WhdResult<Registration> {
        if events.is_empty() || events.iter().any(|&e| e > MAX_EVENT_NUMBER) {
            return Err(WhdError::BadArg);
        }
        let list = heapless::Vec::from_slice(events).map_err(|_| WhdError::TooManyEvents)?;

        let mut slots = self.slots.lock();
        if let Some(i) = slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.same_as(ifidx, events, &handler, user_data)))
        {
            return Ok(Registration::Existing(i as SlotIndex));
        }
        let Some(i) = slots.iter().position(Option::is_none) else {
            log::warn!(target: "wireless::fdrv", "event registry full");
            return Err(WhdError::OutOfSpace);
        };
        slots[i] = Some(Slot {
            ifidx,
            events: list,
            handler,
            user_data,
        });
        let mask = Self::mask_of(&slots);
        log::debug!(target: "wireless::fdrv", "event slot {} registered for if {} ({} events)", i, ifidx, events.len());
        Ok(Registration::New(i as SlotIndex, mask))
    }

    /// 注销；槽位原本有效时返回新的订阅掩码
    pub fn deregister(&self, index: SlotIndex) -> Option<EventMask> {
        if index == NOT_REGISTERED {
            return None;
        }
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(index as usize)?;
        slot.take()?;
        log::debug!(target: "wireless::fdrv", "event slot {} released", index);
        Some(Self::mask_of(&slots))
    }

    fn mask_of(slots: &[Option<Slot>; MAX_EVENT_SLOTS]) -> EventMask {
        EventMask::from_events(slots.iter().flatten().flat_map(|s| s.events.iter().copied()))
    }

    /// 当前所有有效槽位的订阅并集
    pub fn mask(&self) -> EventMask {
        Self::mask_of(&self.slots.lock())
    }

    pub fn is_active(&self, index: SlotIndex) -> bool {
        self.slots
            .lock()
            .get(index as usize)
            .is_some_and(|s| s.is_some())
    }

    pub fn active_slots(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// 被丢弃的畸形事件帧数
    pub fn dropped_frames(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 解析并投递一帧事件到所有匹配的槽位
    pub fn dispatch(&self, frame: &[u8]) -> DispatchOutcome {
        let (hdr, data) = match parse_event_frame(frame) {
            Ok(v) => v,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!(target: "wireless::fdrv", "drop event frame ({} bytes): {}", frame.len(), e);
                return DispatchOutcome::default();
            }
        };
        log::debug!(
            target: "wireless::fdrv",
            "event {} status {} reason {} flags {:#x} if {} bss {} len {}",
            hdr.event_type,
            hdr.status,
            hdr.reason,
            hdr.flags,
            hdr.ifidx,
            hdr.bsscfgidx,
            hdr.datalen
        );

        let mut out = DispatchOutcome {
            event: Some(hdr),
            ..DispatchOutcome::default()
        };
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            let action = match slot {
                Some(s) if s.ifidx == hdr.ifidx && s.events.contains(&hdr.event_type) => {
                    s.handler.handle_event(&hdr, data, s.user_data)
                }
                _ => continue,
            };
            out.delivered += 1;
            if action == HandlerAction::Release {
                *slot = None;
                out.released += 1;
            }
        }
        out
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
