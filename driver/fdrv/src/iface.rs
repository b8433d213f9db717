//! 接口表
//!
//! 每个接口记录角色、固件接口号、BSS 配置索引，以及各事件消费者（扫描、关联、AP、P2P）占用的注册槽位。

use crate::event::{SlotIndex, NOT_REGISTERED};
use bsp::{WhdError, WhdResult};

pub const MAX_INTERFACES: usize = 3;
/// BSS 配置索引上限（关联状态按此分组）
pub const MAX_BSSCFG: usize = 4;

/// 接口句柄：接口表下标
pub type IfaceId = u8;

/// 主接口
pub const PRIMARY_IFACE: IfaceId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Invalid,
    Sta,
    Ap,
    P2p,
}

/// 事件消费者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Consumer {
    Scan = 0,
    Join = 1,
    Ap = 2,
    P2p = 3,
}

pub const CONSUMER_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub role: Role,
    pub ifidx: u8,
    pub bsscfgidx: u8,
    pub event_slots: [SlotIndex; CONSUMER_COUNT],
}

impl Interface {
    pub fn new(ifidx: u8, bsscfgidx: u8) -> Self {
        Interface {
            role: Role::Invalid,
            ifidx,
            bsscfgidx,
            event_slots: [NOT_REGISTERED; CONSUMER_COUNT],
        }
    }

    pub fn slot(&self, consumer: Consumer) -> SlotIndex {
        self.event_slots[consumer as usize]
    }
}

/// 接口表；所有方法短暂持锁并返回副本，调用方不会在持有本锁时获取其它锁
pub struct IfaceTable {
    entries: spin::Mutex<[Option<Interface>; MAX_INTERFACES]>,
}

impl IfaceTable {
    pub fn new() -> Self {
        IfaceTable {
            entries: spin::Mutex::new([None; MAX_INTERFACES]),
        }
    }

    pub fn add(&self, ifidx: u8, bsscfgidx: u8) -> WhdResult<IfaceId> {
        if bsscfgidx as usize >= MAX_BSSCFG {
            return Err(WhdError::BadArg);
        }
        let mut entries = self.entries.lock();
        if entries.iter().flatten().any(|i| i.ifidx == ifidx || i.bsscfgidx == bsscfgidx) {
            return Err(WhdError::Busy);
        }
        let id = entries.iter().position(Option::is_none).ok_or(WhdError::OutOfSpace)?;
        entries[id] = Some(Interface::new(ifidx, bsscfgidx));
        log::info!(target: "wireless::fdrv", "interface {} added (ifidx {}, bsscfg {})", id, ifidx, bsscfgidx);
        Ok(id as IfaceId)
    }

    pub fn get(&self, id: IfaceId) -> WhdResult<Interface> {
        self.entries
            .lock()
            .get(id as usize)
            .copied()
            .flatten()
            .ok_or(WhdError::InvalidInterface)
    }

    /// 移除接口，返回其最后状态（调用方据此注销槽位）
    pub fn remove(&self, id: IfaceId) -> WhdResult<Interface> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id as usize).ok_or(WhdError::InvalidInterface)?;
        let iface = entry.take().ok_or(WhdError::InvalidInterface)?;
        log::info!(target: "wireless::fdrv", "interface {} removed", id);
        Ok(iface)
    }

    fn update<R>(&self, id: IfaceId, f: impl FnOnce(&mut Interface) -> R) -> WhdResult<R> {
        let mut entries = self.entries.lock();
        match entries.get_mut(id as usize) {
            Some(Some(iface)) => Ok(f(iface)),
            _ => Err(WhdError::InvalidInterface),
        }
    }

    pub fn set_role(&self, id: IfaceId, role: Role) -> WhdResult<()> {
        self.update(id, |i| i.role = role)
    }

    /// 记录消费者槽位，返回原值
    pub fn set_slot(&self, id: IfaceId, consumer: Consumer, slot: SlotIndex) -> WhdResult<SlotIndex> {
        self.update(id, |i| core::mem::replace(&mut i.event_slots[consumer as usize], slot))
    }

    /// 槽位仍为 `slot` 时清空，返回是否清空
    pub fn clear_slot_if(&self, id: IfaceId, consumer: Consumer, slot: SlotIndex) -> bool {
        self.update(id, |i| {
            let cur = &mut i.event_slots[consumer as usize];
            if *cur == slot && slot != NOT_REGISTERED {
                *cur = NOT_REGISTERED;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }

    pub fn clear(&self) {
        *self.entries.lock() = [None; MAX_INTERFACES];
    }
}

impl Default for IfaceTable {
    fn default() -> Self {
        Self::new()
    }
}
