//! 驱动实例
//!
//! [FmacDriver] 汇总命令通道、事件注册表、接口表、各 BSS 配置的关联状态与扫描上下文。
//! 应用线程调用 join/scan 等接口；RX 线程经 [FmacDriver::process_rx](crate::rx) 驱动响应与事件。

use alloc::boxed::Box;
use alloc::sync::Arc;

use bsp::{ChipConfig, CmdChannel, Os, Platform, SemLock, WhdError, WhdResult};

use crate::config::DriverConfig;
use crate::event::{EventHandler, EventRegistry, Registration, SlotIndex, MAX_EVENT_SLOTS, NOT_REGISTERED};
use crate::iface::{Consumer, IfaceId, IfaceTable, Interface, Role, PRIMARY_IFACE};
use crate::join::{JoinHandler, JoinState};
use crate::scan::{ScanHandler, ScanState};

/// 数据帧回调：`(ifidx, 去掉 BDC 头后的以太网帧)`
pub type RxDataHandler = Box<dyn Fn(u8, &[u8]) + Send + Sync>;

pub struct FmacDriver<P: Platform> {
    pub(crate) cmd: CmdChannel<P>,
    pub(crate) events: EventRegistry,
    /// 串行化掩码的读取与下发，最后一次下发总是反映注册表的最新状态
    mask_lock: SemLock<P::Sem>,
    pub(crate) ifaces: Arc<IfaceTable>,
    pub(crate) join: Arc<JoinState<P::Sem>>,
    pub(crate) join_handler: Arc<dyn EventHandler>,
    pub(crate) scan: Arc<ScanState>,
    pub(crate) scan_handler: Arc<dyn EventHandler>,
    pub(crate) chip: ChipConfig,
    pub(crate) config: DriverConfig,
    pub(crate) rx_data: spin::Mutex<Option<RxDataHandler>>,
}

impl<P: Platform> FmacDriver<P> {
    /// 创建驱动实例：识别芯片（或使用配置中的 chip id），建立主接口
    pub fn new(platform: P, config: DriverConfig) -> WhdResult<Self> {
        let mask_lock = SemLock::new(platform.semaphore(1));
        let cmd = CmdChannel::new(platform, config.ioctl_timeout);
        let chip = match config.chip_id {
            Some(id) => ChipConfig::for_chip(id),
            None => cmd.detect_chip()?,
        };
        let ifaces = Arc::new(IfaceTable::new());
        ifaces.add(0, 0)?;

        let join = Arc::new(JoinState::new());
        let join_handler: Arc<dyn EventHandler> = Arc::new(JoinHandler::new(join.clone()));
        let scan = Arc::new(ScanState::new());
        let scan_handler: Arc<dyn EventHandler> = Arc::new(ScanHandler::new(scan.clone(), chip, ifaces.clone()));

        log::info!(target: "wireless::fdrv", "fmac driver up, chip {}", chip.chip_id);
        Ok(FmacDriver {
            cmd,
            events: EventRegistry::new(),
            mask_lock,
            ifaces,
            join,
            join_handler,
            scan,
            scan_handler,
            chip,
            config,
            rx_data: spin::Mutex::new(None),
        })
    }

    #[inline]
    pub fn command(&self) -> &CmdChannel<P> {
        &self.cmd
    }

    #[inline]
    pub fn platform(&self) -> &P {
        self.cmd.platform()
    }

    #[inline]
    pub fn registry(&self) -> &EventRegistry {
        &self.events
    }

    #[inline]
    pub fn chip(&self) -> &ChipConfig {
        &self.chip
    }

    #[inline]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn interface(&self, id: IfaceId) -> WhdResult<Interface> {
        self.ifaces.get(id)
    }

    /// 在下发锁内读取当前掩码并下发（调用方不得持有注册表锁）
    fn push_mask(&self) -> WhdResult<()> {
        let _push = self.mask_lock.lock();
        let (name, payload) = self.events.mask().to_iovar();
        let _awake = self.cmd.hold_awake()?;
        log::debug!(target: "wireless::fdrv", "push {} ({} bytes)", name, payload.len());
        self.cmd.set_iovar(PRIMARY_IFACE, name, &payload)
    }

    /// 注册事件订阅；订阅变化时下发新的掩码，下发失败则撤销本次注册
    pub fn register_events(
        &self,
        ifidx: u8,
        events: &[u32],
        handler: Arc<dyn EventHandler>,
        user_data: usize,
    ) -> WhdResult<SlotIndex> {
        match self.events.register(ifidx, events, handler, user_data)? {
            Registration::Existing(idx) => Ok(idx),
            Registration::New(idx, _) => match self.push_mask() {
                Ok(()) => Ok(idx),
                Err(e) => {
                    log::warn!(target: "wireless::fdrv", "event mask push failed ({}), slot {} rolled back", e, idx);
                    self.events.deregister(idx);
                    Err(e)
                }
            },
        }
    }

    /// 注销；无效或未注册的索引为空操作
    pub fn deregister_events(&self, index: SlotIndex) -> WhdResult<()> {
        match self.events.deregister(index) {
            Some(_) => self.push_mask(),
            None => Ok(()),
        }
    }

    pub fn add_interface(&self, ifidx: u8, bsscfgidx: u8) -> WhdResult<IfaceId> {
        self.ifaces.add(ifidx, bsscfgidx)
    }

    /// 移除接口并注销它占用的全部槽位；主接口不可移除
    pub fn remove_interface(&self, id: IfaceId) -> WhdResult<()> {
        if id == PRIMARY_IFACE {
            return Err(WhdError::BadArg);
        }
        let iface = self.ifaces.remove(id)?;
        self.scan.forget_interface(id);
        self.join.reset(iface.bsscfgidx);
        let mut result = Ok(());
        for slot in iface.event_slots.iter().copied().filter(|&s| s != NOT_REGISTERED) {
            if let Err(e) = self.deregister_events(slot) {
                result = Err(e);
            }
        }
        result
    }

    pub fn set_role(&self, id: IfaceId, role: Role) -> WhdResult<()> {
        self.ifaces.set_role(id, role)
    }

    /// 为接口上的某个消费者登记槽位；原槽位若不同则注销
    pub(crate) fn bind_slot(&self, id: IfaceId, consumer: Consumer, slot: SlotIndex) -> WhdResult<()> {
        let old = self.ifaces.set_slot(id, consumer, slot)?;
        if old != slot {
            self.deregister_events(old)?;
        }
        Ok(())
    }

    /// 注销接口上某个消费者的槽位
    pub(crate) fn unbind_slot(&self, id: IfaceId, consumer: Consumer) -> WhdResult<()> {
        let old = self.ifaces.set_slot(id, consumer, NOT_REGISTERED)?;
        self.deregister_events(old)
    }

    /// 复位：丢弃扫描上下文、注销全部订阅、清空关联状态与接口表
    pub fn shutdown(&self) {
        self.scan.clear();
        self.join.clear();
        for i in 0..MAX_EVENT_SLOTS as SlotIndex {
            self.events.deregister(i);
        }
        if let Err(e) = self.push_mask() {
            log::warn!(target: "wireless::fdrv", "clear event mask on shutdown: {}", e);
        }
        self.ifaces.clear();
        *self.rx_data.lock() = None;
        log::info!(target: "wireless::fdrv", "fmac driver shut down");
    }
}
