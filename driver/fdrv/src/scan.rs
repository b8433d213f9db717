//! escan 扫描
//!
//! 一次扫描 = 一个 `escan` 启动请求 + 若干 ESCAN_RESULT 事件：PARTIAL 事件各带一条 BSS 信息，
//! 最后一个非 PARTIAL 事件结束扫描。处理者在 RX 线程上逐条回调调用方，结束时释放自己的槽位。
//!
//! 同一时刻只允许一个扫描。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU16, Ordering};

use bsp::ioctl::iovar;
use bsp::{ChipConfig, Os, Platform, Semaphore, WhdError, WhdResult};
use ieee80211::{MacAddr, MAX_SSID_LEN};

use crate::bss::{escan_sync_id, parse_escan_result, BssType, ResultFlags, ScanRecord};
use crate::driver::FmacDriver;
use crate::event::{events, status, EventHandler, EventHeader, HandlerAction, SlotIndex, NOT_REGISTERED};
use crate::iface::{Consumer, IfaceId, IfaceTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Active = 0,
    Passive = 1,
    Pno = 2,
    Prohibited = 4,
    NoBssidFilter = 8,
}

impl TryFrom<u32> for ScanType {
    type Error = WhdError;

    fn try_from(v: u32) -> WhdResult<Self> {
        match v {
            0 => Ok(ScanType::Active),
            1 => Ok(ScanType::Passive),
            2 => Ok(ScanType::Pno),
            4 => Ok(ScanType::Prohibited),
            8 => Ok(ScanType::NoBssidFilter),
            _ => Err(WhdError::BadArg),
        }
    }
}

/// 扫描过滤条件；未指定的项使用固件默认值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilters {
    pub ssid: Option<heapless::Vec<u8, MAX_SSID_LEN>>,
    pub bssid: Option<MacAddr>,
    /// 信道号，空表示全部
    pub channels: Vec<u8>,
    pub nprobes: Option<i32>,
    /// ms
    pub active_time: Option<i32>,
    pub passive_time: Option<i32>,
    pub home_time: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Incomplete,
    CompletedSuccessfully,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Abandon,
}

/// 结果回调：`Some(record)` + `Incomplete` 为一条结果，`None` + 终态为扫描结束（恰好一次）
///
/// 在 RX 线程上、持有注册表锁时调用，不得再发起扫描或其它命令。
pub type ScanCallback = Box<dyn FnMut(Option<&ScanRecord>, ScanStatus) -> ScanControl + Send>;

const ESCAN_VERSION: u32 = 1;
const ESCAN_ACTION_START: u16 = 1;
const ESCAN_ACTION_ABORT: u16 = 3;
const ESCAN_PARAMS_FIXED_LEN: usize = 72;
const FW_DEFAULT: i32 = -1;
const BROADCAST: MacAddr = [0xff; 6];

/// 编码 escan 请求
pub fn escan_params(
    action: u16,
    sync_id: u16,
    scan_type: ScanType,
    bss_type: BssType,
    filters: &ScanFilters,
    chip: &ChipConfig,
) -> Vec<u8> {
    let mut out = vec![0u8; ESCAN_PARAMS_FIXED_LEN + 2 * filters.channels.len()];
    out[0..4].copy_from_slice(&ESCAN_VERSION.to_le_bytes());
    out[4..6].copy_from_slice(&action.to_le_bytes());
    out[6..8].copy_from_slice(&sync_id.to_le_bytes());
    if let Some(ssid) = &filters.ssid {
        out[8..12].copy_from_slice(&(ssid.len() as u32).to_le_bytes());
        out[12..12 + ssid.len()].copy_from_slice(ssid);
    }
    out[44..50].copy_from_slice(&filters.bssid.unwrap_or(BROADCAST));
    out[50] = match bss_type {
        BssType::Unknown => BssType::Any as u8,
        t => t as u8,
    };
    out[51] = scan_type as u8;
    let times = [filters.nprobes, filters.active_time, filters.passive_time, filters.home_time];
    for (i, t) in times.iter().enumerate() {
        let o = 52 + 4 * i;
        out[o..o + 4].copy_from_slice(&t.unwrap_or(FW_DEFAULT).to_le_bytes());
    }
    out[68..72].copy_from_slice(&((filters.channels.len() as u32) & 0xFFFF).to_le_bytes());
    for (i, &ch) in filters.channels.iter().enumerate() {
        let o = ESCAN_PARAMS_FIXED_LEN + 2 * i;
        out[o..o + 2].copy_from_slice(&chip.chanspec(ch).to_le_bytes());
    }
    out
}

pub(crate) struct ScanContext {
    callback: ScanCallback,
    iface: IfaceId,
    slot: SlotIndex,
    sync_id: u16,
}

/// 当前扫描上下文
pub struct ScanState {
    ctx: spin::Mutex<Option<ScanContext>>,
    next_sync_id: AtomicU16,
}

impl ScanState {
    pub fn new() -> Self {
        ScanState {
            ctx: spin::Mutex::new(None),
            next_sync_id: AtomicU16::new(1),
        }
    }

    pub fn is_active(&self) -> bool {
        self.ctx.lock().is_some()
    }

    fn active_sync_id(&self) -> Option<u16> {
        self.ctx.lock().as_ref().map(|c| c.sync_id)
    }

    fn begin(&self, iface: IfaceId, callback: ScanCallback) -> WhdResult<u16> {
        let mut ctx = self.ctx.lock();
        if ctx.is_some() {
            return Err(WhdError::Busy);
        }
        let sync_id = self.next_sync_id.fetch_add(1, Ordering::Relaxed);
        *ctx = Some(ScanContext {
            callback,
            iface,
            slot: NOT_REGISTERED,
            sync_id,
        });
        Ok(sync_id)
    }

    fn set_slot(&self, sync_id: u16, slot: SlotIndex) {
        if let Some(c) = self.ctx.lock().as_mut().filter(|c| c.sync_id == sync_id) {
            c.slot = slot;
        }
    }

    /// 取走 `sync_id` 对应的上下文（不回调）
    fn take(&self, sync_id: u16) -> Option<ScanContext> {
        let mut ctx = self.ctx.lock();
        if ctx.as_ref().is_some_and(|c| c.sync_id == sync_id) {
            ctx.take()
        } else {
            None
        }
    }

    fn abort_where(&self, pred: impl FnOnce(&ScanContext) -> bool) {
        let mut ctx = self.ctx.lock();
        if ctx.as_ref().is_some_and(pred) {
            if let Some(mut c) = ctx.take() {
                (c.callback)(None, ScanStatus::Aborted);
            }
        }
    }

    /// 接口移除时结束其上的扫描
    pub(crate) fn forget_interface(&self, iface: IfaceId) {
        self.abort_where(|c| c.iface == iface);
    }

    pub(crate) fn clear(&self) {
        self.abort_where(|_| true);
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScanHandler {
    state: Arc<ScanState>,
    chip: ChipConfig,
    ifaces: Arc<IfaceTable>,
}

impl ScanHandler {
    pub fn new(state: Arc<ScanState>, chip: ChipConfig, ifaces: Arc<IfaceTable>) -> Self {
        ScanHandler { state, chip, ifaces }
    }

    fn finish(&self, ctx: &mut Option<ScanContext>, result: ScanStatus) -> HandlerAction {
        if let Some(mut c) = ctx.take() {
            (c.callback)(None, result);
            self.ifaces.clear_slot_if(c.iface, Consumer::Scan, c.slot);
            log::info!(target: "wireless::fdrv::scan", "scan {} finished: {:?}", c.sync_id, result);
        }
        HandlerAction::Release
    }
}

impl EventHandler for ScanHandler {
    fn handle_event(&self, ev: &EventHeader, data: &[u8], _user_data: usize) -> HandlerAction {
        if ev.event_type != events::ESCAN_RESULT {
            return HandlerAction::Keep;
        }
        let mut ctx = self.state.ctx.lock();
        let Some(c) = ctx.as_mut() else {
            log::warn!(target: "wireless::fdrv::scan", "escan result without an active scan");
            return HandlerAction::Release;
        };
        if let Some(id) = escan_sync_id(data).filter(|&id| id != c.sync_id) {
            log::debug!(target: "wireless::fdrv::scan", "escan result for scan {} ignored (active {})", id, c.sync_id);
            return HandlerAction::Keep;
        }
        match ev.status {
            status::PARTIAL => match parse_escan_result(data, &self.chip) {
                Ok(rec) if rec.flags.contains(ResultFlags::RSSI_OFF_CHANNEL) => {
                    log::debug!(target: "wireless::fdrv::scan", "off-channel result dropped");
                    HandlerAction::Keep
                }
                Ok(rec) => {
                    if (c.callback)(Some(&rec), ScanStatus::Incomplete) == ScanControl::Abandon {
                        log::debug!(target: "wireless::fdrv::scan", "scan {} abandoned by caller", c.sync_id);
                        return self.finish(&mut ctx, ScanStatus::Aborted);
                    }
                    HandlerAction::Keep
                }
                Err(e) => {
                    log::warn!(target: "wireless::fdrv::scan", "bad escan result ({} bytes): {}", data.len(), e);
                    HandlerAction::Keep
                }
            },
            status::SUCCESS => self.finish(&mut ctx, ScanStatus::CompletedSuccessfully),
            status::ABORT | status::NEWSCAN | status::NEWASSOC => self.finish(&mut ctx, ScanStatus::Aborted),
            other => {
                log::warn!(target: "wireless::fdrv::scan", "unexpected escan status {}, treated as aborted", other);
                self.finish(&mut ctx, ScanStatus::Aborted)
            }
        }
    }
}

/// 同步扫描的累积结果
struct SyncResults {
    records: Vec<ScanRecord>,
    bssids: Vec<MacAddr>,
    capacity: usize,
    outcome: Option<ScanStatus>,
}

impl SyncResults {
    fn add(&mut self, rec: &ScanRecord) {
        if !self.bssids.contains(&rec.bssid) {
            self.bssids.push(rec.bssid);
        }
        let full = self.records.len() >= self.capacity;
        match self.records.iter_mut().find(|r| r.bssid == rec.bssid) {
            Some(r) if rec.rssi > r.rssi => *r = rec.clone(),
            Some(_) => {}
            None if !full => self.records.push(rec.clone()),
            None => {}
        }
    }
}

impl<P: Platform> FmacDriver<P> {
    /// 发起异步扫描
    pub fn scan_start(
        &self,
        iface: IfaceId,
        scan_type: ScanType,
        bss_type: BssType,
        filters: &ScanFilters,
        callback: ScanCallback,
    ) -> WhdResult<()> {
        self.start_scan(iface, scan_type, bss_type, filters, callback).map(drop)
    }

    fn start_scan(
        &self,
        iface: IfaceId,
        scan_type: ScanType,
        bss_type: BssType,
        filters: &ScanFilters,
        callback: ScanCallback,
    ) -> WhdResult<u16> {
        let ifc = self.ifaces.get(iface)?;
        let sync_id = self.scan.begin(iface, callback)?;
        let slot = match self.register_events(ifc.ifidx, &[events::ESCAN_RESULT], self.scan_handler.clone(), 0) {
            Ok(slot) => slot,
            Err(e) => {
                self.scan.take(sync_id);
                return Err(e);
            }
        };
        self.scan.set_slot(sync_id, slot);
        if let Err(e) = self.bind_slot(iface, Consumer::Scan, slot) {
            log::warn!(target: "wireless::fdrv::scan", "bind scan slot: {}", e);
            self.teardown_scan(iface, sync_id);
            return Err(e);
        }

        let params = escan_params(ESCAN_ACTION_START, sync_id, scan_type, bss_type, filters, &self.chip);
        if let Err(e) = self.cmd.set_iovar(ifc.ifidx, iovar::ESCAN, &params) {
            log::warn!(target: "wireless::fdrv::scan", "escan start failed: {}", e);
            self.teardown_scan(iface, sync_id);
            return Err(e);
        }
        log::info!(
            target: "wireless::fdrv::scan",
            "scan {} started on if {} ({:?}, {} channel(s))",
            sync_id,
            iface,
            scan_type,
            filters.channels.len()
        );
        Ok(sync_id)
    }

    /// 本地结束扫描：丢弃上下文并注销槽位（不回调）
    fn teardown_scan(&self, iface: IfaceId, sync_id: u16) {
        let Some(ctx) = self.scan.take(sync_id) else {
            return;
        };
        self.ifaces.clear_slot_if(iface, Consumer::Scan, ctx.slot);
        if let Err(e) = self.deregister_events(ctx.slot) {
            log::warn!(target: "wireless::fdrv::scan", "deregister scan slot: {}", e);
        }
    }

    /// 请求固件中止当前扫描；结束回调随 ABORT 事件到达
    pub fn scan_abort(&self, iface: IfaceId) -> WhdResult<()> {
        let ifc = self.ifaces.get(iface)?;
        let params = escan_params(
            ESCAN_ACTION_ABORT,
            self.scan.active_sync_id().unwrap_or(0),
            ScanType::Active,
            BssType::Any,
            &ScanFilters::default(),
            &self.chip,
        );
        self.cmd.set_iovar(ifc.ifidx, iovar::ESCAN, &params)
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    /// 阻塞扫描
    ///
    /// `results` 为空时返回去重后的 BSS 数；否则按 BSSID 去重写入至多 `results.len()` 条
    /// （重复项保留信号最强者），返回写入条数。
    pub fn scan_sync(
        &self,
        iface: IfaceId,
        scan_type: ScanType,
        bss_type: BssType,
        filters: &ScanFilters,
        results: &mut [ScanRecord],
    ) -> WhdResult<usize> {
        let acc = Arc::new(spin::Mutex::new(SyncResults {
            records: Vec::new(),
            bssids: Vec::new(),
            capacity: results.len(),
            outcome: None,
        }));
        let done = Arc::new(self.platform().semaphore(0));
        let callback: ScanCallback = {
            let acc = acc.clone();
            let done = done.clone();
            Box::new(move |rec, status| {
                let mut a = acc.lock();
                if let Some(rec) = rec {
                    a.add(rec);
                }
                if status != ScanStatus::Incomplete {
                    a.outcome = Some(status);
                    drop(a);
                    done.give();
                }
                ScanControl::Continue
            })
        };

        let sync_id = self.start_scan(iface, scan_type, bss_type, filters, callback)?;
        if !done.take(Some(self.config.scan_sync_timeout)) && acc.lock().outcome.is_none() {
            log::warn!(target: "wireless::fdrv::scan", "scan {} timed out, aborting", sync_id);
            if let Err(e) = self.scan_abort(iface) {
                log::warn!(target: "wireless::fdrv::scan", "escan abort: {}", e);
            }
            self.teardown_scan(iface, sync_id);
            // 结束回调与本地拆除在扫描上下文锁下互斥，此后 outcome 不再变化
            if acc.lock().outcome.is_none() {
                return Err(WhdError::Timeout);
            }
            log::debug!(target: "wireless::fdrv::scan", "scan {} completed while timing out", sync_id);
        }

        let a = acc.lock();
        if a.outcome == Some(ScanStatus::Aborted) {
            return Err(WhdError::ScanAborted);
        }
        if results.is_empty() {
            return Ok(a.bssids.len());
        }
        for (slot, rec) in results.iter_mut().zip(a.records.iter()) {
            *slot = rec.clone();
        }
        Ok(a.records.len())
    }
}
