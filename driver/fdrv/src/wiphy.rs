//! 无线控制平面入口 - 对应 cfg80211_ops 的 STA 子集
//!
//! 上层（网络栈或 shell）只看到 `Result<_, i32>`：错误统一折算为负 errno，
//! 内部仍以 [WhdError](bsp::WhdError) 传递。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::result::Result;

use bsp::{Platform, WhdError};
use ieee80211::MacAddr;

use crate::bss::{BssType, ScanRecord};
use crate::driver::FmacDriver;
use crate::iface::{IfaceId, Role};
use crate::join::JoinTarget;
use crate::scan::{ScanFilters, ScanType};
use crate::security::Security;

/// 单次阻塞扫描最多返回的 BSS 数
pub const SCAN_RESULT_CAP: usize = 32;

/// 扫描结果项（String SSID，便于上层使用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: MacAddr,
    pub channel: u8,
    pub rssi: i16,
    pub security: Security,
}

impl ScanResult {
    pub fn from_record(r: &ScanRecord) -> Self {
        Self {
            ssid: String::from(core::str::from_utf8(&r.ssid).unwrap_or("")),
            bssid: r.bssid,
            channel: r.channel,
            rssi: r.rssi,
            security: r.security,
        }
    }
}

/// 无线控制平面操作
pub trait WiphyOps {
    fn add_interface(&self, role: Role, ifidx: u8, bsscfgidx: u8) -> Result<IfaceId, i32>;
    fn del_interface(&self, iface_id: IfaceId) -> Result<(), i32>;
    /// 阻塞主动扫描，结果按 BSSID 去重
    fn scan(&self, iface_id: IfaceId) -> Result<Vec<ScanResult>, i32>;
    /// `bssid` 为 Some 时按指定 BSS 与信道关联，否则按 SSID
    fn connect(
        &self,
        iface_id: IfaceId,
        ssid: &[u8],
        bssid: Option<&MacAddr>,
        channel: u8,
        security: Security,
        key: &[u8],
    ) -> Result<(), i32>;
    fn disconnect(&self, iface_id: IfaceId) -> Result<(), i32>;
}

fn errno(e: WhdError) -> i32 {
    e.errno()
}

impl<P: Platform> WiphyOps for FmacDriver<P> {
    fn add_interface(&self, role: Role, ifidx: u8, bsscfgidx: u8) -> Result<IfaceId, i32> {
        let id = FmacDriver::add_interface(self, ifidx, bsscfgidx).map_err(errno)?;
        self.set_role(id, role).map_err(errno)?;
        log::info!(target: "wireless::fdrv", "wiphy: interface {} added ({:?})", id, role);
        Ok(id)
    }

    fn del_interface(&self, iface_id: IfaceId) -> Result<(), i32> {
        self.remove_interface(iface_id).map_err(errno)
    }

    fn scan(&self, iface_id: IfaceId) -> Result<Vec<ScanResult>, i32> {
        let mut records = vec![ScanRecord::default(); SCAN_RESULT_CAP];
        let n = self
            .scan_sync(iface_id, ScanType::Active, BssType::Any, &ScanFilters::default(), &mut records)
            .map_err(errno)?;
        Ok(records[..n].iter().map(ScanResult::from_record).collect())
    }

    fn connect(
        &self,
        iface_id: IfaceId,
        ssid: &[u8],
        bssid: Option<&MacAddr>,
        channel: u8,
        security: Security,
        key: &[u8],
    ) -> Result<(), i32> {
        let result = match bssid {
            Some(bssid) => {
                let target = JoinTarget {
                    ssid,
                    bssid: *bssid,
                    channel,
                };
                self.join_specific(iface_id, &target, security, key)
            }
            None => self.join(iface_id, ssid, security, key),
        };
        result.map_err(errno)
    }

    fn disconnect(&self, iface_id: IfaceId) -> Result<(), i32> {
        self.leave(iface_id).map_err(errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{events, status, EVENT_FLAG_LINK};
    use crate::testutil::{bdc_event, driver_with, escan_event, request_sync_id, BssSpec, EventSpec};
    use bsp::testing::control_reply;
    use bsp::{ioctl, BusChannel};

    #[test]
    fn interface_errors_become_errno() {
        let h = driver_with(|_| {});
        let id = WiphyOps::add_interface(&*h.drv, Role::Ap, 1, 1).unwrap();
        assert_eq!(h.drv.interface(id).unwrap().role, Role::Ap);
        assert_eq!(h.drv.del_interface(0), Err(WhdError::BadArg.errno()));
        h.drv.del_interface(id).unwrap();
        assert_eq!(h.drv.del_interface(id), Err(WhdError::InvalidInterface.errno()));
        assert_eq!(
            h.drv.connect(0, &[0u8; 33], None, 0, Security::OPEN, b""),
            Err(WhdError::BadSsid.errno())
        );
    }

    #[test]
    fn connect_then_disconnect() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(|req| {
            let hdr = req.header.unwrap();
            let mut out = vec![(BusChannel::Control, control_reply(&hdr, &req.body))];
            if hdr.cmd == ioctl::WLC_SET_SSID {
                for e in [
                    EventSpec::new(events::SET_SSID),
                    EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK),
                    EventSpec::new(events::AUTH),
                ] {
                    out.push((BusChannel::Event, bdc_event(&e)));
                }
            }
            out
        });
        assert_eq!(h.drv.connect(0, b"lab", Some(&[2, 0, 0, 0, 0, 1]), 6, Security::OPEN, b""), Ok(()));
        h.drv.disconnect(0).unwrap();
        assert_eq!(h.drv.interface(0).unwrap().role, Role::Invalid);
        assert!(h.drv.platform().sent().iter().any(|f| f.header.is_some_and(|c| c.cmd == ioctl::WLC_DISASSOC)));
    }

    #[test]
    fn scan_returns_named_results() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(|req| {
            let hdr = req.header.unwrap();
            let mut out = vec![(BusChannel::Control, control_reply(&hdr, &[]))];
            if req.iovar_name() == Some("escan") && req.iovar_payload()[4] == 1 {
                let ap = BssSpec::new([2, 0, 0, 0, 0, 9], b"corridor");
                let id = request_sync_id(req);
                out.push((BusChannel::Event, bdc_event(&escan_event(id, status::PARTIAL, Some(&ap)))));
                out.push((BusChannel::Event, bdc_event(&escan_event(id, status::SUCCESS, None))));
            }
            out
        });
        let found = h.drv.scan(0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ssid, "corridor");
        assert_eq!(found[0].channel, 6);
    }
}
