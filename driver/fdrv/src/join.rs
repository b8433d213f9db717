//! 关联（join）状态机
//!
//! 事件经纯函数 [reduce] 累积到 [JoinStatus] 位图，[join_result] 把位图映射为结果；
//! [JoinHandler] 在 RX 线程上应用二者并唤醒等待方，[FmacDriver::join] 负责下发配置与等待。

use alloc::sync::Arc;
use core::time::Duration;

use bitflags::bitflags;
use bsp::ioctl::{self, iovar};
use bsp::{CmdKind, Os, Platform, Semaphore, Tolerate, WhdError, WhdResult};
use ieee80211::{MacAddr, MAX_SSID_LEN};

use crate::driver::FmacDriver;
use crate::event::{events, status, sup_reason, sup_status, EventHandler, EventHeader, HandlerAction};
use crate::iface::{Consumer, IfaceId, Role, MAX_BSSCFG};
use crate::security::{wep_keys, Security, MAX_PSK_LEN, MAX_SAE_PASSWORD_LEN, WEP104_KEY_LEN};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct JoinStatus: u32 {
        const AUTHENTICATED = 1 << 0;
        const LINK_READY = 1 << 1;
        const SECURITY_COMPLETE = 1 << 2;
        const SSID_SET = 1 << 3;
        const NO_NETWORKS = 1 << 4;
        const EAPOL_M1_TIMEOUT = 1 << 5;
        const EAPOL_M3_TIMEOUT = 1 << 6;
        const EAPOL_G1_TIMEOUT = 1 << 7;
        const EAPOL_FAILURE = 1 << 8;

        const EAPOL_TIMEOUTS = Self::EAPOL_M1_TIMEOUT.bits()
            | Self::EAPOL_M3_TIMEOUT.bits()
            | Self::EAPOL_G1_TIMEOUT.bits();
        /// 握手失败：本次尝试已无法成功
        const HANDSHAKE_FAILED = Self::EAPOL_TIMEOUTS.bits() | Self::EAPOL_FAILURE.bits();
    }
}

/// 关联所需订阅的事件
pub const JOIN_EVENTS: [u32; 7] = [
    events::SET_SSID,
    events::LINK,
    events::AUTH,
    events::DEAUTH_IND,
    events::DISASSOC_IND,
    events::PSK_SUP,
    events::CSA_COMPLETE_IND,
];

/// 固件内置请求者握手超时
pub const SUP_WPA_TIMEOUT_MS: u32 = 2500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinStep {
    pub status: JoinStatus,
    /// 固件已放弃本次尝试
    pub attempt_complete: bool,
}

/// 将一个事件应用到状态位图
pub fn reduce(mut st: JoinStatus, ev: &EventHeader) -> JoinStep {
    let mut complete = false;
    match ev.event_type {
        events::LINK => st.set(JoinStatus::LINK_READY, ev.link_up()),
        events::AUTH => match ev.status {
            status::SUCCESS => st.insert(JoinStatus::AUTHENTICATED),
            status::UNSOLICITED => {}
            _ => complete = true,
        },
        events::SET_SSID => match ev.status {
            status::SUCCESS => st.insert(JoinStatus::SSID_SET),
            // 固件继续重试
            status::NO_NETWORKS => st.insert(JoinStatus::NO_NETWORKS),
            _ => complete = true,
        },
        events::PSK_SUP if st.contains(JoinStatus::LINK_READY) => {
            let timeout = ev.reason == sup_reason::WPA_PSK_TMO;
            match ev.status {
                sup_status::KEYED => st.insert(JoinStatus::SECURITY_COMPLETE),
                sup_status::KEYXCHANGE_WAIT_M1 if timeout => {
                    st.insert(JoinStatus::EAPOL_M1_TIMEOUT);
                    complete = true;
                }
                sup_status::KEYXCHANGE_WAIT_M3 if timeout => {
                    st.insert(JoinStatus::EAPOL_M3_TIMEOUT);
                    complete = true;
                }
                sup_status::KEYXCHANGE_WAIT_G1 if timeout => {
                    st.insert(JoinStatus::EAPOL_G1_TIMEOUT);
                    complete = true;
                }
                _ => {
                    st.insert(JoinStatus::EAPOL_FAILURE);
                    complete = true;
                }
            }
        }
        events::DEAUTH_IND | events::DISASSOC_IND => {
            st.remove(JoinStatus::AUTHENTICATED | JoinStatus::LINK_READY);
        }
        _ => {}
    }
    JoinStep {
        status: st,
        attempt_complete: complete,
    }
}

/// 状态位图 → 结果
pub fn join_result(st: JoinStatus) -> WhdResult<()> {
    use JoinStatus as S;
    if st.contains(S::EAPOL_M1_TIMEOUT) {
        return Err(WhdError::EapolM1Timeout);
    }
    if st.contains(S::EAPOL_M3_TIMEOUT) {
        return Err(WhdError::EapolM3Timeout);
    }
    if st.contains(S::EAPOL_G1_TIMEOUT) {
        return Err(WhdError::EapolG1Timeout);
    }
    if st.contains(S::EAPOL_FAILURE) {
        return Err(WhdError::EapolKeyFailure);
    }
    let ready = S::AUTHENTICATED | S::LINK_READY;
    if st == S::empty() || st == S::SECURITY_COMPLETE {
        Err(WhdError::NotAuthenticated)
    } else if st == ready || st == ready | S::SSID_SET {
        Err(WhdError::NotKeyed)
    } else if st == ready | S::SECURITY_COMPLETE {
        Err(WhdError::JoinInProgress)
    } else if st == ready | S::SSID_SET | S::SECURITY_COMPLETE {
        Ok(())
    } else if st == S::NO_NETWORKS {
        Err(WhdError::NetworkNotFound)
    } else {
        Err(WhdError::InvalidJoinStatus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTracker {
    pub status: JoinStatus,
    pub complete: bool,
}

impl Default for JoinTracker {
    fn default() -> Self {
        JoinTracker {
            status: JoinStatus::empty(),
            complete: false,
        }
    }
}

impl JoinTracker {
    /// 等待方据此结束等待
    fn settled(&self) -> bool {
        self.complete || self.status.intersects(JoinStatus::HANDSHAKE_FAILED) || join_result(self.status).is_ok()
    }
}

/// 各 BSS 配置的关联状态与当前等待中的信号量
pub struct JoinState<S: Semaphore> {
    trackers: spin::Mutex<[JoinTracker; MAX_BSSCFG]>,
    active: spin::Mutex<Option<Arc<S>>>,
}

impl<S: Semaphore> JoinState<S> {
    pub fn new() -> Self {
        JoinState {
            trackers: spin::Mutex::new([JoinTracker::default(); MAX_BSSCFG]),
            active: spin::Mutex::new(None),
        }
    }

    pub fn tracker(&self, bsscfgidx: u8) -> JoinTracker {
        self.trackers
            .lock()
            .get(bsscfgidx as usize)
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn reset(&self, bsscfgidx: u8) {
        if let Some(t) = self.trackers.lock().get_mut(bsscfgidx as usize) {
            *t = JoinTracker::default();
        }
    }

    fn mark(&self, bsscfgidx: u8, bits: JoinStatus) {
        if let Some(t) = self.trackers.lock().get_mut(bsscfgidx as usize) {
            t.status.insert(bits);
        }
    }

    pub(crate) fn clear(&self) {
        *self.trackers.lock() = [JoinTracker::default(); MAX_BSSCFG];
        *self.active.lock() = None;
    }

    fn activate(&self, sem: Arc<S>) {
        *self.active.lock() = Some(sem);
    }

    fn deactivate(&self) {
        *self.active.lock() = None;
    }

    /// 应用一个事件；返回更新后的状态
    fn apply(&self, ev: &EventHeader) -> Option<JoinTracker> {
        let tracker = {
            let mut trackers = self.trackers.lock();
            let t = trackers.get_mut(ev.bsscfgidx as usize)?;
            let step = reduce(t.status, ev);
            t.status = step.status;
            t.complete |= step.attempt_complete;
            *t
        };
        if tracker.settled() {
            if let Some(sem) = self.active.lock().as_ref() {
                sem.give();
            }
        }
        Some(tracker)
    }
}

impl<S: Semaphore> Default for JoinState<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// 关联事件处理者（驱动持有唯一实例，重复 prepare 复用同一槽位）
pub struct JoinHandler<S: Semaphore> {
    state: Arc<JoinState<S>>,
}

impl<S: Semaphore> JoinHandler<S> {
    pub fn new(state: Arc<JoinState<S>>) -> Self {
        JoinHandler { state }
    }
}

impl<S: Semaphore> EventHandler for JoinHandler<S> {
    fn handle_event(&self, ev: &EventHeader, _data: &[u8], _user_data: usize) -> HandlerAction {
        match self.state.apply(ev) {
            Some(t) => log::debug!(
                target: "wireless::fdrv",
                "join event {} on bss {}: status {:?} complete {}",
                ev.event_type,
                ev.bsscfgidx,
                t.status,
                t.complete
            ),
            None => log::warn!(target: "wireless::fdrv", "join event for unknown bss {}", ev.bsscfgidx),
        }
        HandlerAction::Keep
    }
}

/// 指定 BSS 的关联目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinTarget<'a> {
    pub ssid: &'a [u8],
    pub bssid: MacAddr,
    pub channel: u8,
}

const WSEC_PASSPHRASE: u16 = 1;
const WSEC_PMK_LEN: usize = 4 + MAX_PSK_LEN;
const SAE_PASSWORD_LEN: usize = 2 + MAX_SAE_PASSWORD_LEN;
const WSEC_KEY_LEN: usize = 112;
const WSEC_PRIMARY_KEY: u32 = 2;
const CRYPTO_ALGO_WEP1: u32 = 1;
const CRYPTO_ALGO_WEP128: u32 = 3;
const MFP_CAPABLE: u32 = 1;
const MFP_REQUIRED: u32 = 2;
const WLC_SSID_LEN: usize = 4 + MAX_SSID_LEN;
const JOIN_PARAMS_LEN: usize = 52;

fn wlc_ssid(ssid: &[u8]) -> [u8; WLC_SSID_LEN] {
    let mut out = [0u8; WLC_SSID_LEN];
    out[..4].copy_from_slice(&(ssid.len() as u32).to_le_bytes());
    out[4..4 + ssid.len()].copy_from_slice(ssid);
    out
}

fn wsec_pmk(key: &[u8]) -> [u8; WSEC_PMK_LEN] {
    let flags = if key.len() == MAX_PSK_LEN { 0 } else { WSEC_PASSPHRASE };
    let mut out = [0u8; WSEC_PMK_LEN];
    out[..2].copy_from_slice(&(key.len() as u16).to_le_bytes());
    out[2..4].copy_from_slice(&flags.to_le_bytes());
    out[4..4 + key.len()].copy_from_slice(key);
    out
}

fn sae_password(key: &[u8]) -> WhdResult<[u8; SAE_PASSWORD_LEN]> {
    if key.len() > SAE_PASSWORD_LEN - 2 {
        return Err(WhdError::BadArg);
    }
    let mut out = [0u8; SAE_PASSWORD_LEN];
    out[..2].copy_from_slice(&(key.len() as u16).to_le_bytes());
    out[2..2 + key.len()].copy_from_slice(key);
    Ok(out)
}

fn wsec_key(index: u8, data: &[u8]) -> [u8; WSEC_KEY_LEN] {
    let mut out = [0u8; WSEC_KEY_LEN];
    out[0..4].copy_from_slice(&(index as u32).to_le_bytes());
    out[4..8].copy_from_slice(&(data.len() as u32).to_le_bytes());
    out[8..8 + data.len()].copy_from_slice(data);
    let algo = if data.len() == WEP104_KEY_LEN {
        CRYPTO_ALGO_WEP128
    } else {
        CRYPTO_ALGO_WEP1
    };
    out[60..64].copy_from_slice(&algo.to_le_bytes());
    if index == 0 {
        out[64..68].copy_from_slice(&WSEC_PRIMARY_KEY.to_le_bytes());
    }
    out
}

fn join_params(ssid: &[u8], bssid: &MacAddr, chanspec: u16) -> [u8; JOIN_PARAMS_LEN] {
    let mut out = [0u8; JOIN_PARAMS_LEN];
    out[..WLC_SSID_LEN].copy_from_slice(&wlc_ssid(ssid));
    out[36..42].copy_from_slice(bssid);
    out[44..48].copy_from_slice(&1i32.to_le_bytes());
    out[48..50].copy_from_slice(&chanspec.to_le_bytes());
    out
}

fn check_ssid(ssid: &[u8]) -> WhdResult<()> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(WhdError::BadSsid);
    }
    Ok(())
}

impl<P: Platform> FmacDriver<P> {
    /// 校验密钥、下发安全配置并订阅关联事件
    pub fn prepare_join(&self, iface: IfaceId, security: Security, key: &[u8]) -> WhdResult<()> {
        security.validate_key(key)?;
        let ifc = self.ifaces.get(iface)?;
        let (ifidx, bss) = (ifc.ifidx, ifc.bsscfgidx);
        let cmd = &self.cmd;
        self.join.reset(bss);

        cmd.set_ioctl_u32(ifidx, ioctl::WLC_SET_WSEC, security.wsec())?;
        cmd.set_bsscfg_iovar_u32(ifidx, iovar::SUP_WPA, bss as u32, security.supplicant_enabled() as u32)
            .tolerate_unsupported()?;
        cmd.set_bsscfg_iovar_u32(ifidx, iovar::SUP_WPA2_EAPVER, bss as u32, u32::MAX)
            .tolerate_unsupported()?;
        cmd.set_bsscfg_iovar_u32(ifidx, iovar::SUP_WPA_TMO, bss as u32, SUP_WPA_TIMEOUT_MS)
            .tolerate_unsupported()?;

        if security.uses_psk() {
            cmd.send_command(ifidx, ioctl::WLC_SET_WSEC_PMK, CmdKind::Set, &wsec_pmk(key))?;
        }
        if security.uses_sae() {
            cmd.set_iovar(ifidx, iovar::SAE_PASSWORD, &sae_password(key)?)?;
        }
        if security.is_wep() {
            for k in wep_keys(key)? {
                cmd.send_command(ifidx, ioctl::WLC_SET_KEY, CmdKind::Set, &wsec_key(k.index, k.data))?;
            }
        }

        cmd.set_ioctl_u32(ifidx, ioctl::WLC_SET_INFRA, 1)?;
        cmd.set_ioctl_u32(ifidx, ioctl::WLC_SET_AUTH, security.auth_mode())?;
        if security.uses_sae() {
            let mfp = if security.is_sae_only() { MFP_REQUIRED } else { MFP_CAPABLE };
            if cmd.set_iovar_u32(ifidx, iovar::MFP, mfp).tolerate_unsupported()?.is_none() {
                log::warn!(target: "wireless::fdrv", "firmware has no mfp support");
            }
        }
        cmd.set_ioctl_u32(ifidx, ioctl::WLC_SET_WPA_AUTH, security.wpa_auth())?;

        if !security.needs_handshake() {
            self.join.mark(bss, JoinStatus::SECURITY_COMPLETE);
        }

        let slot = self.register_events(ifidx, &JOIN_EVENTS, self.join_handler.clone(), 0)?;
        self.bind_slot(iface, Consumer::Join, slot)
    }

    /// 关联到 `ssid`，阻塞直至成功、失败或超时
    pub fn join(&self, iface: IfaceId, ssid: &[u8], security: Security, key: &[u8]) -> WhdResult<()> {
        check_ssid(ssid)?;
        let payload = wlc_ssid(ssid);
        self.run_join(iface, security, key, &payload, ssid)
    }

    /// 以 SSID + BSSID + 信道关联
    pub fn join_specific(&self, iface: IfaceId, target: &JoinTarget<'_>, security: Security, key: &[u8]) -> WhdResult<()> {
        check_ssid(target.ssid)?;
        let params = join_params(target.ssid, &target.bssid, self.chip.chanspec(target.channel));
        self.run_join(iface, security, key, &params, target.ssid)
    }

    fn run_join(&self, iface: IfaceId, security: Security, key: &[u8], set_ssid: &[u8], ssid: &[u8]) -> WhdResult<()> {
        security.validate_key(key)?;
        let ifc = self.ifaces.get(iface)?;
        log::info!(
            target: "wireless::fdrv",
            "join {:?} on if {} security {:#x}",
            core::str::from_utf8(ssid).unwrap_or("<non-utf8>"),
            iface,
            security.bits()
        );
        self.ifaces.set_role(iface, Role::Sta)?;

        let sem = Arc::new(self.platform().semaphore(0));
        self.join.activate(sem.clone());
        let result = self
            .prepare_join(iface, security, key)
            .and_then(|()| self.cmd.send_command(ifc.ifidx, ioctl::WLC_SET_SSID, CmdKind::Set, set_ssid).map(drop))
            .and_then(|()| self.wait_for_join(ifc.ifidx, ifc.bsscfgidx, &*sem));
        self.join.deactivate();

        match result {
            Ok(()) => log::info!(target: "wireless::fdrv", "join on if {} complete", iface),
            Err(e) => {
                log::warn!(target: "wireless::fdrv", "join on if {} failed: {}", iface, e);
                // 失败后仅复位角色，订阅保留到 leave
                if let Err(e) = self.ifaces.set_role(iface, Role::Invalid) {
                    log::warn!(target: "wireless::fdrv", "reset role on if {}: {}", iface, e);
                }
            }
        }
        result
    }

    fn wait_for_join(&self, ifidx: u8, bss: u8, sem: &P::Sem) -> WhdResult<()> {
        let plat = self.platform();
        let slice = self.config.join_slice();
        let deadline = plat.now() + self.config.join_timeout;
        loop {
            let t = self.join.tracker(bss);
            if t.settled() {
                return join_result(t.status);
            }
            let remaining = deadline.saturating_sub(plat.now());
            if remaining == Duration::ZERO {
                break;
            }
            sem.take(Some(slice.min(remaining)));
        }
        log::warn!(
            target: "wireless::fdrv",
            "join timed out, status {:?}",
            self.join.tracker(bss).status
        );
        if let Err(e) = self.cmd.send_command(ifidx, ioctl::WLC_DISASSOC, CmdKind::Set, &[]) {
            log::warn!(target: "wireless::fdrv", "disassoc after join timeout: {}", e);
        }
        Err(WhdError::Timeout)
    }

    /// 断开并注销关联事件
    pub fn leave(&self, iface: IfaceId) -> WhdResult<()> {
        let ifc = self.ifaces.get(iface)?;
        let result = self.cmd.send_command(ifc.ifidx, ioctl::WLC_DISASSOC, CmdKind::Set, &[]).map(drop);
        self.unbind_slot(iface, Consumer::Join)?;
        self.join.reset(ifc.bsscfgidx);
        self.ifaces.set_role(iface, Role::Invalid)?;
        log::info!(target: "wireless::fdrv", "left network on if {}", iface);
        result
    }

    /// 当前位图
    pub fn join_status(&self, iface: IfaceId) -> WhdResult<JoinStatus> {
        let ifc = self.ifaces.get(iface)?;
        Ok(self.join.tracker(ifc.bsscfgidx).status)
    }

    /// 关联完成且可收发
    pub fn is_ready_to_transceive(&self, iface: IfaceId) -> WhdResult<()> {
        join_result(self.join_status(iface)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EVENT_FLAG_LINK;
    use crate::testutil::{bdc_event, driver_with, ev, EventSpec};
    use bsp::testing::control_reply;
    use bsp::BusChannel;
    use proptest::prelude::*;
    use std::time::Instant;

    fn all_flags() -> impl Strategy<Value = JoinStatus> {
        (0u32..(1 << 9)).prop_map(JoinStatus::from_bits_truncate)
    }

    #[test]
    fn result_table() {
        use JoinStatus as S;
        let ready = S::AUTHENTICATED | S::LINK_READY;
        assert_eq!(join_result(S::empty()), Err(WhdError::NotAuthenticated));
        assert_eq!(join_result(S::SECURITY_COMPLETE), Err(WhdError::NotAuthenticated));
        assert_eq!(join_result(ready), Err(WhdError::NotKeyed));
        assert_eq!(join_result(ready | S::SSID_SET), Err(WhdError::NotKeyed));
        assert_eq!(join_result(ready | S::SECURITY_COMPLETE), Err(WhdError::JoinInProgress));
        assert_eq!(join_result(ready | S::SSID_SET | S::SECURITY_COMPLETE), Ok(()));
        assert_eq!(join_result(S::NO_NETWORKS), Err(WhdError::NetworkNotFound));
        assert_eq!(join_result(S::SSID_SET), Err(WhdError::InvalidJoinStatus));
        assert_eq!(join_result(S::NO_NETWORKS | S::AUTHENTICATED), Err(WhdError::InvalidJoinStatus));
        assert_eq!(join_result(ready | S::EAPOL_FAILURE), Err(WhdError::EapolKeyFailure));
    }

    #[test]
    fn reducer_paths() {
        let up = ev(EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK));
        let st = reduce(JoinStatus::empty(), &up).status;
        assert_eq!(st, JoinStatus::LINK_READY);

        let keyed = ev(EventSpec::new(events::PSK_SUP).status(6));
        assert_eq!(reduce(JoinStatus::empty(), &keyed).status, JoinStatus::empty());
        assert_eq!(reduce(st, &keyed).status, JoinStatus::LINK_READY | JoinStatus::SECURITY_COMPLETE);

        let m1 = reduce(st, &ev(EventSpec::new(events::PSK_SUP).status(4).reason(15)));
        assert!(m1.attempt_complete && m1.status.contains(JoinStatus::EAPOL_M1_TIMEOUT));
        let other = reduce(st, &ev(EventSpec::new(events::PSK_SUP).status(4).reason(14)));
        assert!(other.attempt_complete && other.status.contains(JoinStatus::EAPOL_FAILURE));

        let unsolicited = reduce(st, &ev(EventSpec::new(events::AUTH).status(status::UNSOLICITED)));
        assert_eq!(unsolicited, JoinStep { status: st, attempt_complete: false });
        assert!(reduce(st, &ev(EventSpec::new(events::AUTH).status(status::FAIL))).attempt_complete);

        let nonet = reduce(JoinStatus::empty(), &ev(EventSpec::new(events::SET_SSID).status(status::NO_NETWORKS)));
        assert_eq!(nonet, JoinStep { status: JoinStatus::NO_NETWORKS, attempt_complete: false });
        assert!(reduce(st, &ev(EventSpec::new(events::SET_SSID).status(status::FAIL))).attempt_complete);

        let full = JoinStatus::all() & !JoinStatus::HANDSHAKE_FAILED;
        let deauth = reduce(full, &ev(EventSpec::new(events::DEAUTH_IND)));
        assert!(!deauth.status.intersects(JoinStatus::AUTHENTICATED | JoinStatus::LINK_READY));
        assert_eq!(reduce(full, &ev(EventSpec::new(events::CSA_COMPLETE_IND))).status, full);
    }

    proptest! {
        #[test]
        fn eapol_timeouts_dominate(st in all_flags()) {
            let r = join_result(st);
            if st.contains(JoinStatus::EAPOL_M1_TIMEOUT) {
                prop_assert_eq!(r, Err(WhdError::EapolM1Timeout));
            } else if st.contains(JoinStatus::EAPOL_M3_TIMEOUT) {
                prop_assert_eq!(r, Err(WhdError::EapolM3Timeout));
            } else if st.contains(JoinStatus::EAPOL_G1_TIMEOUT) {
                prop_assert_eq!(r, Err(WhdError::EapolG1Timeout));
            }
            if r.is_ok() {
                prop_assert_eq!(
                    st,
                    JoinStatus::AUTHENTICATED | JoinStatus::LINK_READY | JoinStatus::SSID_SET | JoinStatus::SECURITY_COMPLETE
                );
            }
        }

        #[test]
        fn psk_sup_ignored_without_link(
            st in all_flags(),
            sup in 0u32..16,
            reason in 0u32..32,
        ) {
            let st = st - JoinStatus::LINK_READY;
            let step = reduce(st, &ev(EventSpec::new(events::PSK_SUP).status(sup).reason(reason)));
            prop_assert_eq!(step, JoinStep { status: st, attempt_complete: false });
        }

        #[test]
        fn link_event_only_touches_link_bit(st in all_flags(), up in any::<bool>()) {
            let flags = if up { EVENT_FLAG_LINK } else { 0 };
            let step = reduce(st, &ev(EventSpec::new(events::LINK).flags(flags)));
            prop_assert_eq!(step.status - JoinStatus::LINK_READY, st - JoinStatus::LINK_READY);
            prop_assert_eq!(step.status.contains(JoinStatus::LINK_READY), up);
            prop_assert!(!step.attempt_complete);
        }
    }

    #[test]
    fn key_material_layouts() {
        let pmk = wsec_pmk(b"password");
        assert_eq!(&pmk[..4], &[8, 0, 1, 0]);
        assert_eq!(&pmk[4..12], b"password");
        assert_eq!(&wsec_pmk(&[b'a'; 64])[..4], &[64, 0, 0, 0]);

        let k = wsec_key(0, &[1; 13]);
        assert_eq!(&k[4..8], &[13, 0, 0, 0]);
        assert_eq!(&k[60..64], &[3, 0, 0, 0]);
        assert_eq!(&k[64..68], &[2, 0, 0, 0]);
        assert_eq!(&wsec_key(2, &[1; 5])[64..68], &[0, 0, 0, 0]);

        let p = join_params(b"ap", &[1, 2, 3, 4, 5, 6], 0x1006);
        assert_eq!(&p[..6], &[2, 0, 0, 0, b'a', b'p']);
        assert_eq!(&p[36..42], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&p[44..50], &[1, 0, 0, 0, 0x06, 0x10]);
    }

    /// 对 SET_SSID 的响应之后依次送出 `events`
    fn on_set_ssid(events: Vec<EventSpec>) -> impl FnMut(&bsp::testing::SentFrame) -> Vec<(BusChannel, Vec<u8>)> + Send {
        move |req| {
            let hdr = req.header.unwrap();
            let mut out = vec![(BusChannel::Control, control_reply(&hdr, &req.body))];
            if hdr.cmd == ioctl::WLC_SET_SSID {
                out.extend(events.iter().map(|e| (BusChannel::Event, bdc_event(e))));
            }
            out
        }
    }

    #[test]
    fn open_join_succeeds() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(vec![
            EventSpec::new(events::SET_SSID),
            EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK),
            EventSpec::new(events::AUTH),
        ]));
        assert_eq!(h.drv.join(0, b"open-ap", Security::OPEN, b""), Ok(()));
        assert_eq!(h.drv.interface(0).unwrap().role, Role::Sta);
        assert_eq!(h.drv.is_ready_to_transceive(0), Ok(()));

        let sent = h.drv.platform().sent();
        let cmds: Vec<u32> = sent.iter().filter(|f| !f.is_iovar()).map(|f| f.header.unwrap().cmd).collect();
        assert_eq!(
            cmds,
            [
                ioctl::WLC_SET_WSEC,
                ioctl::WLC_SET_INFRA,
                ioctl::WLC_SET_AUTH,
                ioctl::WLC_SET_WPA_AUTH,
                ioctl::WLC_SET_SSID
            ]
        );
        let ssid = sent.iter().find(|f| f.header.unwrap().cmd == ioctl::WLC_SET_SSID).unwrap();
        assert_eq!(&ssid.body[..11], b"\x07\0\0\0open-ap");
        assert!(h.sent_iovars("event_msgs").len() == 1);
    }

    fn psk_sequence(sup_status: u32, sup_reason: u32) -> Vec<EventSpec> {
        vec![
            EventSpec::new(events::AUTH),
            EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK),
            EventSpec::new(events::SET_SSID),
            EventSpec::new(events::PSK_SUP).status(sup_status).reason(sup_reason),
        ]
    }

    #[test]
    fn psk_join_keyed() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(psk_sequence(6, 0)));
        assert_eq!(h.drv.join(0, b"home", Security::WPA2_AES_PSK, b"secret-passphrase"), Ok(()));
        let pmk = h
            .drv
            .platform()
            .sent()
            .into_iter()
            .find(|f| f.header.unwrap().cmd == ioctl::WLC_SET_WSEC_PMK)
            .unwrap();
        assert_eq!(&pmk.body[..4], &[17, 0, 1, 0]);
        let sup = h.sent_iovars("bsscfg:sup_wpa");
        assert_eq!(sup[0].u32_payload(), Some(1));
    }

    #[test]
    fn psk_join_m3_timeout() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(psk_sequence(8, 15)));
        let start = Instant::now();
        assert_eq!(
            h.drv.join(0, b"home", Security::WPA2_AES_PSK, b"secret-passphrase"),
            Err(WhdError::EapolM3Timeout)
        );
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(h.drv.interface(0).unwrap().role, Role::Invalid);
        let slot = h.drv.interface(0).unwrap().slot(Consumer::Join);
        assert!(h.drv.registry().is_active(slot));

        h.drv.platform().set_responder(on_set_ssid(vec![]));
        h.drv.leave(0).unwrap();
        assert!(!h.drv.registry().is_active(slot));
        assert_eq!(h.drv.join_status(0), Ok(JoinStatus::empty()));
    }

    #[test]
    fn join_times_out_and_disassociates() {
        let h = driver_with(|cfg| {
            cfg.join_timeout = Duration::from_millis(200);
            cfg.join_wait_slices = 4;
        });
        h.drv.platform().set_responder(on_set_ssid(vec![EventSpec::new(events::AUTH)]));
        let start = Instant::now();
        assert_eq!(h.drv.join(0, b"slow", Security::OPEN, b""), Err(WhdError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(200));
        let last = h.drv.platform().sent().last().unwrap().header.unwrap();
        assert_eq!(last.cmd, ioctl::WLC_DISASSOC);
    }

    #[test]
    fn join_rejects_bad_arguments_before_io() {
        let h = driver_with(|_| {});
        assert_eq!(h.drv.join(0, b"", Security::OPEN, b""), Err(WhdError::BadSsid));
        assert_eq!(h.drv.join(0, &[b'x'; 33], Security::OPEN, b""), Err(WhdError::BadSsid));
        assert_eq!(h.drv.join(0, b"ap", Security::WPA2_AES_PSK, b"short"), Err(WhdError::InvalidKey));
        assert_eq!(h.drv.join(0, b"ap", Security::IBSS, b""), Err(WhdError::BadArg));
        assert_eq!(h.drv.join(2, b"ap", Security::OPEN, b""), Err(WhdError::InvalidInterface));
        assert!(h.drv.platform().sent().is_empty());
    }

    #[test]
    fn wep_keys_pushed_per_entry() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(vec![
            EventSpec::new(events::SET_SSID),
            EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK),
            EventSpec::new(events::AUTH),
        ]));
        let key = [0, 5, 1, 2, 3, 4, 5, 1, 5, 6, 7, 8, 9, 10];
        assert_eq!(h.drv.join(0, b"old", Security::WEP_SHARED, &key), Ok(()));
        let sent = h.drv.platform().sent();
        let keys: Vec<_> = sent.iter().filter(|f| f.header.unwrap().cmd == ioctl::WLC_SET_KEY).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(&keys[1].body[..4], &[1, 0, 0, 0]);
        let auth = sent.iter().find(|f| f.header.unwrap().cmd == ioctl::WLC_SET_AUTH).unwrap();
        assert_eq!(auth.body, 1u32.to_le_bytes());
    }

    #[test]
    fn sae_pushes_password_and_mfp() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(psk_sequence(6, 0)));
        assert_eq!(h.drv.join(0, b"wpa3", Security::WPA3_SAE, b"pw"), Ok(()));
        let sae = h.sent_iovars("sae_password");
        assert_eq!(&sae[0].iovar_payload()[..4], &[2, 0, b'p', b'w']);
        assert_eq!(h.sent_iovars("mfp")[0].u32_payload(), Some(2));
        assert!(h.drv.platform().sent().iter().all(|f| f.header.unwrap().cmd != ioctl::WLC_SET_WSEC_PMK));
    }

    #[test]
    fn enterprise_wpa3_skips_sae() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(vec![
            EventSpec::new(events::SET_SSID),
            EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK),
            EventSpec::new(events::AUTH),
        ]));
        let security = Security::WPA3 | Security::ENTERPRISE | Security::AES;
        assert_eq!(h.drv.join(0, b"corp", security, &[b'x'; 200]), Ok(()));
        assert!(h.sent_iovars("sae_password").is_empty());
        assert!(h.sent_iovars("mfp").is_empty());
    }

    #[test]
    fn sae_password_is_bounded() {
        assert!(sae_password(&[b'x'; MAX_SAE_PASSWORD_LEN]).is_ok());
        assert_eq!(sae_password(&[b'x'; MAX_SAE_PASSWORD_LEN + 1]), Err(WhdError::BadArg));
    }

    #[test]
    fn join_specific_sends_chanspec() {
        let h = driver_with(|_| {});
        h.drv.platform().set_responder(on_set_ssid(vec![
            EventSpec::new(events::SET_SSID),
            EventSpec::new(events::LINK).flags(EVENT_FLAG_LINK),
            EventSpec::new(events::AUTH),
        ]));
        let target = JoinTarget {
            ssid: b"ap",
            bssid: [2, 0, 0, 0, 0, 1],
            channel: 6,
        };
        assert_eq!(h.drv.join_specific(0, &target, Security::OPEN, b""), Ok(()));
        let sent = h.drv.platform().sent();
        let req = sent.iter().find(|f| f.header.unwrap().cmd == ioctl::WLC_SET_SSID).unwrap();
        assert_eq!(req.body.len(), JOIN_PARAMS_LEN);
        let chanspec = u16::from_le_bytes([req.body[48], req.body[49]]);
        assert_eq!(chanspec, h.drv.chip().chanspec(6));
    }
}
