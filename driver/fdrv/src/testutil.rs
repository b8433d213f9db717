//! 测试辅助：事件帧/escan 载荷构造与带 RX 泵的驱动

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bsp::testing::{MockPlatform, SentFrame};
use bsp::BdcHeader;
use ieee80211::{capability, MacAddr};

use crate::bss::{BSS_INFO_FIXED_LEN, ESCAN_RESULT_HEADER_LEN};
use crate::config::DriverConfig;
use crate::driver::FmacDriver;
use crate::event::{
    events, parse_event_frame, EventHeader, BCMILCP_BCM_SUBTYPE_EVENT, BCMILCP_SUBTYPE_VENDOR_LONG, BRCM_OUI,
    ETH_P_BRCM, EVENT_FRAME_HEADER_LEN,
};

/// 事件帧描述；status/reason 为线上原值（未平移）
#[derive(Debug, Clone, Default)]
pub struct EventSpec {
    pub event: u32,
    pub flags: u16,
    pub status: u32,
    pub reason: u32,
    pub ifidx: u8,
    pub bsscfgidx: u8,
    pub data: Vec<u8>,
}

impl EventSpec {
    pub fn new(event: u32) -> Self {
        EventSpec {
            event,
            ..Default::default()
        }
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    pub fn reason(mut self, reason: u32) -> Self {
        self.reason = reason;
        self
    }

    pub fn ifidx(mut self, ifidx: u8, bsscfgidx: u8) -> Self {
        self.ifidx = ifidx;
        self.bsscfgidx = bsscfgidx;
        self
    }

    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }
}

/// 以太网头 + BCM 头 + 事件消息（大端）+ 载荷
pub fn event_frame(spec: &EventSpec) -> Vec<u8> {
    let mut f = vec![0u8; EVENT_FRAME_HEADER_LEN];
    f[6..12].copy_from_slice(&[2, 0, 0, 0, 0, 0xee]);
    f[12..14].copy_from_slice(&ETH_P_BRCM.to_be_bytes());
    f[14..16].copy_from_slice(&BCMILCP_SUBTYPE_VENDOR_LONG.to_be_bytes());
    f[19..22].copy_from_slice(&BRCM_OUI);
    f[22..24].copy_from_slice(&BCMILCP_BCM_SUBTYPE_EVENT.to_be_bytes());
    let m = 24;
    f[m..m + 2].copy_from_slice(&2u16.to_be_bytes());
    f[m + 2..m + 4].copy_from_slice(&spec.flags.to_be_bytes());
    f[m + 4..m + 8].copy_from_slice(&spec.event.to_be_bytes());
    f[m + 8..m + 12].copy_from_slice(&spec.status.to_be_bytes());
    f[m + 12..m + 16].copy_from_slice(&spec.reason.to_be_bytes());
    f[m + 20..m + 24].copy_from_slice(&(spec.data.len() as u32).to_be_bytes());
    f[m + 30..m + 34].copy_from_slice(b"wlan");
    f[m + 46] = spec.ifidx;
    f[m + 47] = spec.bsscfgidx;
    f.extend_from_slice(&spec.data);
    f
}

/// 事件信道上的一帧（BDC 头 + 事件帧）
pub fn bdc_event(spec: &EventSpec) -> Vec<u8> {
    let mut f = vec![0u8; 4];
    BdcHeader::new(spec.ifidx, 0).write_to(&mut f);
    f.extend(event_frame(spec));
    f
}

/// 经解析器得到的事件头（含 status/reason 平移）
pub fn ev(spec: EventSpec) -> EventHeader {
    let frame = event_frame(&spec);
    parse_event_frame(&frame).unwrap().0
}

/// 一条 BSS 信息；默认在 6 信道、ESS、在信道上测得 RSSI、来自 beacon
#[derive(Debug, Clone)]
pub struct BssSpec {
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub capability: u16,
    pub rates: Vec<u8>,
    pub chanspec: u16,
    pub dtim: u8,
    pub rssi: i16,
    pub n_cap: bool,
    pub ctl_ch: u8,
    pub flags: u8,
    pub ies: Vec<u8>,
}

impl BssSpec {
    pub fn new(bssid: MacAddr, ssid: &[u8]) -> Self {
        BssSpec {
            bssid,
            ssid: ssid.to_vec(),
            capability: capability::ESS,
            rates: vec![0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6c],
            chanspec: 0x1006,
            dtim: 1,
            rssi: -50,
            n_cap: false,
            ctl_ch: 0,
            flags: 0x04 | 0x01,
            ies: Vec::new(),
        }
    }
}

/// escan 结果头：buflen、version、sync id、BSS 数
fn escan_header(sync_id: u16, bss_len: usize, count: u16) -> Vec<u8> {
    let mut out = vec![0u8; ESCAN_RESULT_HEADER_LEN];
    out[0..4].copy_from_slice(&((ESCAN_RESULT_HEADER_LEN + bss_len) as u32).to_le_bytes());
    out[4..8].copy_from_slice(&1u32.to_le_bytes());
    out[8..10].copy_from_slice(&sync_id.to_le_bytes());
    out[10..12].copy_from_slice(&count.to_le_bytes());
    out
}

/// escan 部分结果载荷（小端）
pub fn escan_payload(sync_id: u16, spec: &BssSpec) -> Vec<u8> {
    let len = BSS_INFO_FIXED_LEN + spec.ies.len();
    let mut b = vec![0u8; len];
    b[0..4].copy_from_slice(&109u32.to_le_bytes());
    b[4..8].copy_from_slice(&(len as u32).to_le_bytes());
    b[8..14].copy_from_slice(&spec.bssid);
    b[14..16].copy_from_slice(&100u16.to_le_bytes());
    b[16..18].copy_from_slice(&spec.capability.to_le_bytes());
    b[18] = spec.ssid.len() as u8;
    b[19..19 + spec.ssid.len()].copy_from_slice(&spec.ssid);
    b[52..56].copy_from_slice(&(spec.rates.len() as u32).to_le_bytes());
    b[56..56 + spec.rates.len()].copy_from_slice(&spec.rates);
    b[72..74].copy_from_slice(&spec.chanspec.to_le_bytes());
    b[76] = spec.dtim;
    b[78..80].copy_from_slice(&spec.rssi.to_le_bytes());
    b[81] = spec.n_cap as u8;
    b[88] = spec.ctl_ch;
    b[96] = spec.flags;
    b[116..118].copy_from_slice(&(BSS_INFO_FIXED_LEN as u16).to_le_bytes());
    b[120..124].copy_from_slice(&(spec.ies.len() as u32).to_le_bytes());
    b[BSS_INFO_FIXED_LEN..].copy_from_slice(&spec.ies);

    let mut out = escan_header(sync_id, len, 1);
    out.extend(b);
    out
}

/// ESCAN_RESULT 事件；`bss` 为 None 时只带结果头（终止状态）
pub fn escan_event(sync_id: u16, status: u32, bss: Option<&BssSpec>) -> EventSpec {
    let spec = EventSpec::new(events::ESCAN_RESULT).status(status);
    match bss {
        Some(b) => spec.data(&escan_payload(sync_id, b)),
        None => spec.data(&escan_header(sync_id, 0, 0)),
    }
}

/// escan 请求中的 sync id
pub fn request_sync_id(req: &SentFrame) -> u16 {
    let p = req.iovar_payload();
    u16::from_le_bytes([p[6], p[7]])
}

/// 驱动 + 后台 RX 泵；drop 时停泵
pub struct Harness {
    pub drv: Arc<FmacDriver<MockPlatform>>,
    stop: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Harness {
    /// 按 iovar 名过滤已发送帧
    pub fn sent_iovars(&self, name: &str) -> Vec<SentFrame> {
        self.drv
            .platform()
            .sent()
            .into_iter()
            .filter(|f| f.iovar_name() == Some(name))
            .collect()
    }

    /// 停止后台 RX 泵
    pub fn stop_pump(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(t) = self.pump.lock().unwrap().take() {
            t.join().unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

pub fn driver() -> Harness {
    driver_with(|_| {})
}

pub fn driver_with(tweak: impl FnOnce(&mut DriverConfig)) -> Harness {
    let mut cfg = DriverConfig {
        chip_id: Some(43439),
        ..DriverConfig::default()
    };
    tweak(&mut cfg);
    let drv = Arc::new(FmacDriver::new(MockPlatform::new(), cfg).unwrap());
    let stop = Arc::new(AtomicBool::new(false));
    let pump = {
        let drv = drv.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            while !stop.load(Ordering::Acquire) {
                if !drv.poll_rx_once() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        })
    };
    Harness {
        drv,
        stop,
        pump: Mutex::new(Some(pump)),
    }
}

