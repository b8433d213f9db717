//! escan 结果中的 BSS 信息解析
//!
//! 事件载荷：buflen u32、version u32、sync id u16、bss count u16，之后是一条 BSS 信息
//! （128 字节定长头，小端）与其 IE 区。所有偏移先做边界检查再访问。

use alloc::vec::Vec;

use bitflags::bitflags;
use bsp::{ChipConfig, WhdError, WhdResult};
use ieee80211::{
    akm, capability, cipher, find_ie, find_vendor_ie, legacy_rate_kbps, oui, parse_rsn, parse_wpa, Band,
    HtCapabilities, MacAddr, RsnInfo, WlanEid, MAX_SSID_LEN, WPA_OUI_TYPE,
};

use crate::security::Security;

/// 扫描结果头（到第一条 BSS 信息）
pub const ESCAN_RESULT_HEADER_LEN: usize = 12;
/// BSS 信息定长部分
pub const BSS_INFO_FIXED_LEN: usize = 128;
pub const MAX_RATES: usize = 16;

mod bss_flags {
    pub const FROM_BEACON: u8 = 0x01;
    pub const RSSI_ON_CHANNEL: u8 = 0x04;
}

mod off {
    pub const LENGTH: usize = 4;
    pub const BSSID: usize = 8;
    pub const CAPABILITY: usize = 16;
    pub const SSID_LEN: usize = 18;
    pub const SSID: usize = 19;
    pub const RATE_COUNT: usize = 52;
    pub const RATES: usize = 56;
    pub const CHANSPEC: usize = 72;
    pub const DTIM: usize = 76;
    pub const RSSI: usize = 78;
    pub const N_CAP: usize = 81;
    pub const CTL_CH: usize = 88;
    pub const FLAGS: usize = 96;
    pub const IE_OFFSET: usize = 116;
    pub const IE_LENGTH: usize = 120;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BssType {
    Infra = 0,
    Adhoc = 1,
    Any = 2,
    Mesh = 3,
    Unknown = 0xFF,
}

impl TryFrom<u32> for BssType {
    type Error = WhdError;

    fn try_from(v: u32) -> WhdResult<Self> {
        match v {
            0 => Ok(BssType::Infra),
            1 => Ok(BssType::Adhoc),
            2 => Ok(BssType::Any),
            3 => Ok(BssType::Mesh),
            _ => Err(WhdError::BadArg),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResultFlags: u8 {
        const RSSI_OFF_CHANNEL = 0x01;
        const BEACON = 0x02;
    }
}

/// 一条扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub ssid: heapless::Vec<u8, MAX_SSID_LEN>,
    pub bssid: MacAddr,
    pub channel: u8,
    pub band: Band,
    /// dBm
    pub rssi: i16,
    /// kbit/s
    pub max_data_rate: u32,
    pub bss_type: BssType,
    pub security: Security,
    pub flags: ResultFlags,
    pub ccode: [u8; 2],
    pub dtim_period: u8,
    pub ie: Vec<u8>,
}

impl Default for ScanRecord {
    fn default() -> Self {
        ScanRecord {
            ssid: heapless::Vec::new(),
            bssid: [0; 6],
            channel: 0,
            band: Band::TwoGhz,
            rssi: 0,
            max_data_rate: 0,
            bss_type: BssType::Unknown,
            security: Security::OPEN,
            flags: ResultFlags::empty(),
            ccode: [0; 2],
            dtim_period: 0,
            ie: Vec::new(),
        }
    }
}

#[inline]
fn le16(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}

#[inline]
fn le32(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

fn rsn_security(rsn: &RsnInfo) -> Security {
    let mut sec = Security::empty();
    for a in rsn.akm.iter() {
        sec |= match a.kind {
            akm::PSK => Security::WPA2,
            akm::IEEE8021X | akm::IEEE8021X_SHA256 => Security::WPA2 | Security::ENTERPRISE,
            akm::FT_8021X => Security::WPA2 | Security::FBT | Security::ENTERPRISE,
            akm::FT_PSK => Security::WPA2 | Security::FBT,
            akm::SAE | akm::FT_SAE => Security::WPA3,
            akm::PSK_SHA256 => Security::WPA2 | Security::SHA256,
            _ => Security::empty(),
        };
    }
    if sec.is_empty() {
        sec = Security::WPA2;
    }
    sec | cipher_bits(rsn)
}

fn cipher_bits(info: &RsnInfo) -> Security {
    let mut sec = Security::empty();
    if info.uses_cipher(cipher::TKIP) {
        sec |= Security::TKIP;
    }
    if info.uses_cipher(cipher::CCMP) {
        sec |= Security::AES;
    }
    sec
}

/// 由 RSN / WPA 元素与 privacy 位推断安全类型
pub fn classify_security(cap: u16, ies: &[u8]) -> Security {
    let rsn = find_ie(ies, WlanEid::Rsn.as_u8()).and_then(parse_rsn);
    let wpa = find_vendor_ie(ies, oui::MICROSOFT, WPA_OUI_TYPE).and_then(parse_wpa);
    let mut sec = Security::empty();
    if let Some(rsn) = &rsn {
        sec |= rsn_security(rsn);
    }
    if let Some(wpa) = &wpa {
        sec |= Security::WPA | cipher_bits(wpa);
        if wpa.has_akm(akm::IEEE8021X) {
            sec |= Security::ENTERPRISE;
        }
    }
    if sec.is_empty() && cap & capability::PRIVACY != 0 {
        sec = Security::WEP_PSK;
    }
    sec
}

fn max_rate_kbps(rates: &[u8], ies: &[u8]) -> u32 {
    let legacy = rates.iter().map(|&r| legacy_rate_kbps(r)).max().unwrap_or(0);
    let ht = find_ie(ies, WlanEid::HtCapability.as_u8())
        .and_then(HtCapabilities::parse)
        .and_then(|ht| ht.max_rate_kbps())
        .unwrap_or(0);
    legacy.max(ht)
}

fn bss_type(cap: u16) -> BssType {
    if cap & capability::ESS != 0 {
        BssType::Infra
    } else if cap & capability::IBSS != 0 {
        BssType::Adhoc
    } else {
        BssType::Unknown
    }
}

/// 结果头中回显的 sync id；载荷不足一个结果头时为 None
pub(crate) fn escan_sync_id(data: &[u8]) -> Option<u16> {
    (data.len() >= ESCAN_RESULT_HEADER_LEN).then(|| le16(data, 8))
}

/// 解析部分扫描结果
///
/// 越界返回 `ProtocolBounds`，BSS 数不为 1 返回 `BadBssCount`；
/// 不在当前信道上测得 RSSI 的结果带 [ResultFlags::RSSI_OFF_CHANNEL]。
pub fn parse_escan_result(data: &[u8], chip: &ChipConfig) -> WhdResult<ScanRecord> {
    if data.len() < ESCAN_RESULT_HEADER_LEN {
        return Err(WhdError::ProtocolBounds);
    }
    let count = le16(data, 10);
    if count != 1 {
        return Err(WhdError::BadBssCount);
    }
    let bss = &data[ESCAN_RESULT_HEADER_LEN..];
    if bss.len() < BSS_INFO_FIXED_LEN {
        return Err(WhdError::ProtocolBounds);
    }
    let length = le32(bss, off::LENGTH) as usize;
    if length < BSS_INFO_FIXED_LEN || length > bss.len() {
        return Err(WhdError::ProtocolBounds);
    }
    let ie_offset = le16(bss, off::IE_OFFSET) as usize;
    let ie_length = le32(bss, off::IE_LENGTH) as usize;
    let ie_end = ie_offset.checked_add(ie_length).ok_or(WhdError::ProtocolBounds)?;
    if ie_offset < BSS_INFO_FIXED_LEN || ie_end > length {
        return Err(WhdError::ProtocolBounds);
    }

    let flags = bss[off::FLAGS];
    let ies = &bss[ie_offset..ie_end];
    let cap = le16(bss, off::CAPABILITY);
    let ssid_len = (bss[off::SSID_LEN] as usize).min(MAX_SSID_LEN);
    let rate_count = (le32(bss, off::RATE_COUNT) as usize).min(MAX_RATES);
    let chanspec = le16(bss, off::CHANSPEC);
    let channel = if bss[off::N_CAP] != 0 {
        bss[off::CTL_CH]
    } else {
        (chanspec & 0xff) as u8
    };

    let mut bssid = [0u8; 6];
    bssid.copy_from_slice(&bss[off::BSSID..off::BSSID + 6]);
    let mut ccode = [0u8; 2];
    if let Some(c) = find_ie(ies, WlanEid::Country.as_u8()).filter(|c| c.len() >= 2) {
        ccode.copy_from_slice(&c[..2]);
    }
    let mut result_flags = ResultFlags::empty();
    if flags & bss_flags::FROM_BEACON != 0 {
        result_flags |= ResultFlags::BEACON;
    }
    if flags & bss_flags::RSSI_ON_CHANNEL == 0 {
        result_flags |= ResultFlags::RSSI_OFF_CHANNEL;
    }

    Ok(ScanRecord {
        ssid: heapless::Vec::from_slice(&bss[off::SSID..off::SSID + ssid_len]).map_err(|_| WhdError::ProtocolBounds)?,
        bssid,
        channel,
        band: chip.band(chanspec),
        rssi: le16(bss, off::RSSI) as i16,
        max_data_rate: max_rate_kbps(&bss[off::RATES..off::RATES + rate_count], ies),
        bss_type: bss_type(cap),
        security: classify_security(cap, ies),
        flags: result_flags,
        ccode,
        dtim_period: bss[off::DTIM],
        ie: ies.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{escan_payload, BssSpec};
    use proptest::prelude::*;

    const RSN_PSK_CCMP: [u8; 22] = [
        48, 20, 1, 0, 0x00, 0x0F, 0xAC, 4, 1, 0, 0x00, 0x0F, 0xAC, 4, 1, 0, 0x00, 0x0F, 0xAC, 2, 0, 0,
    ];

    fn rsn_ie(akms: &[u8], ciphers: &[u8]) -> Vec<u8> {
        let mut body = vec![1, 0, 0x00, 0x0F, 0xAC, ciphers[0]];
        body.extend_from_slice(&(ciphers.len() as u16).to_le_bytes());
        for &c in ciphers {
            body.extend_from_slice(&[0x00, 0x0F, 0xAC, c]);
        }
        body.extend_from_slice(&(akms.len() as u16).to_le_bytes());
        for &a in akms {
            body.extend_from_slice(&[0x00, 0x0F, 0xAC, a]);
        }
        let mut ie = vec![48, body.len() as u8];
        ie.extend(body);
        ie
    }

    fn wpa_ie(akm: u8, cipher: u8) -> Vec<u8> {
        vec![
            221, 22, 0x00, 0x50, 0xF2, 1, 1, 0, 0x00, 0x50, 0xF2, cipher, 1, 0, 0x00, 0x50, 0xF2, cipher, 1, 0, 0x00,
            0x50, 0xF2, akm,
        ]
    }

    #[test]
    fn parses_record_fields() {
        let mut spec = BssSpec::new([2, 0, 0, 0, 0, 9], b"cafe");
        spec.rssi = -61;
        spec.dtim = 3;
        spec.ies = [&RSN_PSK_CCMP[..], &[7, 3, b'D', b'E', b' ']].concat();
        let rec = parse_escan_result(&escan_payload(1, &spec), &ChipConfig::D11AC).unwrap();
        assert_eq!(rec.ssid.as_slice(), b"cafe");
        assert_eq!(rec.bssid, [2, 0, 0, 0, 0, 9]);
        assert_eq!(rec.channel, 6);
        assert_eq!(rec.band, Band::TwoGhz);
        assert_eq!(rec.rssi, -61);
        assert_eq!(rec.max_data_rate, 54_000);
        assert_eq!(rec.bss_type, BssType::Infra);
        assert_eq!(rec.security, Security::WPA2_AES_PSK);
        assert_eq!(rec.ccode, *b"DE");
        assert_eq!(rec.dtim_period, 3);
        assert!(rec.flags.contains(ResultFlags::BEACON));
        assert_eq!(rec.ie, spec.ies);
    }

    #[test]
    fn ht_channel_and_rate() {
        let mut spec = BssSpec::new([2, 0, 0, 0, 0, 1], b"n");
        spec.n_cap = true;
        spec.ctl_ch = 11;
        let mut ht = vec![45, 26, 0x62, 0x00, 0x17, 0xff, 0xff];
        ht.resize(28, 0);
        spec.ies = ht;
        let rec = parse_escan_result(&escan_payload(1, &spec), &ChipConfig::D11AC).unwrap();
        assert_eq!(rec.channel, 11);
        assert_eq!(rec.max_data_rate, 300_000);
    }

    #[test]
    fn security_classification() {
        let c = |ies: Vec<u8>| classify_security(capability::ESS | capability::PRIVACY, &ies);
        assert_eq!(c(rsn_ie(&[akm::SAE], &[cipher::CCMP])), Security::WPA3_SAE);
        assert_eq!(c(rsn_ie(&[akm::SAE, akm::PSK], &[cipher::CCMP])), Security::WPA3_WPA2_PSK);
        assert_eq!(c(rsn_ie(&[akm::IEEE8021X], &[cipher::CCMP])), Security::WPA2_AES_ENT);
        assert_eq!(c(rsn_ie(&[akm::FT_PSK], &[cipher::CCMP])), Security::WPA2_FBT_PSK);
        assert_eq!(c(rsn_ie(&[akm::PSK_SHA256], &[cipher::CCMP])), Security::WPA2_AES_PSK_SHA256);
        assert_eq!(c(rsn_ie(&[akm::PSK], &[cipher::TKIP, cipher::CCMP])), Security::WPA2_MIXED_PSK);
        assert_eq!(c(wpa_ie(akm::PSK, cipher::TKIP)), Security::WPA_TKIP_PSK);
        assert_eq!(
            c([rsn_ie(&[akm::PSK], &[cipher::CCMP]), wpa_ie(akm::PSK, cipher::TKIP)].concat()),
            Security::WPA_WPA2_MIXED_PSK
        );
        assert_eq!(c(vec![]), Security::WEP_PSK);
        assert_eq!(classify_security(capability::ESS, &[]), Security::OPEN);
    }

    #[test]
    fn off_channel_results_are_flagged() {
        let mut spec = BssSpec::new([2, 0, 0, 0, 0, 1], b"far");
        spec.flags = bss_flags::FROM_BEACON;
        let rec = parse_escan_result(&escan_payload(1, &spec), &ChipConfig::D11AC).unwrap();
        assert!(rec.flags.contains(ResultFlags::RSSI_OFF_CHANNEL | ResultFlags::BEACON));
    }

    #[test]
    fn sync_id_is_read_from_the_result_header() {
        let spec = BssSpec::new([2, 0, 0, 0, 0, 1], b"x");
        assert_eq!(escan_sync_id(&escan_payload(0x0102, &spec)), Some(0x0102));
        assert_eq!(escan_sync_id(&[0u8; 8]), None);
    }

    #[test]
    fn rejects_bad_layouts() {
        let spec = BssSpec::new([2, 0, 0, 0, 0, 1], b"x");
        let good = escan_payload(1, &spec);
        let chip = ChipConfig::D11AC;

        let mut two = good.clone();
        two[10] = 2;
        assert_eq!(parse_escan_result(&two, &chip), Err(WhdError::BadBssCount));

        let mut low_ie = good.clone();
        low_ie[12 + off::IE_OFFSET] = 100;
        assert_eq!(parse_escan_result(&low_ie, &chip), Err(WhdError::ProtocolBounds));

        let mut long_ie = good.clone();
        long_ie[12 + off::IE_LENGTH] = 0xff;
        assert_eq!(parse_escan_result(&long_ie, &chip), Err(WhdError::ProtocolBounds));

        let mut long_bss = good.clone();
        long_bss[12 + off::LENGTH + 1] = 0x10;
        assert_eq!(parse_escan_result(&long_bss, &chip), Err(WhdError::ProtocolBounds));

        assert_eq!(parse_escan_result(&good[..60], &chip), Err(WhdError::ProtocolBounds));
        assert_eq!(parse_escan_result(&good[..8], &chip), Err(WhdError::ProtocolBounds));
    }

    proptest! {
        #[test]
        fn arbitrary_ie_fields_never_escape_the_record(
            ie_offset in any::<u16>(),
            ie_length in any::<u32>(),
            length in any::<u32>(),
            tail in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut spec = BssSpec::new([2, 0, 0, 0, 0, 1], b"p");
            spec.ies = tail;
            let mut buf = escan_payload(1, &spec);
            let b = ESCAN_RESULT_HEADER_LEN;
            buf[b + off::IE_OFFSET..b + off::IE_OFFSET + 2].copy_from_slice(&ie_offset.to_le_bytes());
            buf[b + off::IE_LENGTH..b + off::IE_LENGTH + 4].copy_from_slice(&ie_length.to_le_bytes());
            buf[b + off::LENGTH..b + off::LENGTH + 4].copy_from_slice(&length.to_le_bytes());
            let r = parse_escan_result(&buf, &ChipConfig::D11AC);
            let in_bounds = (ie_offset as usize) >= BSS_INFO_FIXED_LEN
                && (length as usize) >= BSS_INFO_FIXED_LEN
                && (length as usize) <= buf.len() - b
                && (ie_offset as u64 + ie_length as u64) <= length as u64;
            if in_bounds {
                let rec = r.unwrap();
                prop_assert_eq!(rec.ie.len(), ie_length as usize);
            } else {
                prop_assert_eq!(r, Err(WhdError::ProtocolBounds));
            }
        }
    }
}
