//! IEEE 802.11 类型与常量

/// MAC 地址长度
pub const ETH_ALEN: usize = 6;

/// SSID 最大长度
pub const MAX_SSID_LEN: usize = 32;

pub type MacAddr = [u8; ETH_ALEN];

/// 频段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Band {
    #[default]
    TwoGhz = 0,
    FiveGhz = 1,
    SixGhz = 2,
}

/// 按信道号推断频段（1..=14 为 2.4 GHz）
pub const fn band_for_channel(channel: u8) -> Band {
    if channel >= 1 && channel <= 14 {
        Band::TwoGhz
    } else {
        Band::FiveGhz
    }
}

/// 信息元素 ID（WLAN_EID_*）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WlanEid {
    Ssid = 0,
    SupportedRates = 1,
    DsParams = 3,
    Tim = 5,
    Country = 7,
    HtCapability = 45,
    Rsn = 48,
    ExtSupportedRates = 50,
    VhtCapability = 191,
    VendorSpecific = 221,
}

impl WlanEid {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Beacon / Probe Response 能力字段位
pub mod capability {
    pub const ESS: u16 = 0x0001;
    pub const IBSS: u16 = 0x0002;
    pub const PRIVACY: u16 = 0x0010;
    pub const SHORT_PREAMBLE: u16 = 0x0020;
    pub const SHORT_SLOT: u16 = 0x0400;
}

/// 厂商 OUI
pub mod oui {
    /// Microsoft，WPA 元素承载者
    pub const MICROSOFT: [u8; 3] = [0x00, 0x50, 0xF2];
    /// IEEE 802.11，RSN 套件选择子
    pub const IEEE80211: [u8; 3] = [0x00, 0x0F, 0xAC];
    /// Broadcom
    pub const BROADCOM: [u8; 3] = [0x00, 0x10, 0x18];
}

/// WPA 厂商元素的 OUI 类型
pub const WPA_OUI_TYPE: u8 = 1;

/// 支持速率字节（500 kbps 单位，最高位为基本速率标志）换算为 kbps
#[inline]
pub const fn legacy_rate_kbps(rate: u8) -> u32 {
    (rate & 0x7f) as u32 * 500
}
