//! # ieee80211 - IEEE 802.11 协议常量与信息元素解析
//!
//! | 模块      | 说明 |
//! |-----------|------|
//! | ieee80211 | 频段、元素 ID、能力位、OUI、传统速率换算 |
//! | ie        | TLV 链遍历、厂商元素查找 |
//! | rsn       | RSN / WPA 元素：组播、单播密码套件与 AKM 套件 |
//! | ht        | HT Capabilities 元素与 MCS 速率表 |

#![cfg_attr(not(test), no_std)]

pub mod ht;
pub mod ie;
pub mod ieee80211;
pub mod rsn;

pub use ht::HtCapabilities;
pub use ie::{find_ie, find_vendor_ie, ies, Ie, IeIter};
pub use ieee80211::{
    band_for_channel, capability, legacy_rate_kbps, oui, Band, MacAddr, WlanEid, ETH_ALEN, MAX_SSID_LEN, WPA_OUI_TYPE,
};
pub use rsn::{akm, cipher, parse_rsn, parse_wpa, RsnInfo, Suite};
