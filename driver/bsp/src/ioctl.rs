//! 固件 IOCTL 命令号与本驱动使用的 IOVAR 名称

pub const WLC_UP: u32 = 2;
pub const WLC_DOWN: u32 = 3;
pub const WLC_SET_INFRA: u32 = 20;
pub const WLC_SET_AUTH: u32 = 22;
pub const WLC_GET_BSSID: u32 = 23;
pub const WLC_SET_SSID: u32 = 26;
pub const WLC_SET_KEY: u32 = 45;
pub const WLC_DISASSOC: u32 = 52;
pub const WLC_SET_WSEC: u32 = 134;
pub const WLC_SET_WPA_AUTH: u32 = 165;
pub const WLC_GET_VAR: u32 = 262;
pub const WLC_SET_VAR: u32 = 263;
pub const WLC_SET_WSEC_PMK: u32 = 268;

pub mod iovar {
    pub const EVENT_MSGS: &str = "event_msgs";
    pub const EVENT_MSGS_EXT: &str = "event_msgs_ext";
    pub const ESCAN: &str = "escan";
    pub const SUP_WPA: &str = "sup_wpa";
    pub const SUP_WPA2_EAPVER: &str = "sup_wpa2_eapver";
    pub const SUP_WPA_TMO: &str = "sup_wpa_tmo";
    pub const SAE_PASSWORD: &str = "sae_password";
    pub const MFP: &str = "mfp";
}
