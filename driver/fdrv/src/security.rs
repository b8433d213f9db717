//! 安全类型
//!
//! 低 8 位为加密（WEP/TKIP/AES），与固件 wsec 取值一致；高位为认证族标志。

use bitflags::bitflags;
use bsp::{WhdError, WhdResult};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Security: u32 {
        const WEP = 0x0000_0001;
        const TKIP = 0x0000_0002;
        const AES = 0x0000_0004;
        const SHARED = 0x0000_8000;
        const WPA = 0x0020_0000;
        const WPA2 = 0x0040_0000;
        const SHA256 = 0x0080_0000;
        const WPA3 = 0x0100_0000;
        const ENTERPRISE = 0x0200_0000;
        const FBT = 0x0400_0000;
        const WPS = 0x1000_0000;
        const IBSS = 0x2000_0000;

        const WEP_PSK = Self::WEP.bits();
        const WEP_SHARED = Self::WEP.bits() | Self::SHARED.bits();
        const WPA_TKIP_PSK = Self::WPA.bits() | Self::TKIP.bits();
        const WPA_AES_PSK = Self::WPA.bits() | Self::AES.bits();
        const WPA_MIXED_PSK = Self::WPA.bits() | Self::AES.bits() | Self::TKIP.bits();
        const WPA2_AES_PSK = Self::WPA2.bits() | Self::AES.bits();
        const WPA2_TKIP_PSK = Self::WPA2.bits() | Self::TKIP.bits();
        const WPA2_MIXED_PSK = Self::WPA2.bits() | Self::AES.bits() | Self::TKIP.bits();
        const WPA2_AES_PSK_SHA256 = Self::WPA2.bits() | Self::AES.bits() | Self::SHA256.bits();
        const WPA2_FBT_PSK = Self::WPA2.bits() | Self::AES.bits() | Self::FBT.bits();
        const WPA_WPA2_MIXED_PSK = Self::WPA.bits() | Self::WPA2.bits() | Self::AES.bits() | Self::TKIP.bits();
        const WPA2_AES_ENT = Self::ENTERPRISE.bits() | Self::WPA2.bits() | Self::AES.bits();
        const WPA3_SAE = Self::WPA3.bits() | Self::AES.bits();
        const WPA3_WPA2_PSK = Self::WPA3.bits() | Self::WPA2.bits() | Self::AES.bits();
    }
}

/// WLC_SET_WPA_AUTH 取值
pub mod wpa_auth {
    pub const DISABLED: u32 = 0x0000;
    pub const WPA_UNSPECIFIED: u32 = 0x0002;
    pub const WPA_PSK: u32 = 0x0004;
    pub const WPA2_UNSPECIFIED: u32 = 0x0040;
    pub const WPA2_PSK: u32 = 0x0080;
    pub const WPA2_FT: u32 = 0x4000;
    pub const WPA2_PSK_SHA256: u32 = 0x8000;
    pub const WPA3_SAE_PSK: u32 = 0x40000;
}

/// WLC_SET_AUTH 取值
pub mod auth_mode {
    pub const OPEN: u32 = 0;
    pub const SHARED: u32 = 1;
    pub const SAE: u32 = 3;
}

pub const MIN_PSK_LEN: usize = 8;
/// 64 字节为十六进制 PMK
pub const MAX_PSK_LEN: usize = 64;
pub const MAX_SAE_PASSWORD_LEN: usize = 128;
pub const WEP40_KEY_LEN: usize = 5;
pub const WEP104_KEY_LEN: usize = 13;
pub const MAX_WEP_KEYS: u8 = 4;

/// WEP 密钥条目，`key` 串依次排列 `[index][len][data..]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WepKey<'a> {
    pub index: u8,
    pub data: &'a [u8],
}

/// 按条目拆分 WEP 密钥串；任一条目非法或串未被完整覆盖时返回错误
pub fn wep_keys(key: &[u8]) -> WhdResult<heapless::Vec<WepKey<'_>, 4>> {
    let mut out = heapless::Vec::new();
    let mut rest = key;
    while !rest.is_empty() {
        let [index, len, tail @ ..] = rest else {
            return Err(WhdError::InvalidKey);
        };
        let len = *len as usize;
        if *index >= MAX_WEP_KEYS || !(len == WEP40_KEY_LEN || len == WEP104_KEY_LEN) || tail.len() < len {
            return Err(WhdError::InvalidKey);
        }
        out.push(WepKey {
            index: *index,
            data: &tail[..len],
        })
        .map_err(|_| WhdError::InvalidKey)?;
        rest = &tail[len..];
    }
    if out.is_empty() {
        return Err(WhdError::InvalidKey);
    }
    Ok(out)
}

impl Security {
    pub const OPEN: Security = Security::empty();

    /// 固件 wsec：加密位
    #[inline]
    pub fn wsec(self) -> u32 {
        self.bits() & 0xFF
    }

    #[inline]
    pub fn is_wep(self) -> bool {
        self.contains(Security::WEP)
    }

    /// 需要 4 次握手的个人模式（含 SAE）
    pub fn needs_handshake(self) -> bool {
        self.intersects(Security::WPA | Security::WPA2 | Security::WPA3) && !self.contains(Security::ENTERPRISE)
    }

    /// 仅 SAE（无 WPA2 过渡）
    pub fn is_sae_only(self) -> bool {
        self.uses_sae() && !self.contains(Security::WPA2)
    }

    /// 个人模式 WPA3；企业模式不走 SAE
    pub fn uses_sae(self) -> bool {
        self.contains(Security::WPA3) && !self.contains(Security::ENTERPRISE)
    }

    pub fn uses_psk(self) -> bool {
        self.needs_handshake() && !self.is_sae_only()
    }

    pub fn wpa_auth(self) -> u32 {
        use wpa_auth::*;
        let ent = self.contains(Security::ENTERPRISE);
        let ft = if self.contains(Security::FBT) { WPA2_FT } else { 0 };
        if self.uses_sae() {
            if self.contains(Security::WPA2) {
                WPA3_SAE_PSK | WPA2_PSK
            } else {
                WPA3_SAE_PSK
            }
        } else if self.intersects(Security::WPA2 | Security::WPA3) {
            let wpa = if self.contains(Security::WPA) {
                if ent {
                    WPA_UNSPECIFIED
                } else {
                    WPA_PSK
                }
            } else {
                0
            };
            let wpa2 = match (ent, self.contains(Security::SHA256)) {
                (true, _) => WPA2_UNSPECIFIED,
                (false, true) => WPA2_PSK_SHA256,
                (false, false) => WPA2_PSK,
            };
            wpa | wpa2 | ft
        } else if self.contains(Security::WPA) {
            if ent {
                WPA_UNSPECIFIED
            } else {
                WPA_PSK
            }
        } else {
            DISABLED
        }
    }

    pub fn auth_mode(self) -> u32 {
        if self.is_sae_only() {
            auth_mode::SAE
        } else if self.contains(Security::SHARED) {
            auth_mode::SHARED
        } else {
            auth_mode::OPEN
        }
    }

    /// 固件内置请求者是否参与（企业模式由外部请求者完成）
    pub fn supplicant_enabled(self) -> bool {
        self.needs_handshake()
    }

    /// 按安全类型校验密钥
    pub fn validate_key(self, key: &[u8]) -> WhdResult<()> {
        if self.intersects(Security::IBSS | Security::WPS) {
            return Err(WhdError::BadArg);
        }
        if self.contains(Security::ENTERPRISE) || (self.wpa_auth() == wpa_auth::DISABLED && !self.is_wep()) {
            return Ok(());
        }
        if self.is_wep() {
            return wep_keys(key).map(drop);
        }
        if self.is_sae_only() {
            return if (1..=MAX_SAE_PASSWORD_LEN).contains(&key.len()) {
                Ok(())
            } else {
                Err(WhdError::InvalidKey)
            };
        }
        if !(MIN_PSK_LEN..=MAX_PSK_LEN).contains(&key.len()) {
            return Err(WhdError::InvalidKey);
        }
        if key.len() == MAX_PSK_LEN && !key.iter().all(u8::is_ascii_hexdigit) {
            return Err(WhdError::InvalidKey);
        }
        Ok(())
    }
}
