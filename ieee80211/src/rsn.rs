//! RSN（48）与 WPA 厂商元素（221, 00:50:F2 type 1）
//!
//! 两者 body 结构相同：`version u16 | group suite | pairwise count u16 + list | akm count u16 + list`，
//! 多字节字段小端；WPA 元素前多 4 字节 OUI + 类型。

use heapless::Vec;

/// 每类套件最多保留的条目
pub const MAX_SUITES: usize = 8;

/// 密码套件类型（套件选择子最后一字节）
pub mod cipher {
    pub const WEP40: u8 = 1;
    pub const TKIP: u8 = 2;
    pub const CCMP: u8 = 4;
    pub const WEP104: u8 = 5;
}

/// AKM 套件类型
pub mod akm {
    pub const IEEE8021X: u8 = 1;
    pub const PSK: u8 = 2;
    pub const FT_8021X: u8 = 3;
    pub const FT_PSK: u8 = 4;
    pub const IEEE8021X_SHA256: u8 = 5;
    pub const PSK_SHA256: u8 = 6;
    pub const SAE: u8 = 8;
    pub const FT_SAE: u8 = 9;
}

/// 套件选择子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suite {
    pub oui: [u8; 3],
    pub kind: u8,
}

impl Suite {
    fn parse(b: &[u8]) -> Self {
        Suite {
            oui: [b[0], b[1], b[2]],
            kind: b[3],
        }
    }
}

/// 解析后的 RSN / WPA 元素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsnInfo {
    pub version: u16,
    pub group: Suite,
    pub pairwise: Vec<Suite, MAX_SUITES>,
    pub akm: Vec<Suite, MAX_SUITES>,
}

impl RsnInfo {
    pub fn has_akm(&self, kind: u8) -> bool {
        self.akm.iter().any(|s| s.kind == kind)
    }

    /// 组播或任一单播套件为 `kind`
    pub fn uses_cipher(&self, kind: u8) -> bool {
        self.group.kind == kind || self.pairwise.iter().any(|s| s.kind == kind)
    }
}

/// 读取 `count u16 + count * 4` 的套件列表；声明数量超出剩余字节时只取完整的条目
fn suite_list<'a>(buf: &'a [u8], out: &mut Vec<Suite, MAX_SUITES>) -> &'a [u8] {
    if buf.len() < 2 {
        return &[];
    }
    let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    let rest = &buf[2..];
    let avail = (rest.len() / 4).min(count);
    for chunk in rest[..avail * 4].chunks_exact(4) {
        if out.push(Suite::parse(chunk)).is_err() {
            break;
        }
    }
    &rest[avail * 4..]
}

/// 解析 RSN 元素 body；版本与组播套件缺失时返回 None
pub fn parse_rsn(body: &[u8]) -> Option<RsnInfo> {
    if body.len() < 6 {
        return None;
    }
    let version = u16::from_le_bytes([body[0], body[1]]);
    let group = Suite::parse(&body[2..6]);
    let mut pairwise = Vec::new();
    let mut akm = Vec::new();
    let rest = suite_list(&body[6..], &mut pairwise);
    suite_list(rest, &mut akm);
    Some(RsnInfo {
        version,
        group,
        pairwise,
        akm,
    })
}

/// 解析 WPA 厂商元素 body（含 OUI 与类型字节）
pub fn parse_wpa(body: &[u8]) -> Option<RsnInfo> {
    if body.len() < 4 || body[..3] != crate::oui::MICROSOFT || body[3] != crate::WPA_OUI_TYPE {
        return None;
    }
    parse_rsn(&body[4..])
}
