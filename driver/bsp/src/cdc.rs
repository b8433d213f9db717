//! CDC / BDC 帧头与 IOVAR 名称编码
//!
//! CDC（16 字节，小端）：`cmd | len | flags | status`，flags 中 bit0 错误、bit1 SET、
//! bit12..15 接口号、bit16..31 关联 id。
//! BDC（4 字节）：`flags(版本在高 4 位) | priority | flags2(接口号) | data_offset(4 字节单位)`。

pub const CDC_HEADER_LEN: usize = 16;

pub mod cdc_flags {
    pub const ERROR: u32 = 0x01;
    pub const SET: u32 = 0x02;
    pub const IF_MASK: u32 = 0xF000;
    pub const IF_SHIFT: u32 = 12;
    pub const ID_MASK: u32 = 0xFFFF_0000;
    pub const ID_SHIFT: u32 = 16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdKind {
    Get,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CdcHeader {
    pub cmd: u32,
    pub len: u32,
    pub flags: u32,
    pub status: u32,
}

impl CdcHeader {
    pub fn request(cmd: u32, kind: CmdKind, ifidx: u8, id: u16, len: usize) -> Self {
        let mut flags = ((id as u32) << cdc_flags::ID_SHIFT) & cdc_flags::ID_MASK;
        flags |= ((ifidx as u32) << cdc_flags::IF_SHIFT) & cdc_flags::IF_MASK;
        if kind == CmdKind::Set {
            flags |= cdc_flags::SET;
        }
        CdcHeader {
            cmd,
            len: len as u32,
            flags,
            status: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> u16 {
        ((self.flags & cdc_flags::ID_MASK) >> cdc_flags::ID_SHIFT) as u16
    }

    #[inline]
    pub fn interface(&self) -> u8 {
        ((self.flags & cdc_flags::IF_MASK) >> cdc_flags::IF_SHIFT) as u8
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.flags & cdc_flags::SET != 0
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.flags & cdc_flags::ERROR != 0
    }

    /// 固件状态按有符号 BCME 码解释
    #[inline]
    pub fn status_code(&self) -> i32 {
        self.status as i32
    }

    /// 写入 `out[..16]`；`out` 不足 16 字节时返回 false
    pub fn write_to(&self, out: &mut [u8]) -> bool {
        if out.len() < CDC_HEADER_LEN {
            return false;
        }
        out[0..4].copy_from_slice(&self.cmd.to_le_bytes());
        out[4..8].copy_from_slice(&self.len.to_le_bytes());
        out[8..12].copy_from_slice(&self.flags.to_le_bytes());
        out[12..16].copy_from_slice(&self.status.to_le_bytes());
        true
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < CDC_HEADER_LEN {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Some(CdcHeader {
            cmd: word(0),
            len: word(4),
            flags: word(8),
            status: word(12),
        })
    }
}

pub const BDC_HEADER_LEN: usize = 4;
pub const BDC_PROTO_VER: u8 = 2;
const BDC_FLAG_VER_SHIFT: u8 = 4;
const BDC_FLAG_VER_MASK: u8 = 0xF0;
const BDC_FLAG2_IF_MASK: u8 = 0x0F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdcHeader {
    pub flags: u8,
    pub priority: u8,
    pub flags2: u8,
    pub data_offset: u8,
}

impl BdcHeader {
    pub fn new(ifidx: u8, priority: u8) -> Self {
        BdcHeader {
            flags: BDC_PROTO_VER << BDC_FLAG_VER_SHIFT,
            priority,
            flags2: ifidx & BDC_FLAG2_IF_MASK,
            data_offset: 0,
        }
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.flags & BDC_FLAG_VER_MASK) >> BDC_FLAG_VER_SHIFT
    }

    #[inline]
    pub fn interface(&self) -> u8 {
        self.flags2 & BDC_FLAG2_IF_MASK
    }

    /// 头部之后、载荷之前的扩展长度（字节）
    #[inline]
    pub fn extension_len(&self) -> usize {
        self.data_offset as usize * 4
    }

    pub fn write_to(&self, out: &mut [u8]) -> bool {
        if out.len() < BDC_HEADER_LEN {
            return false;
        }
        out[..4].copy_from_slice(&[self.flags, self.priority, self.flags2, self.data_offset]);
        true
    }

    /// 解析并返回载荷起始偏移；版本不符或扩展越界返回 None
    pub fn parse(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < BDC_HEADER_LEN {
            return None;
        }
        let hdr = BdcHeader {
            flags: buf[0],
            priority: buf[1],
            flags2: buf[2],
            data_offset: buf[3],
        };
        if hdr.version() != BDC_PROTO_VER {
            return None;
        }
        let payload = BDC_HEADER_LEN + hdr.extension_len();
        if payload > buf.len() {
            return None;
        }
        Some((hdr, payload))
    }
}

#[inline]
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// BSS 配置命名空间前缀
pub const BSSCFG_PREFIX: &str = "bsscfg:";

/// IOVAR 名称
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IovarName<'a> {
    Global(&'a str),
    /// `bsscfg:<name>`，名称后紧跟 u32 BSS 配置索引
    Bsscfg(&'a str, u32),
}

impl IovarName<'_> {
    /// 名称（含 NUL 与 4 字节对齐填充，bsscfg 形式含索引）占用的字节数
    pub fn encoded_len(&self) -> usize {
        match self {
            IovarName::Global(name) => align4(name.len() + 1),
            IovarName::Bsscfg(name, _) => align4(BSSCFG_PREFIX.len() + name.len() + 1) + 4,
        }
    }

    /// 写入 `out`，返回写入长度；`out` 不足时返回 None
    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        let total = self.encoded_len();
        let out = out.get_mut(..total)?;
        out.fill(0);
        match self {
            IovarName::Global(name) => out[..name.len()].copy_from_slice(name.as_bytes()),
            IovarName::Bsscfg(name, index) => {
                let p = BSSCFG_PREFIX.len();
                out[..p].copy_from_slice(BSSCFG_PREFIX.as_bytes());
                out[p..p + name.len()].copy_from_slice(name.as_bytes());
                out[total - 4..].copy_from_slice(&index.to_le_bytes());
            }
        }
        Some(total)
    }

    pub fn name(&self) -> &str {
        match self {
            IovarName::Global(name) | IovarName::Bsscfg(name, _) => name,
        }
    }
}
