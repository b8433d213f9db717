//! 芯片相关常量查找
//!
//! 信道规格（chanspec）的频段/带宽位布局随 PHY 代际变化，按芯片 id 选取，协议逻辑只经 [ChipConfig] 访问。

use crate::bus::Bus;
use crate::WhdResult;
use ieee80211::Band;

/// ChipCommon 核 chip id 寄存器（背板地址）
pub const CHIPCOMMON_CHIPID_ADDR: u32 = 0x1800_0000;
const CHIPID_MASK: u32 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipConfig {
    pub chip_id: u16,
    pub chanspec_band_mask: u16,
    pub chanspec_band_2g: u16,
    pub chanspec_band_5g: u16,
    pub chanspec_bw_20: u16,
    pub chanspec_ctl_sb_none: u16,
}

impl ChipConfig {
    /// 802.11ac 布局
    pub const D11AC: ChipConfig = ChipConfig {
        chip_id: 0,
        chanspec_band_mask: 0xc000,
        chanspec_band_2g: 0x0000,
        chanspec_band_5g: 0xc000,
        chanspec_bw_20: 0x1000,
        chanspec_ctl_sb_none: 0x0000,
    };

    /// 802.11n 布局
    pub const D11N: ChipConfig = ChipConfig {
        chip_id: 0,
        chanspec_band_mask: 0xf000,
        chanspec_band_2g: 0x2000,
        chanspec_band_5g: 0x1000,
        chanspec_bw_20: 0x0800,
        chanspec_ctl_sb_none: 0x0300,
    };

    pub fn for_chip(chip_id: u16) -> Self {
        let base = match chip_id {
            43362 => Self::D11N,
            _ => Self::D11AC,
        };
        ChipConfig { chip_id, ..base }
    }

    /// 20 MHz 单信道 chanspec
    pub fn chanspec(&self, channel: u8) -> u16 {
        let band = match ieee80211::band_for_channel(channel) {
            Band::TwoGhz => self.chanspec_band_2g,
            _ => self.chanspec_band_5g,
        };
        channel as u16 | band | self.chanspec_bw_20 | self.chanspec_ctl_sb_none
    }

    pub fn band(&self, chanspec: u16) -> Band {
        if chanspec & self.chanspec_band_mask == self.chanspec_band_2g {
            Band::TwoGhz
        } else {
            Band::FiveGhz
        }
    }
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self::D11AC
    }
}

/// 经背板读取 chip id 并选取查找表
pub fn detect_chip<B: Bus + ?Sized>(bus: &B) -> WhdResult<ChipConfig> {
    let raw = bus.read_backplane(CHIPCOMMON_CHIPID_ADDR, 4)?;
    let id = (raw & CHIPID_MASK) as u16;
    log::info!(target: "wireless::bsp", "chip id {} (0x{:04x})", id, id);
    Ok(ChipConfig::for_chip(id))
}
