//! HT Capabilities 元素（45）

/// 元素 body 标准长度
pub const HT_CAP_IE_LEN: usize = 26;

/// HT Capabilities Info 位
pub mod cap_info {
    pub const CHAN_WIDTH_40: u16 = 0x0002;
    pub const SGI_20: u16 = 0x0020;
    pub const SGI_40: u16 = 0x0040;
}

/// 单空间流速率（kbps），行依次为 20MHz 长 GI、20MHz 短 GI、40MHz 长 GI、40MHz 短 GI
const MCS_RATE_KBPS: [[u32; 8]; 4] = [
    [6500, 13000, 19500, 26000, 39000, 52000, 58500, 65000],
    [7222, 14444, 21667, 28889, 43333, 57778, 65000, 72222],
    [13500, 27000, 40500, 54000, 81000, 108000, 121500, 135000],
    [15000, 30000, 45000, 60000, 90000, 120000, 135000, 150000],
];

/// 速率表覆盖的最高 MCS 索引（4 空间流）
const MAX_MCS_INDEX: u8 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtCapabilities {
    pub info: u16,
    pub ampdu_params: u8,
    pub rx_mcs: [u8; 16],
}

impl HtCapabilities {
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.len() < HT_CAP_IE_LEN {
            return None;
        }
        let mut rx_mcs = [0u8; 16];
        rx_mcs.copy_from_slice(&body[3..19]);
        Some(HtCapabilities {
            info: u16::from_le_bytes([body[0], body[1]]),
            ampdu_params: body[2],
            rx_mcs,
        })
    }

    /// 接收 MCS 位图中最高的已支持索引（0..=31）
    pub fn highest_mcs(&self) -> Option<u8> {
        (0..=MAX_MCS_INDEX)
            .rev()
            .find(|&i| self.rx_mcs[(i / 8) as usize] & (1 << (i % 8)) != 0)
    }

    /// 按最高 MCS、信道宽度与 GI 推出的最大速率（kbps，取整到 100 kbps）
    pub fn max_rate_kbps(&self) -> Option<u32> {
        let mcs = self.highest_mcs()?;
        let wide = self.info & cap_info::CHAN_WIDTH_40 != 0;
        let row = match (wide, self.info & cap_info::SGI_40 != 0, self.info & cap_info::SGI_20 != 0) {
            (true, true, _) => 3,
            (true, false, _) => 2,
            (false, _, true) => 1,
            (false, _, false) => 0,
        };
        let streams = (mcs / 8) as u32 + 1;
        let rate = MCS_RATE_KBPS[row][(mcs % 8) as usize] * streams;
        Some((rate + 50) / 100 * 100)
    }
}
