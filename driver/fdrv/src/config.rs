//! 驱动配置
//!
//! 文本配置为 `TAG=value` 行，例如：
//!
//! ```text
//! IOCTL_TIMEOUT_MS=5000
//! JOIN_TIMEOUT_MS=9000
//! CHIP_ID=a962
//! ```
//!
//! 未出现或无法解析的 tag 保留默认值。

use core::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// 单条命令等待响应的上限
    pub ioctl_timeout: Duration,
    /// join 等待的总时长
    pub join_timeout: Duration,
    /// join 等待拆分的次数
    pub join_wait_slices: u32,
    /// 同步扫描的上限
    pub scan_sync_timeout: Duration,
    /// RX 线程无数据时的休眠
    pub rx_idle_poll: Duration,
    /// 指定 chip id；None 表示经背板识别
    pub chip_id: Option<u16>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            ioctl_timeout: Duration::from_millis(5000),
            join_timeout: Duration::from_millis(9000),
            join_wait_slices: 10,
            scan_sync_timeout: Duration::from_millis(20_000),
            rx_idle_poll: Duration::from_millis(1),
            chip_id: None,
        }
    }
}

impl DriverConfig {
    /// 单次 join 子等待时长
    pub fn join_slice(&self) -> Duration {
        self.join_timeout / self.join_wait_slices.max(1)
    }
}

/// 查找 `tag` 开头的行，返回其后的值（去掉行尾 `\r` 与空白）
fn find_tag<'a>(text: &'a [u8], tag: &str) -> Option<&'a [u8]> {
    text.split(|&b| b == b'\n')
        .find_map(|line| line.strip_prefix(tag.as_bytes()))
        .map(trim)
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}

fn parse_dec(s: &[u8]) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    s.iter().try_fold(0u64, |acc, &b| {
        let d = (b as char).to_digit(10)?;
        acc.checked_mul(10)?.checked_add(d as u64)
    })
}

fn parse_hex(s: &[u8]) -> Option<u32> {
    let s = s.strip_prefix(b"0x").unwrap_or(s);
    if s.is_empty() || s.len() > 8 {
        return None;
    }
    s.iter()
        .try_fold(0u32, |acc, &b| Some((acc << 4) | (b as char).to_digit(16)?))
}

fn millis(text: &[u8], tag: &str) -> Option<Duration> {
    find_tag(text, tag).and_then(parse_dec).map(Duration::from_millis)
}

/// 解析配置文本并覆盖 `cfg` 中对应字段
pub fn parse_configfile(text: &[u8], cfg: &mut DriverConfig) {
    if let Some(v) = millis(text, "IOCTL_TIMEOUT_MS=") {
        cfg.ioctl_timeout = v;
    }
    if let Some(v) = millis(text, "JOIN_TIMEOUT_MS=") {
        cfg.join_timeout = v;
    }
    if let Some(v) = find_tag(text, "JOIN_WAIT_SLICES=").and_then(parse_dec) {
        if (1..=1000).contains(&v) {
            cfg.join_wait_slices = v as u32;
        }
    }
    if let Some(v) = millis(text, "SCAN_SYNC_TIMEOUT_MS=") {
        cfg.scan_sync_timeout = v;
    }
    if let Some(v) = millis(text, "RX_IDLE_POLL_MS=") {
        cfg.rx_idle_poll = v;
    }
    if let Some(v) = find_tag(text, "CHIP_ID=").and_then(parse_hex) {
        cfg.chip_id = u16::try_from(v).ok();
    }
    log::debug!(target: "wireless::fdrv", "config: {:?}", cfg);
}
