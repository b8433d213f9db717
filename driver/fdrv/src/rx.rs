//! 收包分类与数据面出入口
//!
//! 总线上每帧属于控制、事件、数据三个逻辑信道之一：控制帧交给命令通道配对，
//! 事件帧去掉 BDC 头后交给注册表分发，数据帧交给上层注册的回调（未注册则丢弃）。

use core::sync::atomic::{AtomicBool, Ordering};

use bsp::cdc::BDC_HEADER_LEN;
use bsp::{BdcHeader, BufferPool, Bus, BusChannel, Os, PktBuf, Platform, WhdError, WhdResult, BUS_HEADROOM};

use crate::driver::{FmacDriver, RxDataHandler};

impl<P: Platform> FmacDriver<P> {
    /// 注册或清除数据帧回调
    pub fn set_rx_data_handler(&self, handler: Option<RxDataHandler>) {
        *self.rx_data.lock() = handler;
    }

    /// 处理一帧
    pub fn process_rx(&self, channel: BusChannel, pkt: PktBuf) {
        match channel {
            BusChannel::Control => {
                // 丢弃的帧已由命令通道归还
                if let Err(e) = self.cmd.on_control_frame(pkt) {
                    log::debug!(target: "wireless::fdrv", "control frame dropped: {}", e);
                }
            }
            BusChannel::Event => {
                match BdcHeader::parse(pkt.data()) {
                    Some((_, off)) => {
                        let out = self.events.dispatch(&pkt.data()[off..]);
                        if let Some(ev) = out.event {
                            log::trace!(
                                target: "wireless::fdrv",
                                "event {} -> {} handler(s), {} released",
                                ev.event_type,
                                out.delivered,
                                out.released
                            );
                        }
                    }
                    None => log::warn!(target: "wireless::fdrv", "event frame with bad BDC header dropped"),
                }
                self.platform().release(pkt);
            }
            BusChannel::Data => {
                match BdcHeader::parse(pkt.data()) {
                    Some((hdr, off)) => match self.rx_data.lock().as_ref() {
                        Some(cb) => cb(hdr.interface(), &pkt.data()[off..]),
                        None => log::debug!(target: "wireless::fdrv", "no data handler, {} bytes dropped", pkt.len()),
                    },
                    None => log::warn!(target: "wireless::fdrv", "data frame with bad BDC header dropped"),
                }
                self.platform().release(pkt);
            }
        }
    }

    /// 从总线取一帧并处理；无帧时返回 false
    pub fn poll_rx_once(&self) -> bool {
        match self.platform().receive() {
            Some((channel, pkt)) => {
                self.process_rx(channel, pkt);
                true
            }
            None => false,
        }
    }

    /// RX 线程主循环，`stop` 置位后返回
    pub fn run_rx(&self, stop: &AtomicBool) {
        log::info!(target: "wireless::fdrv", "rx loop started");
        while !stop.load(Ordering::Acquire) {
            if !self.poll_rx_once() {
                self.platform().delay(self.config.rx_idle_poll);
            }
        }
        log::info!(target: "wireless::fdrv", "rx loop stopped");
    }

    /// 发送一条以太网帧
    pub fn send_data(&self, ifidx: u8, frame: &[u8]) -> WhdResult<()> {
        let plat = self.platform();
        let mut pkt = plat
            .acquire(BDC_HEADER_LEN + frame.len(), BUS_HEADROOM)
            .ok_or(WhdError::NoMem)?;
        let buf = pkt.data_mut();
        BdcHeader::new(ifidx, 0).write_to(buf);
        buf[BDC_HEADER_LEN..].copy_from_slice(frame);
        let _awake = self.cmd.hold_awake()?;
        plat.transmit(BusChannel::Data, pkt)
    }
}
