//! 命令通道
//!
//! CDC 请求/响应配对：全驱动同一时刻最多一个未完成请求，由传输锁串行化；
//! RX 线程收到的响应按关联 id 与未完成请求比对，不匹配的丢弃且不唤醒等待方。

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;

use skb::{BufferPool, PktBuf};

use crate::awake::{AwakeGuard, KeepAwake};
use crate::bus::{Bus, BusChannel};
use crate::cdc::{CdcHeader, CmdKind, IovarName, CDC_HEADER_LEN};
use crate::chip::{self, ChipConfig};
use crate::ioctl::{WLC_GET_VAR, WLC_SET_VAR};
use crate::sync::{drain, Os, SemLock, Semaphore};
use crate::{Platform, WhdError, WhdResult, BUS_HEADROOM};

/// 默认命令超时
pub const DEFAULT_IOCTL_TIMEOUT: Duration = Duration::from_millis(5000);

/// 未完成请求与响应槽
struct InFlight {
    next_id: u16,
    pending: Option<u16>,
    response: Option<(CdcHeader, PktBuf)>,
}

/// 命令通道
pub struct CmdChannel<P: Platform> {
    plat: P,
    tx_lock: SemLock<P::Sem>,
    ready: P::Sem,
    inflight: spin::Mutex<InFlight>,
    awake: KeepAwake,
    timeout: Duration,
    stale: AtomicU32,
}

impl<P: Platform> CmdChannel<P> {
    pub fn new(plat: P, timeout: Duration) -> Self {
        let tx_lock = SemLock::new(plat.semaphore(1));
        let ready = plat.semaphore(0);
        CmdChannel {
            plat,
            tx_lock,
            ready,
            inflight: spin::Mutex::new(InFlight {
                next_id: 0,
                pending: None,
                response: None,
            }),
            awake: KeepAwake::new(),
            timeout,
            stale: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.plat
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn keep_awake(&self) -> &KeepAwake {
        &self.awake
    }

    pub fn hold_awake(&self) -> WhdResult<AwakeGuard<'_, P>> {
        self.awake.hold(&self.plat)
    }

    /// 被丢弃的（迟到/重复/不匹配）响应数
    pub fn stale_responses(&self) -> u32 {
        self.stale.load(Ordering::Relaxed)
    }

    /// 发送 IOCTL 并等待响应，成功时响应载荷所有权交给调用方
    pub fn send_command(&self, ifidx: u8, cmd: u32, kind: CmdKind, payload: &[u8]) -> WhdResult<PktBuf> {
        self.transact(ifidx, cmd, kind, payload.len(), |body| body.copy_from_slice(payload))
    }

    /// 发送 IOVAR（GET_VAR / SET_VAR），载荷前加编码后的名称
    pub fn send_iovar(&self, ifidx: u8, kind: CmdKind, name: IovarName<'_>, payload: &[u8]) -> WhdResult<PktBuf> {
        let name_len = name.encoded_len();
        let cmd = match kind {
            CmdKind::Get => WLC_GET_VAR,
            CmdKind::Set => WLC_SET_VAR,
        };
        self.transact(ifidx, cmd, kind, name_len + payload.len(), |body| {
            let _ = name.encode(body);
            body[name_len..].copy_from_slice(payload);
        })
        .inspect_err(|e| log::debug!(target: "wireless::bsp::cmd", "iovar {} failed: {}", name.name(), e))
    }

    fn transact(
        &self,
        ifidx: u8,
        cmd: u32,
        kind: CmdKind,
        body_len: usize,
        fill: impl FnOnce(&mut [u8]),
    ) -> WhdResult<PktBuf> {
        let mut pkt = self
            .plat
            .acquire(CDC_HEADER_LEN + body_len, BUS_HEADROOM)
            .ok_or(WhdError::NoMem)?;
        fill(&mut pkt.data_mut()[CDC_HEADER_LEN..]);

        let _awake = self.awake.hold(&self.plat)?;
        let _tx = self.tx_lock.lock();

        let leftover = drain(&self.ready);
        if leftover > 0 {
            log::debug!(target: "wireless::bsp::cmd", "drained {} stale ready signal(s)", leftover);
        }
        let id = {
            let mut f = self.inflight.lock();
            f.next_id = f.next_id.wrapping_add(1);
            f.pending = Some(f.next_id);
            f.response = None;
            f.next_id
        };
        CdcHeader::request(cmd, kind, ifidx, id, body_len).write_to(pkt.data_mut());
        log::debug!(target: "wireless::bsp::cmd", "send cmd={} {:?} if={} id={} len={}", cmd, kind, ifidx, id, body_len);

        if let Err(e) = self.plat.transmit(BusChannel::Control, pkt) {
            self.clear_pending();
            log::warn!(target: "wireless::bsp::cmd", "cmd={} id={} transmit failed: {}", cmd, id, e);
            return Err(e);
        }

        match self.wait_response(id) {
            Some((hdr, resp)) => self.complete(hdr, resp),
            None => {
                self.clear_pending();
                log::warn!(target: "wireless::bsp::cmd", "cmd={} id={} timed out after {:?}", cmd, id, self.timeout);
                Err(WhdError::Timeout)
            }
        }
    }

    /// 等待 id 对应的响应直至截止；无匹配响应的唤醒继续等待剩余时间
    fn wait_response(&self, id: u16) -> Option<(CdcHeader, PktBuf)> {
        let deadline = self.plat.now() + self.timeout;
        loop {
            let now = self.plat.now();
            if now >= deadline {
                return None;
            }
            let signalled = self.ready.take(Some(deadline - now));
            let mut f = self.inflight.lock();
            if matches!(&f.response, Some((hdr, _)) if hdr.id() == id) {
                return f.response.take();
            }
            if !signalled {
                return None;
            }
        }
    }

    fn clear_pending(&self) {
        let late = {
            let mut f = self.inflight.lock();
            f.pending = None;
            f.response.take()
        };
        if let Some((_, pkt)) = late {
            self.plat.release(pkt);
        }
    }

    fn complete(&self, hdr: CdcHeader, mut resp: PktBuf) -> WhdResult<PktBuf> {
        if hdr.is_error() {
            let err = WhdError::from_chip_status(hdr.status_code());
            log::debug!(target: "wireless::bsp::cmd", "cmd={} id={} chip status {}", hdr.cmd, hdr.id(), hdr.status_code());
            self.plat.release(resp);
            return Err(err);
        }
        resp.truncate(hdr.len as usize);
        Ok(resp)
    }

    /// RX 线程投递的控制帧
    ///
    /// 返回 `Err` 仅用于诊断：帧已被丢弃。
    pub fn on_control_frame(&self, mut pkt: PktBuf) -> WhdResult<()> {
        let Some(hdr) = CdcHeader::parse(pkt.data()) else {
            log::warn!(target: "wireless::bsp::cmd", "short control frame ({} bytes) dropped", pkt.len());
            self.plat.release(pkt);
            return Err(WhdError::MalformedFrame);
        };
        pkt.pull(CDC_HEADER_LEN);
        let id = hdr.id();
        let mut f = self.inflight.lock();
        if f.pending != Some(id) {
            let outstanding = f.pending;
            drop(f);
            self.stale.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                target: "wireless::bsp::cmd",
                "drop response cmd={} id={} (outstanding {:?})",
                hdr.cmd,
                id,
                outstanding
            );
            self.plat.release(pkt);
            return Err(WhdError::IdMismatch);
        }
        f.pending = None;
        f.response = Some((hdr, pkt));
        drop(f);
        self.ready.give();
        Ok(())
    }

    pub fn set_ioctl_u32(&self, ifidx: u8, cmd: u32, value: u32) -> WhdResult<()> {
        self.send_command(ifidx, cmd, CmdKind::Set, &value.to_le_bytes()).map(drop)
    }

    pub fn get_ioctl_u32(&self, ifidx: u8, cmd: u32) -> WhdResult<u32> {
        let resp = self.send_command(ifidx, cmd, CmdKind::Get, &[0; 4])?;
        read_u32(&resp)
    }

    pub fn set_iovar(&self, ifidx: u8, name: &str, data: &[u8]) -> WhdResult<()> {
        self.send_iovar(ifidx, CmdKind::Set, IovarName::Global(name), data).map(drop)
    }

    /// 读取 IOVAR，`len` 为期望的响应长度
    pub fn get_iovar(&self, ifidx: u8, name: &str, len: usize) -> WhdResult<PktBuf> {
        let name = IovarName::Global(name);
        let name_len = name.encoded_len();
        self.transact(ifidx, WLC_GET_VAR, CmdKind::Get, name_len + len, |body| {
            let _ = name.encode(body);
        })
    }

    pub fn set_iovar_u32(&self, ifidx: u8, name: &str, value: u32) -> WhdResult<()> {
        self.set_iovar(ifidx, name, &value.to_le_bytes())
    }

    pub fn set_bsscfg_iovar_u32(&self, ifidx: u8, name: &str, bsscfgidx: u32, value: u32) -> WhdResult<()> {
        self.send_iovar(ifidx, CmdKind::Set, IovarName::Bsscfg(name, bsscfgidx), &value.to_le_bytes())
            .map(drop)
    }

    /// 经背板识别芯片
    pub fn detect_chip(&self) -> WhdResult<ChipConfig> {
        let _awake = self.hold_awake()?;
        chip::detect_chip(&self.plat)
    }
}

fn read_u32(resp: &[u8]) -> WhdResult<u32> {
    match resp.get(..4) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(WhdError::MalformedFrame),
    }
}
