//! std 后端的测试平台
//!
//! [MockPlatform] 同时实现 [Bus]、[Os]、[BufferPool]：记录发出的帧，按可编程应答器生成回包放入 RX 队列，
//! 支持注入任意 RX 帧、模拟分配失败，并检测"上一请求的响应尚未被取走时又发出新请求"。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

use skb::{BufferPool, HeapPool, PktBuf};

use crate::bus::{Bus, BusChannel};
use crate::cdc::{align4, cdc_flags, CdcHeader, BSSCFG_PREFIX, CDC_HEADER_LEN};
use crate::ioctl::{WLC_GET_VAR, WLC_SET_VAR};
use crate::sync::{Os, Semaphore};
use crate::WhdResult;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct StdSemaphore {
    count: Mutex<u32>,
    cv: Condvar,
}

impl StdSemaphore {
    pub fn new(initial: u32) -> Self {
        StdSemaphore {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }
}

impl Semaphore for StdSemaphore {
    fn give(&self) {
        *lock(&self.count) += 1;
        self.cv.notify_one();
    }

    fn take(&self, timeout: Option<Duration>) -> bool {
        let mut count = lock(&self.count);
        let deadline = timeout.map(|t| Instant::now() + t);
        while *count == 0 {
            match deadline {
                None => count = self.cv.wait(count).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    count = match self.cv.wait_timeout(count, deadline - now) {
                        Ok((g, _)) => g,
                        Err(e) => e.into_inner().0,
                    };
                }
            }
        }
        *count -= 1;
        true
    }
}

/// 发出的一帧
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub channel: BusChannel,
    /// 控制帧的 CDC 头
    pub header: Option<CdcHeader>,
    /// CDC 头之后的内容（非控制帧为整帧）
    pub body: Vec<u8>,
}

impl SentFrame {
    pub fn is_iovar(&self) -> bool {
        matches!(self.header, Some(h) if h.cmd == WLC_GET_VAR || h.cmd == WLC_SET_VAR)
    }

    /// IOVAR 名称（含 `bsscfg:` 前缀）
    pub fn iovar_name(&self) -> Option<&str> {
        if !self.is_iovar() {
            return None;
        }
        let end = self.body.iter().position(|&b| b == 0)?;
        core::str::from_utf8(&self.body[..end]).ok()
    }

    /// IOVAR 名称（及 bsscfg 索引）之后的载荷；IOCTL 返回整个 body
    pub fn iovar_payload(&self) -> &[u8] {
        let Some(name) = self.iovar_name() else {
            return &self.body;
        };
        let mut skip = align4(name.len() + 1);
        if name.starts_with(BSSCFG_PREFIX) {
            skip += 4;
        }
        self.body.get(skip..).unwrap_or(&[])
    }

    /// 载荷前 4 字节按小端 u32 解释
    pub fn u32_payload(&self) -> Option<u32> {
        let p = self.iovar_payload();
        p.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// 对请求生成成功响应
pub fn control_reply(req: &CdcHeader, payload: &[u8]) -> Vec<u8> {
    let hdr = CdcHeader {
        cmd: req.cmd,
        len: payload.len() as u32,
        flags: req.flags & !cdc_flags::ERROR,
        status: 0,
    };
    let mut out = alloc::vec![0u8; CDC_HEADER_LEN];
    hdr.write_to(&mut out);
    out.extend_from_slice(payload);
    out
}

/// 对请求生成固件错误响应
pub fn control_error(req: &CdcHeader, status: i32) -> Vec<u8> {
    let hdr = CdcHeader {
        cmd: req.cmd,
        len: 0,
        flags: req.flags | cdc_flags::ERROR,
        status: status as u32,
    };
    let mut out = alloc::vec![0u8; CDC_HEADER_LEN];
    hdr.write_to(&mut out);
    out
}

/// 轮询 `cond` 直至为真或超时
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub type Responder = Box<dyn FnMut(&SentFrame) -> Vec<(BusChannel, Vec<u8>)> + Send>;

pub struct MockPlatform {
    pool: HeapPool,
    start: Instant,
    sent: Mutex<Vec<SentFrame>>,
    rx: Mutex<VecDeque<(BusChannel, Vec<u8>)>>,
    responder: Mutex<Option<Responder>>,
    backplane: Mutex<BTreeMap<u32, u32>>,
    fail_alloc: AtomicBool,
    wakes: AtomicUsize,
    sleeps: AtomicUsize,
    queued_replies: AtomicUsize,
    overlap: AtomicBool,
    released: AtomicUsize,
}

impl MockPlatform {
    /// 默认应答器：对每个控制请求回显其 body
    pub fn new() -> Self {
        MockPlatform {
            pool: HeapPool::default(),
            start: Instant::now(),
            sent: Mutex::new(Vec::new()),
            rx: Mutex::new(VecDeque::new()),
            responder: Mutex::new(None),
            backplane: Mutex::new(BTreeMap::new()),
            fail_alloc: AtomicBool::new(false),
            wakes: AtomicUsize::new(0),
            sleeps: AtomicUsize::new(0),
            queued_replies: AtomicUsize::new(0),
            overlap: AtomicBool::new(false),
            released: AtomicUsize::new(0),
        }
    }

    pub fn set_responder(&self, f: impl FnMut(&SentFrame) -> Vec<(BusChannel, Vec<u8>)> + Send + 'static) {
        *lock(&self.responder) = Some(Box::new(f));
    }

    /// 所有请求均无响应
    pub fn swallow(&self) {
        self.set_responder(|_| Vec::new());
    }

    pub fn inject(&self, channel: BusChannel, frame: Vec<u8>) {
        lock(&self.rx).push_back((channel, frame));
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        lock(&self.sent).clone()
    }

    pub fn clear_sent(&self) {
        lock(&self.sent).clear();
    }

    pub fn set_fail_alloc(&self, fail: bool) {
        self.fail_alloc.store(fail, Ordering::SeqCst);
    }

    pub fn set_backplane(&self, addr: u32, value: u32) {
        lock(&self.backplane).insert(addr, value);
    }

    pub fn wake_count(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }

    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    /// 经 [BufferPool::release] 归还的缓冲数
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn default_reply(frame: &SentFrame) -> Vec<(BusChannel, Vec<u8>)> {
        match frame.header {
            Some(hdr) => alloc::vec![(BusChannel::Control, control_reply(&hdr, &frame.body))],
            None => Vec::new(),
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for MockPlatform {
    fn transmit(&self, channel: BusChannel, pkt: PktBuf) -> WhdResult<()> {
        let data = pkt.data();
        let header = match channel {
            BusChannel::Control => CdcHeader::parse(data),
            _ => None,
        };
        let body = match header {
            Some(_) => data[CDC_HEADER_LEN..].to_vec(),
            None => data.to_vec(),
        };
        let frame = SentFrame { channel, header, body };
        if channel == BusChannel::Control && self.queued_replies.load(Ordering::SeqCst) > 0 {
            self.overlap.store(true, Ordering::SeqCst);
        }
        lock(&self.sent).push(frame.clone());

        let replies = {
            let mut responder = lock(&self.responder);
            match responder.as_mut() {
                Some(f) => f(&frame),
                None => Self::default_reply(&frame),
            }
        };
        let mut rx = lock(&self.rx);
        for (ch, bytes) in replies {
            if ch == BusChannel::Control {
                self.queued_replies.fetch_add(1, Ordering::SeqCst);
            }
            rx.push_back((ch, bytes));
        }
        Ok(())
    }

    fn receive(&self) -> Option<(BusChannel, PktBuf)> {
        let (ch, bytes) = lock(&self.rx).pop_front()?;
        if ch == BusChannel::Control {
            let _ = self
                .queued_replies
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
        Some((ch, PktBuf::from_slice(&bytes, 0)))
    }

    fn read_backplane(&self, addr: u32, _width: u8) -> WhdResult<u32> {
        Ok(lock(&self.backplane).get(&addr).copied().unwrap_or(0))
    }

    fn write_backplane(&self, addr: u32, _width: u8, value: u32) -> WhdResult<()> {
        self.set_backplane(addr, value);
        Ok(())
    }

    fn wake(&self) -> WhdResult<()> {
        self.wakes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn allow_sleep(&self) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

impl Os for MockPlatform {
    type Sem = StdSemaphore;

    fn semaphore(&self, initial: u32) -> StdSemaphore {
        StdSemaphore::new(initial)
    }

    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn delay(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

impl BufferPool for MockPlatform {
    fn acquire(&self, len: usize, headroom: usize) -> Option<PktBuf> {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return None;
        }
        self.pool.acquire(len, headroom)
    }

    fn release(&self, pkt: PktBuf) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.pool.release(pkt);
    }
}
