//! 总线保活计数
//!
//! 需要总线保持时钟的操作期间持有 [AwakeGuard]。计数 0→1 时唤醒总线，1→0 时发出睡眠通知。

use crate::bus::Bus;
use crate::WhdResult;

pub struct KeepAwake {
    count: spin::Mutex<u32>,
}

impl KeepAwake {
    pub const fn new() -> Self {
        KeepAwake {
            count: spin::Mutex::new(0),
        }
    }

    /// 增加一次引用；首个引用唤醒总线，唤醒失败时计数不变
    pub fn hold<'a, B: Bus + ?Sized>(&'a self, bus: &'a B) -> WhdResult<AwakeGuard<'a, B>> {
        let mut count = self.count.lock();
        if *count == 0 {
            bus.wake()?;
        }
        *count += 1;
        Ok(AwakeGuard { awake: self, bus })
    }

    fn release<B: Bus + ?Sized>(&self, bus: &B) {
        let mut count = self.count.lock();
        match *count {
            0 => log::error!(target: "wireless::bsp", "keep-awake release without hold"),
            1 => {
                *count = 0;
                bus.allow_sleep();
            }
            _ => *count -= 1,
        }
    }

    pub fn count(&self) -> u32 {
        *self.count.lock()
    }
}

impl Default for KeepAwake {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AwakeGuard<'a, B: Bus + ?Sized> {
    awake: &'a KeepAwake,
    bus: &'a B,
}

impl<B: Bus + ?Sized> Drop for AwakeGuard<'_, B> {
    fn drop(&mut self) {
        self.awake.release(self.bus);
    }
}
