//! OS 同步原语协作者
//!
//! - **[Semaphore]**：带超时的计数信号量，由平台实现
//! - **[Os]**：创建信号量、单调时钟、延时
//! - **[SemLock]**：以初值为 1 的信号量实现的阻塞互斥锁（传输锁），与自旋锁不同，等待方会让出 CPU

use core::time::Duration;

pub trait Semaphore: Send + Sync + 'static {
    fn give(&self);

    /// 获取一个计数；`None` 表示无限等待。超时返回 false
    fn take(&self, timeout: Option<Duration>) -> bool;
}

pub trait Os: Send + Sync {
    type Sem: Semaphore;

    fn semaphore(&self, initial: u32) -> Self::Sem;

    /// 单调时钟
    fn now(&self) -> Duration;

    fn delay(&self, dur: Duration);
}

/// 阻塞互斥锁
pub struct SemLock<S: Semaphore> {
    sem: S,
}

impl<S: Semaphore> SemLock<S> {
    /// `sem` 须以计数 1 创建
    pub fn new(sem: S) -> Self {
        SemLock { sem }
    }

    pub fn lock(&self) -> SemLockGuard<'_, S> {
        while !self.sem.take(None) {}
        SemLockGuard { sem: &self.sem }
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Option<SemLockGuard<'_, S>> {
        if self.sem.take(Some(timeout)) {
            Some(SemLockGuard { sem: &self.sem })
        } else {
            None
        }
    }
}

pub struct SemLockGuard<'a, S: Semaphore> {
    sem: &'a S,
}

impl<S: Semaphore> Drop for SemLockGuard<'_, S> {
    fn drop(&mut self) {
        self.sem.give();
    }
}

/// 取走信号量上残留的计数（上一次超时后迟到的 give）
pub fn drain<S: Semaphore>(sem: &S) -> usize {
    let mut n = 0;
    while sem.take(Some(Duration::ZERO)) {
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StdSemaphore;

    #[test]
    fn lock_released_on_drop() {
        let lock = SemLock::new(StdSemaphore::new(1));
        let g = lock.lock();
        assert!(lock.try_lock_for(Duration::from_millis(5)).is_none());
        drop(g);
        assert!(lock.try_lock_for(Duration::from_millis(5)).is_some());
    }

    #[test]
    fn drain_counts_stale_tokens() {
        let sem = StdSemaphore::new(0);
        sem.give();
        sem.give();
        assert_eq!(drain(&sem), 2);
        assert!(!sem.take(Some(Duration::ZERO)));
    }
}
