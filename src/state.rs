use crate::callback::CallbackEntry;
use crate::sync::{AtomicBool, AtomicU8, AtomicUsize, Condvar, Mutex, Ordering};
use std::collections::VecDeque;
use std::time::Duration;

/// Default polling interval for the drain wait while an expedited
/// synchronization is in flight.
/// 当加速同步在进行中时，排空等待的默认轮询间隔。
pub(crate) const DEFAULT_EXPEDITED_POLL: Duration = Duration::from_micros(50);

/// Default re-check interval for the drain wait on NMI-safe domains, where
/// the reader exit path signals without taking the wait-channel lock.
/// NMI 安全域上排空等待的默认重查间隔；该流派的读者退出路径
/// 在不持有等待通道锁的情况下发信号。
pub(crate) const DEFAULT_NMISAFE_POLL: Duration = Duration::from_millis(1);

/// Engine has no drain cycle in progress.
/// 引擎当前没有进行中的排空周期。
pub(crate) const ENGINE_IDLE: u8 = 0;

/// Engine is inside a drain cycle.
/// 引擎处于排空周期之内。
pub(crate) const ENGINE_RUNNING: u8 = 1;

/// No reader has latched a flavor on the domain yet.
/// 尚无读者在该域上锁定流派。
pub(crate) const FLAVOR_UNSET: u8 = 0;

/// Epoch that readers entering at `generation` join.
///
/// The generation counter advances in half-steps: once at the epoch flip and
/// once at drain completion. Bit 0x2 therefore changes exactly at the flip,
/// and the `+ 1` keeps the value stable across the completion step.
///
/// 在 `generation` 时进入的读者所加入的纪元。
/// 代计数器以半步推进：翻转时一次，排空完成时一次。因此位 0x2 恰好在
/// 翻转时改变，而 `+ 1` 使该值在完成步骤之间保持稳定。
#[inline]
pub(crate) fn reader_epoch(generation: usize) -> usize {
    ((generation + 1) & 0x2) >> 1
}

/// Epoch a drain cycle starting at `generation` (pre-flip, even) waits on.
/// 从 `generation`（翻转前，偶数）开始的排空周期所等待的纪元。
#[inline]
pub(crate) fn drain_epoch(generation: usize) -> usize {
    (generation & 0x2) >> 1
}

/// Even cookie value the next full drain cycle after `generation` will reach.
/// `generation` 之后的下一个完整排空周期将达到的偶数 cookie 值。
#[inline]
pub(crate) fn next_cookie(generation: usize) -> usize {
    (generation + 3) & !1
}

/// One per-epoch reader-presence counter.
///
/// Cache-aligned to prevent false sharing between the two epochs.
///
/// 每个纪元一个的读者在场计数器。
/// 缓存对齐以防止两个纪元之间的伪共享。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct EpochCounter {
    pub(crate) count: AtomicUsize,
}

impl EpochCounter {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }
}

/// Shared state of one synchronization domain.
///
/// Shared via `Arc` between the domain handle, every outstanding reader
/// ticket, and the engine task.
///
/// 一个同步域的共享状态。
/// 通过 `Arc` 在域句柄、每个未完成的读者凭据和引擎任务之间共享。
#[repr(align(64))]
pub(crate) struct DomainState {
    /// Reader-presence counters, one per epoch.
    /// 读者在场计数器，每个纪元一个。
    pub(crate) nesting: [EpochCounter; 2],
    /// Monotonic half-step generation counter; even iff no flip outstanding.
    /// 单调的半步代计数器；当且仅当没有未完成的翻转时为偶数。
    pub(crate) generation: AtomicUsize,
    /// Highest generation any outstanding caller has asked to see completed.
    /// 任何未完成调用者请求见到完成的最高代。
    pub(crate) requested: AtomicUsize,
    /// `ENGINE_IDLE` or `ENGINE_RUNNING`; at most one drive loop at a time.
    /// `ENGINE_IDLE` 或 `ENGINE_RUNNING`；同一时刻至多一个驱动循环。
    pub(crate) engine_state: AtomicU8,
    /// True while the engine blocks waiting for the old epoch to empty.
    /// 引擎阻塞等待旧纪元清空期间为真。
    pub(crate) draining: AtomicBool,
    /// Count of in-flight expedited synchronize callers.
    /// 进行中的加速同步调用者数量。
    pub(crate) expedited: AtomicUsize,
    /// Reader flavor latched at first use (`FLAVOR_UNSET` until then).
    /// 首次使用时锁定的读者流派（在此之前为 `FLAVOR_UNSET`）。
    pub(crate) flavor: AtomicU8,
    /// Set by domain teardown to stop the engine thread.
    /// 由域销毁设置，用于停止引擎线程。
    pub(crate) shutdown: AtomicBool,

    /// Deferred callbacks in FIFO order, tagged with their target generation.
    /// 按 FIFO 顺序的延迟回调，标记有目标代。
    pub(crate) callbacks: Mutex<VecDeque<CallbackEntry>>,

    /// Wait channel: the engine blocks here during a drain, and the last
    /// matching reader exit signals it.
    /// 等待通道：引擎在排空期间阻塞于此，最后一个匹配的读者退出发信号。
    pub(crate) drain_lock: Mutex<()>,
    pub(crate) drain_cv: Condvar,

    /// Engine wake point: producers nudge an idle engine out of its sleep.
    /// 引擎唤醒点：生产者把空闲引擎从睡眠中推醒。
    pub(crate) wake_lock: Mutex<()>,
    pub(crate) wake_cv: Condvar,

    /// Completion broadcast: `synchronize` callers block here until their
    /// requested generation is completed.
    /// 完成广播：`synchronize` 调用者阻塞于此，直到其请求的代完成。
    pub(crate) done_lock: Mutex<()>,
    pub(crate) done_cv: Condvar,

    /// Drain polling interval while `expedited > 0`.
    /// `expedited > 0` 期间的排空轮询间隔。
    pub(crate) expedited_poll: Duration,
    /// Drain re-check interval for NMI-safe domains.
    /// NMI 安全域的排空重查间隔。
    pub(crate) nmisafe_poll: Duration,
}

impl DomainState {
    pub(crate) fn new(expedited_poll: Duration, nmisafe_poll: Duration) -> Self {
        Self {
            nesting: [EpochCounter::new(), EpochCounter::new()],
            generation: AtomicUsize::new(0),
            requested: AtomicUsize::new(0),
            engine_state: AtomicU8::new(ENGINE_IDLE),
            draining: AtomicBool::new(false),
            expedited: AtomicUsize::new(0),
            flavor: AtomicU8::new(FLAVOR_UNSET),
            shutdown: AtomicBool::new(false),
            callbacks: Mutex::new(VecDeque::new()),
            drain_lock: Mutex::new(()),
            drain_cv: Condvar::new(),
            wake_lock: Mutex::new(()),
            wake_cv: Condvar::new(),
            done_lock: Mutex::new(()),
            done_cv: Condvar::new(),
            expedited_poll,
            nmisafe_poll,
        }
    }

    /// True if some requested generation has not completed yet.
    /// 如果某个被请求的代尚未完成，则为真。
    #[inline]
    pub(crate) fn work_pending(&self) -> bool {
        self.generation.load(Ordering::SeqCst) < self.requested.load(Ordering::SeqCst)
    }

    /// True if any reader section is currently open on the domain.
    /// 如果该域上当前有任何读者区段打开，则为真。
    #[inline]
    pub(crate) fn readers_present(&self) -> bool {
        self.nesting[0].count.load(Ordering::SeqCst) != 0
            || self.nesting[1].count.load(Ordering::SeqCst) != 0
    }

    /// Raise the requested-generation watermark to at least `cookie` and wake
    /// the engine if this raised it.
    ///
    /// Portable `fetch_max`: a CAS loop, since the loom backend does not model
    /// the native max RMW.
    ///
    /// 将请求代水位提升到至少 `cookie`，如果确实提升了则唤醒引擎。
    /// 可移植的 `fetch_max`：CAS 循环，因为 loom 后端不模拟原生的 max RMW。
    pub(crate) fn request_generation(&self, cookie: usize) {
        let mut current = self.requested.load(Ordering::SeqCst);
        loop {
            if current >= cookie {
                return;
            }
            match self.requested.compare_exchange(
                current,
                cookie,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        // The lock pairs with the engine's predicate re-check, so the wake
        // cannot fall between the engine's check and its park.
        // 该锁与引擎的谓词重查配对，唤醒不会落在引擎检查与停靠之间。
        let _wake = self.wake_lock.lock();
        self.wake_cv.notify_one();
    }
}
