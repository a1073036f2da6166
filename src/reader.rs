use crate::state::{DomainState, FLAVOR_UNSET, reader_epoch};
use crate::sync::{Arc, Ordering};
use std::marker::PhantomData;

/// The enter/exit discipline a domain is locked into after first use.
///
/// The three flavors are mutually exclusive on one domain: the first reader
/// registration latches the flavor, and a later call with a different flavor
/// is a contract violation (debug assertion, logged in release).
///
/// - `Blocking`: the ordinary flavor; readers may block inside the section.
/// - `NmiSafe`: enter and exit are async-signal-safe (no lock is ever taken
///   on their paths); the engine compensates with a bounded drain re-check.
/// - `BarrierFree`: the light-weight flavor of the original interface. With
///   a single process-wide counter pair it shares the other flavors'
///   ordering, so the distinction here is purely contractual.
///
/// 域在首次使用后锁定的进入/退出纪律。
/// 三种流派在一个域上互斥：第一次读者注册锁定流派，之后使用不同流派的
/// 调用是合约违规（调试断言，发布版记录日志）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadFlavor {
    /// Ordinary blocking-safe readers.
    /// 普通的可阻塞读者。
    Blocking = 1,
    /// Async-signal-safe readers (interrupt-like contexts).
    /// 异步信号安全的读者（类中断上下文）。
    NmiSafe = 2,
    /// Light-weight readers of the barrier-free interface family.
    /// 无屏障接口族的轻量读者。
    BarrierFree = 3,
}

impl ReadFlavor {
    pub(crate) fn from_raw(raw: u8) -> Option<ReadFlavor> {
        match raw {
            1 => Some(ReadFlavor::Blocking),
            2 => Some(ReadFlavor::NmiSafe),
            3 => Some(ReadFlavor::BarrierFree),
            _ => None,
        }
    }
}

/// Latch the domain's flavor on first use and flag mixing afterwards.
///
/// The common case is a plain load of an already-latched flavor; only the
/// very first registration pays for the CAS.
///
/// 在首次使用时锁定域的流派，之后对混用进行标记。
/// 常见情形只是对已锁定流派的一次普通加载；只有最初的注册付出 CAS 代价。
pub(crate) fn check_flavor(state: &DomainState, flavor: ReadFlavor) {
    let wanted = flavor as u8;
    let current = state.flavor.load(Ordering::SeqCst);
    if current == wanted {
        return;
    }

    let latched = if current == FLAVOR_UNSET {
        match state
            .flavor
            .compare_exchange(FLAVOR_UNSET, wanted, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return,
            Err(actual) => actual,
        }
    } else {
        current
    };

    if latched != wanted {
        log::error!(
            "reader flavor mismatch: domain is latched to {:?}, caller used {:?}",
            ReadFlavor::from_raw(latched),
            flavor,
        );
        debug_assert!(
            false,
            "BUG: mixing reader flavors on one synchronization domain"
        );
    }
}

/// Join the currently active epoch and return its index.
///
/// Lock-free and O(1). The counter increment is published before the epoch
/// is re-read; in the SeqCst total order, if the re-read still sees our
/// epoch as active then any later flip's drain scan must observe the
/// increment, so the drain cannot miss this reader. If the epoch flipped
/// underneath us we roll the increment back (performing the normal exit
/// wake check, since the rollback may be the drain's last exit) and retry
/// against the new epoch.
///
/// 加入当前活跃纪元并返回其索引。
/// 无锁且 O(1)。计数器递增在重读纪元之前发布；在 SeqCst 全序中，若重读
/// 仍见到我们的纪元处于活跃，则之后任何翻转的排空扫描必然观察到该递增，
/// 排空不会漏掉这个读者。若纪元在我们脚下翻转，则回滚递增（执行普通的
/// 退出唤醒检查，因为回滚可能正是排空等待的最后一次退出）并对新纪元重试。
pub(crate) fn enter(state: &DomainState, flavor: ReadFlavor) -> usize {
    check_flavor(state, flavor);
    loop {
        let generation = state.generation.load(Ordering::SeqCst);
        let epoch = reader_epoch(generation);
        state.nesting[epoch].count.fetch_add(1, Ordering::SeqCst);

        if reader_epoch(state.generation.load(Ordering::SeqCst)) == epoch {
            return epoch;
        }

        // Lost the race against a flip; undo and rejoin.
        // 输给了一次翻转；撤销并重新加入。
        exit(state, epoch, flavor);
    }
}

/// Leave the epoch joined by the matching `enter`.
///
/// If this was the last reader of an epoch the engine is draining, signal
/// the wait channel. The Blocking and BarrierFree flavors take the channel
/// lock for the signal so the wakeup cannot fall between the engine's
/// counter check and its park. The NmiSafe flavor must stay async-signal-
/// safe and may not touch the channel at all; its drains are picked up by
/// the engine's bounded re-check instead.
///
/// 离开由匹配的 `enter` 加入的纪元。
/// 若这是引擎正在排空的纪元的最后一个读者，则向等待通道发信号。Blocking
/// 与 BarrierFree 流派在发信号时持有通道锁，使唤醒不会落在引擎的计数器
/// 检查与停靠之间。NmiSafe 流派必须保持异步信号安全，完全不得触碰该
/// 通道；其排空改由引擎的有界重查接手。
pub(crate) fn exit(state: &DomainState, epoch: usize, flavor: ReadFlavor) {
    let previous = state.nesting[epoch].count.fetch_sub(1, Ordering::SeqCst);
    debug_assert!(
        previous > 0,
        "BUG: reader exit without a matching enter (nesting imbalance)"
    );

    if previous == 1
        && flavor != ReadFlavor::NmiSafe
        && state.draining.load(Ordering::SeqCst)
    {
        let _channel = state.drain_lock.lock();
        state.drain_cv.notify_one();
    }
}

/// A strictly paired reader section.
///
/// Obtained from `GraceDomain::enter` and friends; the section ends when the
/// guard is dropped, on the same thread that opened it. Sections may be
/// nested freely. While any guard for an epoch exists, no grace period
/// covering that epoch can complete.
///
/// It is illegal to call anything that waits on a grace period of the same
/// domain while holding a guard (self-deadlock; caller contract).
///
/// 严格配对的读者区段。
/// 从 `GraceDomain::enter` 及同族方法获得；区段在守卫被 drop 时结束，
/// 且必须在打开它的线程上。区段可以自由嵌套。只要某纪元的守卫存在，
/// 覆盖该纪元的宽限期就不会完成。
/// 在持有守卫时调用任何等待同一域宽限期的操作都是非法的
/// （自死锁；调用者合约）。
#[must_use]
pub struct ReadGuard<'a> {
    state: &'a DomainState,
    epoch: usize,
    flavor: ReadFlavor,
    // Strictly paired: exit must happen on the entering thread.
    // 严格配对：退出必须发生在进入的线程上。
    _not_send: PhantomData<*const ()>,
}

impl<'a> ReadGuard<'a> {
    pub(crate) fn new(state: &'a DomainState, flavor: ReadFlavor) -> Self {
        let epoch = enter(state, flavor);
        ReadGuard {
            state,
            epoch,
            flavor,
            _not_send: PhantomData,
        }
    }

    /// Index of the epoch this section is counted in.
    /// 该区段计入的纪元索引。
    #[inline]
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl<'a> Drop for ReadGuard<'a> {
    #[inline]
    fn drop(&mut self) {
        exit(self.state, self.epoch, self.flavor);
    }
}

impl<'a> std::fmt::Debug for ReadGuard<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadGuard")
            .field("epoch", &self.epoch)
            .field("flavor", &self.flavor)
            .finish()
    }
}

/// A semaphore-like reader registration.
///
/// Obtained from `GraceDomain::down_read`. Unlike `ReadGuard`, the ticket is
/// `Send`: it may be handed to another thread or task and released there,
/// the way a semaphore permit can. It may not be used from interrupt-like
/// contexts. The ticket holds the domain state alive, so releasing it after
/// the domain handle is gone is memory-safe (though destroying a domain with
/// tickets outstanding is still a caller bug).
///
/// 类信号量的读者注册。
/// 从 `GraceDomain::down_read` 获得。与 `ReadGuard` 不同，凭据是 `Send` 的：
/// 可以交给另一个线程或任务并在那里释放，就像信号量许可一样。不得在类
/// 中断上下文中使用。凭据保持域状态存活，因此在域句柄消失后释放它是
/// 内存安全的（尽管在凭据未清时销毁域仍然是调用者的 bug）。
#[must_use]
pub struct ReadTicket {
    state: Arc<DomainState>,
    epoch: usize,
}

impl ReadTicket {
    pub(crate) fn new(state: Arc<DomainState>) -> Self {
        let epoch = enter(&state, ReadFlavor::Blocking);
        ReadTicket { state, epoch }
    }

    /// Index of the epoch this registration is counted in.
    /// 该注册计入的纪元索引。
    #[inline]
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Explicitly end the read-side registration (same as dropping).
    /// 显式结束读侧注册（与 drop 等价）。
    #[inline]
    pub fn release(self) {}
}

impl Drop for ReadTicket {
    #[inline]
    fn drop(&mut self) {
        exit(&self.state, self.epoch, ReadFlavor::Blocking);
    }
}

impl std::fmt::Debug for ReadTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTicket")
            .field("epoch", &self.epoch)
            .finish()
    }
}
