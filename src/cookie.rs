use crate::state::{DomainState, next_cookie};
use crate::sync::Ordering;

/// An opaque snapshot of a target grace-period generation.
///
/// Obtained from `GraceDomain::get_state` / `start_poll` and checked with
/// `GraceDomain::poll_state`. Cookies are monotonic: once `poll_state`
/// reports a cookie completed, it reports it completed for the rest of the
/// domain's lifetime. Cookie values are even; the `COMPLETED` sentinel is
/// the one odd value, so it can never collide with a real cookie.
///
/// The generation counter is assumed wide enough that wraparound never
/// occurs in practice; comparisons are plain, not wraparound-aware.
///
/// 目标宽限期代的不透明快照。
/// 由 `GraceDomain::get_state` / `start_poll` 获得，用
/// `GraceDomain::poll_state` 检查。cookie 是单调的：一旦 `poll_state` 报告
/// 某个 cookie 已完成，在域的余下生命周期中都会如此报告。cookie 值为偶数；
/// `COMPLETED` 哨兵是唯一的奇数值，因此绝不会与真实 cookie 冲突。
/// 假定代计数器足够宽，实践中永不回绕；比较是普通比较，不考虑回绕。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraceCookie(pub(crate) usize);

impl GraceCookie {
    /// Sentinel cookie that is always reported as already completed.
    ///
    /// Useful as an initial "nothing to wait for" marker in structures that
    /// track their lifetime with cookies.
    ///
    /// 总是被报告为已完成的哨兵 cookie。
    /// 在用 cookie 跟踪生命周期的结构中可用作初始的"无须等待"标记。
    pub const COMPLETED: GraceCookie = GraceCookie(1);

    /// Pure equality on cookie values, for callers that keep cookies in
    /// larger structures and want to avoid duplicate scheduling.
    /// cookie 值的纯相等比较，供把 cookie 存放在更大结构中、
    /// 希望避免重复调度的调用者使用。
    #[inline]
    pub fn same_state(self, other: GraceCookie) -> bool {
        self == other
    }
}

/// Snapshot the generation the next full drain cycle will cover.
/// 快照下一个完整排空周期将覆盖的代。
#[inline]
pub(crate) fn get_state(state: &DomainState) -> GraceCookie {
    GraceCookie(next_cookie(state.generation.load(Ordering::SeqCst)))
}

/// Snapshot, and make sure the engine will eventually reach the snapshot.
/// 快照，并确保引擎最终会到达该快照。
pub(crate) fn start_poll(state: &DomainState) -> GraceCookie {
    let cookie = get_state(state);
    state.request_generation(cookie.0);
    cookie
}

/// Non-blocking completion check for a cookie.
/// 对 cookie 的非阻塞完成检查。
#[inline]
pub(crate) fn poll_state(state: &DomainState, cookie: GraceCookie) -> bool {
    cookie == GraceCookie::COMPLETED || state.generation.load(Ordering::SeqCst) >= cookie.0
}
