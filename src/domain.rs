use crate::callback::{self, DeferError};
use crate::cookie::{self, GraceCookie};
use crate::engine;
use crate::reader::{ReadFlavor, ReadGuard, ReadTicket};
use crate::state::{DEFAULT_EXPEDITED_POLL, DEFAULT_NMISAFE_POLL, DomainState};
use crate::sync::{self, Arc, Ordering, thread};
use std::time::Duration;

/// Builder for configuring a `GraceDomain`.
///
/// Use this builder to customize engine behavior:
/// - `expedited_poll_interval`: drain polling interval while an expedited
///   synchronization is in flight
/// - `nmisafe_poll_interval`: drain re-check interval on NMI-safe domains
/// - `background_engine`: whether to spawn the dedicated engine thread
///
/// # Example
/// ```
/// use grace_domain::GraceDomain;
/// use std::time::Duration;
///
/// let domain = GraceDomain::builder()
///     .expedited_poll_interval(Duration::from_micros(20))
///     .build();
/// ```
///
/// 用于配置 `GraceDomain` 的构建器。
pub struct GraceDomainBuilder {
    expedited_poll: Duration,
    nmisafe_poll: Duration,
    background_engine: bool,
}

impl GraceDomainBuilder {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            expedited_poll: DEFAULT_EXPEDITED_POLL,
            nmisafe_poll: DEFAULT_NMISAFE_POLL,
            background_engine: true,
        }
    }

    /// Set the drain polling interval used while any expedited synchronize
    /// caller is in flight.
    ///
    /// Shorter intervals bound grace-period latency tighter at the cost of
    /// spin overhead. Default: 50 µs.
    ///
    /// 设置任何加速同步调用者在途期间使用的排空轮询间隔。
    /// 更短的间隔以自旋开销为代价更紧地限定宽限期延迟。默认：50 微秒。
    #[inline]
    pub fn expedited_poll_interval(mut self, interval: Duration) -> Self {
        self.expedited_poll = interval;
        self
    }

    /// Set the drain re-check interval for NMI-safe domains, whose reader
    /// exit path signals the wait channel without taking its lock.
    ///
    /// Default: 1 ms.
    ///
    /// 设置 NMI 安全域的排空重查间隔；该流派的读者退出路径在不持有
    /// 等待通道锁的情况下发信号。默认：1 毫秒。
    #[inline]
    pub fn nmisafe_poll_interval(mut self, interval: Duration) -> Self {
        self.nmisafe_poll = interval;
        self
    }

    /// Enable or disable the dedicated background engine thread.
    ///
    /// With the engine disabled the owner must drive grace periods by
    /// calling `GraceDomain::drive()` (the single-consumer alternative);
    /// `synchronize` then blocks until some other task drives.
    ///
    /// Default: enabled.
    ///
    /// 启用或禁用专用的后台引擎线程。
    /// 禁用引擎时，所有者必须通过调用 `GraceDomain::drive()`（单消费者
    /// 替代方案）驱动宽限期；此时 `synchronize` 会阻塞，直到其他任务驱动。
    /// 默认：启用。
    #[inline]
    pub fn background_engine(mut self, enabled: bool) -> Self {
        self.background_engine = enabled;
        self
    }

    /// Build the `GraceDomain` with the configured settings.
    /// 使用配置的设置构建 `GraceDomain`。
    pub fn build(self) -> GraceDomain {
        let state = Arc::new(DomainState::new(self.expedited_poll, self.nmisafe_poll));

        let engine = if self.background_engine {
            let engine_state = Arc::clone(&state);
            Some(sync::spawn_engine(move || engine::engine_main(engine_state)))
        } else {
            None
        };

        GraceDomain { state, engine }
    }
}

impl Default for GraceDomainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A sleepable grace-period synchronization domain.
///
/// One domain protects one shared data structure. Readers call `enter` (or a
/// flavor variant) and hold the returned guard across their traversal; they
/// never block and never observe the engine. Writers wait for a grace
/// period with `synchronize`, defer work past one with `defer`, or poll for
/// one with the cookie API.
///
/// The domain is `Sync`: share it by reference or inside an `Arc`. Dropping
/// it requires quiescence: no open reader sections and no pending
/// callbacks. Violating that is a caller bug (debug assertion, logged in
/// release).
///
/// **Typical usage**:
/// ```
/// use grace_domain::GraceDomain;
///
/// let domain = GraceDomain::new();
///
/// // Reader side:
/// {
///     let _section = domain.enter();
///     // traverse the protected structure...
/// }
///
/// // Writer side: unpublish, then wait for all pre-existing readers.
/// domain.synchronize();
/// // reclaim...
/// ```
///
/// 可睡眠的宽限期同步域。
/// 一个域保护一个共享数据结构。读者调用 `enter`（或某个流派变体）并在
/// 遍历期间持有返回的守卫；他们从不阻塞，也从不感知引擎。写者用
/// `synchronize` 等待宽限期，用 `defer` 把工作推迟到宽限期之后，或用
/// cookie API 轮询宽限期。
/// 域是 `Sync` 的：通过引用或 `Arc` 共享。drop 它要求静止状态——没有
/// 打开的读者区段且没有待处理的回调；违反这一点是调用者的 bug
/// （调试断言，发布版记录日志）。
pub struct GraceDomain {
    state: Arc<DomainState>,
    engine: Option<thread::JoinHandle<()>>,
}

impl GraceDomain {
    /// Create a new domain with default settings and a background engine.
    /// 创建一个带有默认设置和后台引擎的新域。
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the domain.
    /// 创建用于配置域的构建器。
    #[inline]
    pub fn builder() -> GraceDomainBuilder {
        GraceDomainBuilder::new()
    }

    /// Enter a read-side section in the ordinary blocking-safe flavor.
    ///
    /// O(1), lock-free, nestable. The section ends when the guard drops, on
    /// this thread. Do not wait on a grace period of this domain while the
    /// guard is alive.
    ///
    /// 以普通的可阻塞流派进入读侧区段。
    /// O(1)、无锁、可嵌套。区段在守卫于本线程 drop 时结束。
    /// 守卫存活期间不要等待本域的宽限期。
    #[inline]
    pub fn enter(&self) -> ReadGuard<'_> {
        ReadGuard::new(&self.state, ReadFlavor::Blocking)
    }

    /// Enter a read-side section in the NMI-safe flavor.
    ///
    /// Enter and exit are async-signal-safe: neither path takes a lock. A
    /// domain used with this flavor may not be used with any other.
    ///
    /// 以 NMI 安全流派进入读侧区段。
    /// 进入和退出都是异步信号安全的：两条路径都不取锁。
    /// 使用此流派的域不得再使用任何其他流派。
    #[inline]
    pub fn enter_nmi_safe(&self) -> ReadGuard<'_> {
        ReadGuard::new(&self.state, ReadFlavor::NmiSafe)
    }

    /// Enter a read-side section in the barrier-free flavor.
    ///
    /// Provided for interface parity with the light-weight reader family of
    /// the original mechanism; with a single process-wide counter pair it
    /// shares the other flavors' ordering. Mutually exclusive with them on
    /// one domain all the same.
    ///
    /// 以无屏障流派进入读侧区段。
    /// 为与原机制的轻量读者族保持接口对等而提供；在单个进程级计数器对上
    /// 与其他流派共享一套内存序。但在同一域上仍与它们互斥。
    #[inline]
    pub fn enter_barrier_free(&self) -> ReadGuard<'_> {
        ReadGuard::new(&self.state, ReadFlavor::BarrierFree)
    }

    /// Begin a semaphore-like read-side registration.
    ///
    /// The returned ticket is `Send` and may be released on a different
    /// thread or task, the way a semaphore permit can. Uses the blocking
    /// flavor; excluded from interrupt-like contexts.
    ///
    /// 开始一次类信号量的读侧注册。
    /// 返回的凭据是 `Send` 的，可以在不同的线程或任务上释放，
    /// 如同信号量许可。使用可阻塞流派；不得用于类中断上下文。
    #[inline]
    pub fn down_read(&self) -> ReadTicket {
        ReadTicket::new(Arc::clone(&self.state))
    }

    /// Block until a full grace period has elapsed.
    ///
    /// On return, every reader section that was entered before this call is
    /// guaranteed to have exited, establishing a happens-before edge between
    /// all such readers and the caller's subsequent code. Concurrent callers
    /// are batched onto as few drain cycles as correctness allows and
    /// released together.
    ///
    /// Must not be called while this thread holds an open reader section of
    /// the same domain (self-deadlock; caller contract).
    ///
    /// 阻塞直到一个完整宽限期结束。
    /// 返回时，保证本调用之前进入的每个读者区段都已退出，在所有这些读者
    /// 与调用者后续代码之间建立 happens-before 边。并发调用者被合并到
    /// 正确性所允许的尽可能少的排空周期上，并一起释放。
    /// 本线程持有同一域的未关闭读者区段时不得调用（自死锁；调用者合约）。
    pub fn synchronize(&self) {
        engine::synchronize(&self.state);
    }

    /// Low-latency `synchronize`: the engine flips without batching delay
    /// and polls the drain with a short interval while this call is in
    /// flight, bounding latency at the cost of spin overhead.
    ///
    /// 低延迟的 `synchronize`：此调用在途期间，引擎不做合并延迟地翻转，
    /// 并以短间隔轮询排空，以自旋开销为代价限定延迟。
    pub fn synchronize_expedited(&self) {
        engine::synchronize_expedited(&self.state);
    }

    /// Defer a callback until a full grace period has elapsed.
    ///
    /// Returns immediately; the engine invokes the callback on its own task
    /// after every reader section that predates this call has exited.
    /// Callbacks run in enqueue order, one at a time. Queue-growth
    /// allocation failure is surfaced as `DeferError` and nothing is
    /// enqueued. A panicking callback is a fatal caller bug.
    ///
    /// 把一个回调推迟到一个完整宽限期之后。
    /// 立即返回；在先于本调用的每个读者区段退出后，引擎在自己的任务上
    /// 调用该回调。回调按入队顺序逐个运行。队列扩展的分配失败以
    /// `DeferError` 呈现，且不会入队。回调 panic 是致命的调用者 bug。
    pub fn defer<F>(&self, func: F) -> Result<(), DeferError>
    where
        F: FnOnce() + Send + 'static,
    {
        callback::push(&self.state, Box::new(func))
    }

    /// Snapshot the grace-period generation the next drain will cover,
    /// without starting one.
    /// 快照下一次排空将覆盖的宽限期代，但不启动排空。
    #[inline]
    pub fn get_state(&self) -> GraceCookie {
        cookie::get_state(&self.state)
    }

    /// Snapshot like `get_state`, and nudge the engine so the snapshot's
    /// generation is eventually reached.
    /// 与 `get_state` 一样快照，并推动引擎使快照的代最终被到达。
    #[inline]
    pub fn start_poll(&self) -> GraceCookie {
        cookie::start_poll(&self.state)
    }

    /// Non-blocking check whether `cookie`'s generation has completed.
    ///
    /// Monotonic: once true for a cookie, true for the rest of the domain's
    /// lifetime. `GraceCookie::COMPLETED` is always reported completed.
    ///
    /// 非阻塞地检查 `cookie` 的代是否已完成。
    /// 单调：对某个 cookie 一旦为真，在域的余下生命周期内恒为真。
    /// `GraceCookie::COMPLETED` 总是被报告为已完成。
    #[inline]
    pub fn poll_state(&self, cookie: GraceCookie) -> bool {
        cookie::poll_state(&self.state, cookie)
    }

    /// Debug hook: might the calling context be inside a reader section of
    /// this domain?
    ///
    /// Best-effort and conservative: true whenever any reader section is
    /// open on the domain, without attributing it to the calling thread.
    /// Meant for collaborators' assertions, not for control flow.
    ///
    /// 调试钩子：调用上下文是否可能处于本域的读者区段内？
    /// 尽力而为且保守：只要域上有任何读者区段打开即为真，不会把它归属
    /// 到调用线程。用于协作者的断言，而非控制流。
    #[inline]
    pub fn read_section_held(&self) -> bool {
        self.state.readers_present()
    }

    /// Drive pending grace periods on the calling task.
    ///
    /// The single-consumer alternative to the background engine: with
    /// `background_engine(false)` the owner calls this to run the flip/
    /// drain/invoke cycles, blocking while readers remain in a drained
    /// epoch. If a drive is already running (here or on the background
    /// engine) the call returns immediately and the running cycle absorbs
    /// the work.
    ///
    /// 在调用任务上驱动待处理的宽限期。
    /// 后台引擎的单消费者替代：在 `background_engine(false)` 下，所有者
    /// 调用它来运行翻转/排空/调用周期，在被排空纪元仍有读者时阻塞。
    /// 若驱动已在运行（这里或后台引擎上），调用立即返回，
    /// 运行中的周期会吸收这些工作。
    pub fn drive(&self) {
        engine::drive(&self.state);
    }
}

impl Default for GraceDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GraceDomain {
    /// Tear the domain down.
    ///
    /// Requires quiescence: no open reader sections, no pending callbacks.
    /// Violations are caller bugs, flagged in debug builds and logged in
    /// release; pending callbacks found here are dropped uninvoked.
    ///
    /// 销毁域。
    /// 要求静止状态：没有打开的读者区段，没有待处理的回调。违规是
    /// 调用者的 bug——调试版标记，发布版记录日志；在此发现的待处理
    /// 回调会被不经调用地丢弃。
    fn drop(&mut self) {
        let pending = self.state.callbacks.lock().len();
        if pending != 0 {
            log::warn!("destroying a grace domain with {pending} pending callbacks");
        }
        if self.state.readers_present() {
            log::warn!("destroying a grace domain with active readers");
        }
        debug_assert!(
            pending == 0,
            "BUG: destroying a synchronization domain with pending callbacks"
        );
        debug_assert!(
            !self.state.readers_present(),
            "BUG: destroying a synchronization domain with active readers"
        );

        self.state.shutdown.store(true, Ordering::SeqCst);
        {
            let _wake = self.state.wake_lock.lock();
            self.state.wake_cv.notify_all();
        }
        if let Some(engine) = self.engine.take() {
            let _ = engine.join();
        }
    }
}

impl std::fmt::Debug for GraceDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraceDomain")
            .field("generation", &self.state.generation.load(Ordering::Relaxed))
            .field("requested", &self.state.requested.load(Ordering::Relaxed))
            .field(
                "nesting",
                &[
                    self.state.nesting[0].count.load(Ordering::Relaxed),
                    self.state.nesting[1].count.load(Ordering::Relaxed),
                ],
            )
            .finish()
    }
}

// Reader tickets and the engine share the state across threads; the facade
// itself is freely shareable.
// 读者凭据与引擎跨线程共享状态；门面本身可自由共享。
#[cfg(not(feature = "loom"))]
#[allow(dead_code)]
fn assert_domain_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<GraceDomain>();
}
