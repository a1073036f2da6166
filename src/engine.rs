use crate::callback;
use crate::cookie::{self, GraceCookie};
use crate::reader::ReadFlavor;
use crate::state::{DomainState, ENGINE_IDLE, ENGINE_RUNNING, drain_epoch};
use crate::sync::{Arc, Ordering};

/// Main loop of the background engine thread.
///
/// Parks on the wake channel while Idle; producers (`defer`, `start_poll`,
/// `synchronize`) nudge it whenever they raise the requested-generation
/// watermark. Exits when the domain signals shutdown.
///
/// 后台引擎线程的主循环。
/// 空闲时停靠在唤醒通道上；生产者（`defer`、`start_poll`、`synchronize`）
/// 在提升请求代水位时推醒它。域发出关闭信号时退出。
pub(crate) fn engine_main(state: Arc<DomainState>) {
    loop {
        {
            let mut idle = state.wake_lock.lock();
            loop {
                if state.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                // Sleep through foreign drives too: a manual driver that
                // goes Idle with work left always takes the cycle back
                // itself, so there is nothing to poll for here.
                // 连外部驱动也一并睡过去：手动驱动者在尚有工作时转入
                // Idle 后总会自己夺回周期，这里没有什么可轮询的。
                if state.work_pending()
                    && state.engine_state.load(Ordering::SeqCst) == ENGINE_IDLE
                {
                    break;
                }
                idle = state.wake_cv.wait(idle);
            }
        }
        drive(&state);
    }
}

/// Run drain cycles until every requested generation has completed.
///
/// At most one driver owns the cycle at a time (Idle→Running CAS); a
/// concurrent call returns immediately and its work is absorbed by the
/// running driver's loop-back. After releasing Running the driver re-checks
/// for requests that raced the transition and takes the cycle back, so no
/// request is stranded between the final check and the Idle store.
///
/// 运行排空周期，直到所有被请求的代都已完成。
/// 同一时刻至多一个驱动者拥有周期（Idle→Running CAS）；并发调用立即返回，
/// 其工作被正在运行的驱动者的回环吸收。释放 Running 之后，驱动者重查
/// 与状态转换竞争的请求并夺回周期，因此没有请求会被滞留在最终检查与
/// Idle 存储之间。
pub(crate) fn drive(state: &DomainState) {
    loop {
        if state
            .engine_state
            .compare_exchange(ENGINE_IDLE, ENGINE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        run_cycles(state);

        state.engine_state.store(ENGINE_IDLE, Ordering::SeqCst);
        if !state.work_pending() {
            return;
        }
    }
}

/// The flip → drain → complete → invoke cycle, looped until no backlog.
/// 翻转 → 排空 → 完成 → 调用 的周期，循环直至没有积压。
fn run_cycles(state: &DomainState) {
    loop {
        let generation = state.generation.load(Ordering::SeqCst);
        if generation >= state.requested.load(Ordering::SeqCst) {
            return;
        }
        let completion = generation + 2;
        let epoch = drain_epoch(generation);

        // Snapshot the callbacks this cycle covers and flip the active
        // epoch under the same queue-lock hold. A producer that missed the
        // split therefore reads the post-flip generation and tags the next
        // cycle, so no entry is left queued with an already-satisfied
        // target. Readers that race the flip re-validate and rejoin; they
        // never touch the queue lock.
        // 在同一次队列锁持有期间快照本周期覆盖的回调并翻转活跃纪元。
        // 错过拆分的生产者因此会读到翻转后的代并标记下一个周期，
        // 不会有条目带着已被满足的目标滞留在队列里。与翻转竞争的读者
        // 会重新验证并重新加入；他们从不触碰队列锁。
        let ready = {
            let mut queue = state.callbacks.lock();
            let ready = callback::split_ready(&mut queue, completion);
            state.generation.store(generation + 1, Ordering::SeqCst);
            ready
        };

        // Drain: block until the vacated epoch has no reader left. The last
        // matching exit signals the wait channel; expedited waiters and
        // NMI-safe domains bound the wait with a short re-check interval.
        // 排空：阻塞直到被腾空的纪元没有剩余读者。最后一个匹配的退出向
        // 等待通道发信号；加速等待者与 NMI 安全域用短重查间隔限定等待。
        state.draining.store(true, Ordering::SeqCst);
        {
            let mut channel = state.drain_lock.lock();
            while state.nesting[epoch].count.load(Ordering::SeqCst) != 0 {
                if state.expedited.load(Ordering::SeqCst) > 0 {
                    let (next, _) = state
                        .drain_cv
                        .wait_timeout(channel, state.expedited_poll);
                    channel = next;
                } else if state.flavor.load(Ordering::SeqCst) == ReadFlavor::NmiSafe as u8 {
                    let (next, _) = state.drain_cv.wait_timeout(channel, state.nmisafe_poll);
                    channel = next;
                } else {
                    channel = state.drain_cv.wait(channel);
                }
            }
        }
        state.draining.store(false, Ordering::SeqCst);

        // Mark the generation completed and release everyone it satisfies.
        // The empty critical section pairs with the waiters' re-check, so
        // the broadcast cannot fall between their check and their park.
        // 标记该代完成并释放它满足的所有等待者。空临界区与等待者的重查
        // 配对，广播不会落在他们的检查与停靠之间。
        state.generation.store(completion, Ordering::SeqCst);
        {
            let _done = state.done_lock.lock();
        }
        state.done_cv.notify_all();

        // Invoke the covered callbacks in FIFO order, one at a time, on
        // this task only. A panicking callback is a fatal caller bug; it
        // unwinds the engine and forfeits the domain's liveness.
        // 按 FIFO 顺序逐个在本任务上调用被覆盖的回调。回调 panic 是致命的
        // 调用者 bug；它会展开引擎并放弃该域的活性。
        for entry in ready {
            (entry.func)();
        }
    }
}

/// Block until a full grace period has elapsed.
///
/// Never returns before every reader that entered before the call has
/// exited. Must not be called while the calling thread holds an open reader
/// registration on the same domain (self-deadlock; caller contract).
///
/// 阻塞直到一个完整宽限期结束。
/// 绝不会在本调用之前进入的每个读者都退出之前返回。调用线程在同一域上
/// 持有未关闭的读者注册时不得调用（自死锁；调用者合约）。
pub(crate) fn synchronize(state: &DomainState) {
    let cookie = cookie::start_poll(state);
    wait_for(state, cookie);
}

/// Low-latency variant: while this caller is in flight the engine polls the
/// drain wait with a short interval instead of an unbounded sleep.
/// 低延迟变体：此调用者在途期间，引擎以短间隔轮询排空等待，
/// 而不是无限期睡眠。
pub(crate) fn synchronize_expedited(state: &DomainState) {
    state.expedited.fetch_add(1, Ordering::SeqCst);

    // A drain already parked in an unbounded wait has to notice the switch.
    // 已停靠在无限期等待中的排空必须注意到这次切换。
    {
        let _channel = state.drain_lock.lock();
        state.drain_cv.notify_all();
    }

    let cookie = cookie::start_poll(state);
    wait_for(state, cookie);

    state.expedited.fetch_sub(1, Ordering::SeqCst);
}

/// Park the caller until the engine completes `cookie`'s generation.
/// 停靠调用者，直到引擎完成 `cookie` 的代。
pub(crate) fn wait_for(state: &DomainState, cookie: GraceCookie) {
    let mut done = state.done_lock.lock();
    while !cookie::poll_state(state, cookie) {
        done = state.done_cv.wait(done);
    }
}
