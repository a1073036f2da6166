use crate::state::{DomainState, next_cookie};
use crate::sync::Ordering;
use std::collections::{TryReserveError, VecDeque};

/// A deferred callback awaiting a grace period.
///
/// `target` is the even generation value whose completion covers a full
/// grace period measured from the enqueue point. Targets are non-decreasing
/// in queue order because they are computed under the queue lock from a
/// monotonic counter.
///
/// 一个等待宽限期的延迟回调。
/// `target` 是偶数代值，其完成覆盖从入队点起的一个完整宽限期。
/// 由于目标是在队列锁下从单调计数器计算出来的，它们在队列顺序中不减。
pub(crate) struct CallbackEntry {
    pub(crate) target: usize,
    pub(crate) func: Box<dyn FnOnce() + Send + 'static>,
}

/// Error returned when growing the deferred-callback queue fails.
///
/// This is the only recoverable failure in the crate: contract violations
/// are caller bugs, but running out of memory on the enqueue path is
/// surfaced synchronously to the producer.
///
/// 扩展延迟回调队列失败时返回的错误。
/// 这是 crate 中唯一可恢复的失败：合约违规是调用者的 bug，
/// 而入队路径上的内存耗尽会同步呈现给生产者。
#[derive(Debug, thiserror::Error)]
#[error("deferred-callback queue allocation failed")]
pub struct DeferError(#[from] TryReserveError);

/// Append a callback under the queue lock.
///
/// The entry is tagged with the generation that will exist once the next
/// flip after this point has drained, and the requested-generation watermark
/// is raised so the engine leaves Idle. The producer never blocks on the
/// engine and never invokes callbacks itself.
///
/// 在队列锁下追加一个回调。
/// 条目被标记为本点之后下一次翻转排空完成时将存在的代，并提升请求代
/// 水位使引擎离开空闲态。生产者从不阻塞于引擎，也从不自己调用回调。
pub(crate) fn push(
    state: &DomainState,
    func: Box<dyn FnOnce() + Send + 'static>,
) -> Result<(), DeferError> {
    let target;
    {
        let mut queue = state.callbacks.lock();
        queue.try_reserve(1)?;
        // Read the generation while holding the queue lock: the engine
        // splits and flips under the same lock, so an entry either lands
        // before the flip and is covered by that cycle's split, or reads
        // the post-flip generation and targets the next cycle.
        // 在持有队列锁时读取代：引擎在同一把锁下完成拆分与翻转，因此
        // 条目要么落在翻转之前并被该周期的拆分覆盖，要么读到翻转后的代
        // 并以下一个周期为目标。
        target = next_cookie(state.generation.load(Ordering::SeqCst));
        queue.push_back(CallbackEntry { target, func });
    }
    state.request_generation(target);
    Ok(())
}

/// Split off every entry the cycle completing at `completion` will cover.
///
/// Called by the engine with the queue lock held, before the flip. Entries
/// enqueued after the split wait for a later cycle, which is what gives each
/// of them a full grace period.
///
/// 拆分出完成值为 `completion` 的周期将覆盖的所有条目。
/// 由引擎在持有队列锁、翻转之前调用。拆分之后入队的条目等待更晚的周期，
/// 这正是保证每个条目都获得完整宽限期的原因。
pub(crate) fn split_ready(
    queue: &mut VecDeque<CallbackEntry>,
    completion: usize,
) -> Vec<CallbackEntry> {
    let mut ready = Vec::new();
    while let Some(front) = queue.front() {
        if front.target > completion {
            break;
        }
        // Checked front() above.
        ready.push(queue.pop_front().unwrap());
    }
    ready
}
