use crate::domain::GraceDomain;
use crate::reader::ReadGuard;
use crate::sync::{AtomicPtr, Ordering};
use std::marker::PhantomData;

/// A retired allocation en route to the callback queue.
///
/// Carries the raw pointer across the `Send` boundary into the engine task.
/// It has no `Drop` of its own: if the closure holding it is discarded
/// without being invoked (teardown with pending callbacks, a caller bug),
/// the allocation leaks rather than being freed under live readers.
///
/// 一个在送往回调队列途中的已退休分配。
/// 将原始指针跨 `Send` 边界带入引擎任务。它自身没有 `Drop`：若持有它的
/// 闭包未被调用就被丢弃（带着待处理回调销毁域，调用者的 bug），
/// 该分配会泄漏，而不是在存活读者之下被释放。
struct RetiredPtr<T>(*mut T);

// The pointee is owned and only ever dropped by whoever runs the closure.
// 指针所指由闭包的运行者独占拥有并负责 drop。
unsafe impl<T: Send> Send for RetiredPtr<T> {}

impl<T> RetiredPtr<T> {
    /// Execute the deferred destruction.
    /// 执行延迟的销毁。
    fn reclaim(self) {
        // SAFETY: the pointer came from `Box::into_raw` in `replace`, and a
        // full grace period separates the swap from this call, so no reader
        // reference can still be live.
        // SAFETY：该指针来自 `replace` 中的 `Box::into_raw`，且一个完整的
        // 宽限期分隔了交换与本调用，因此不可能仍有存活的读者引用。
        unsafe {
            drop(Box::from_raw(self.0));
        }
    }
}

/// A grace-period-protected shared value.
///
/// `GraceCell<T>` is an atomic pointer that many readers can dereference
/// (via `load()` with a `ReadGuard`) while a writer republishes it with
/// `replace()`; the previous value is handed to the domain's callback queue
/// and dropped only after a full grace period, so no reader ever observes a
/// freed value.
///
/// **Safety contract**:
/// - Readers must hold a `ReadGuard` of the domain that writers of this
///   cell retire through. The guard's lifetime bounds the returned
///   reference, so it cannot escape the section.
/// - Writers must always retire through the same domain for cells read
///   under that domain's guards.
///
/// **Typical usage**:
/// ```
/// use grace_domain::{GraceCell, GraceDomain};
///
/// let domain = GraceDomain::new();
/// let cell = GraceCell::new(1u32);
///
/// // Reader:
/// {
///     let section = domain.enter();
///     assert!(*cell.load(&section) >= 1);
/// }
///
/// // Writer:
/// cell.replace(2, &domain);
/// domain.synchronize();
/// ```
///
/// 受宽限期保护的共享值。
/// `GraceCell<T>` 是一个原子指针：多个读者可以解引用它（通过 `load()` 与
/// `ReadGuard`），同时写者用 `replace()` 重新发布；旧值被交给域的回调
/// 队列，只在一个完整宽限期之后才被 drop，因此读者绝不会看到已释放的值。
pub struct GraceCell<T> {
    ptr: AtomicPtr<T>,
    // Inherit `Send`/`Sync` from `T`, not from the raw pointer.
    // 从 `T` 而非原始指针继承 `Send`/`Sync`。
    _marker: PhantomData<T>,
}

impl<T: Send + 'static> GraceCell<T> {
    /// Create a new protected cell holding `value`.
    /// 创建一个持有 `value` 的新受保护单元。
    #[inline]
    pub fn new(value: T) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(value))),
            _marker: PhantomData,
        }
    }

    /// Reader load: dereference the current value.
    ///
    /// The returned reference is bound to the guard's lifetime, so the
    /// compiler guarantees it cannot outlive the reader section that
    /// protects it.
    ///
    /// 读者 load：解引用当前值。
    /// 返回的引用被绑定到守卫的生命周期，编译器保证它不会活过
    /// 保护它的读者区段。
    #[inline]
    pub fn load<'guard>(&self, _guard: &'guard ReadGuard<'_>) -> &'guard T {
        let ptr = self.ptr.load(Ordering::Acquire);
        // SAFETY: the pointer is never null, and the guard keeps the
        // domain's grace period from completing, which is what gates every
        // deferred drop of a previous value.
        // SAFETY：指针永不为空，且守卫阻止域的宽限期完成，
        // 而宽限期正是所有旧值延迟 drop 的闸门。
        unsafe { &*ptr }
    }

    /// Writer replace: publish a new value and retire the old one through
    /// the domain's callback queue.
    ///
    /// The old value is dropped on the engine task after a full grace
    /// period; the caller does not block. Only if growing the callback
    /// queue fails does the method fall back to a blocking `synchronize`
    /// with an inline drop; a caller that may hold a reader section of
    /// `domain` at replace time must treat that exhaustion case as a
    /// self-deadlock hazard.
    ///
    /// 写者 replace：发布新值，并通过域的回调队列退休旧值。
    /// 旧值在一个完整宽限期之后于引擎任务上被 drop；调用者不阻塞。
    /// 仅当回调队列扩展失败时，该方法才回退为阻塞的 `synchronize` 并
    /// 就地 drop——在 replace 时可能持有 `domain` 读者区段的调用者必须
    /// 把这种耗尽情形视为自死锁风险。
    pub fn replace(&self, value: T, domain: &GraceDomain) {
        let new_ptr = Box::into_raw(Box::new(value));
        let old_ptr = self.ptr.swap(new_ptr, Ordering::AcqRel);
        if old_ptr.is_null() {
            return;
        }

        let retired = RetiredPtr(old_ptr);
        if domain.defer(move || retired.reclaim()).is_err() {
            // The discarded closure does not free anything, so the inline
            // reclaim below is the only drop of `old_ptr`.
            // 被丢弃的闭包不会释放任何东西，下面的就地回收
            // 是 `old_ptr` 的唯一一次 drop。
            domain.synchronize();
            RetiredPtr(old_ptr).reclaim();
        }
    }

    /// Writer replace with a synchronous grace period: publish a new value,
    /// wait out a full grace period, then drop the old value inline.
    ///
    /// Must not be called while the calling thread holds a reader section
    /// of `domain`.
    ///
    /// 带同步宽限期的写者 replace：发布新值，等完一个完整宽限期，
    /// 然后就地 drop 旧值。调用线程持有 `domain` 的读者区段时不得调用。
    pub fn replace_sync(&self, value: T, domain: &GraceDomain) {
        let new_ptr = Box::into_raw(Box::new(value));
        let old_ptr = self.ptr.swap(new_ptr, Ordering::AcqRel);
        if old_ptr.is_null() {
            return;
        }

        domain.synchronize();
        RetiredPtr(old_ptr).reclaim();
    }

    /// Consume the cell and take out the current value.
    ///
    /// Requires the usual drop-time quiescence: no reader may still be able
    /// to reach this cell.
    ///
    /// 消耗单元并取出当前值。要求通常的 drop 时静止状态：
    /// 不得再有读者能够到达此单元。
    pub fn into_inner(self) -> T {
        let ptr = self.ptr.swap(std::ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: the pointer is non-null until consumed, and consuming
        // `self` means no reader can name the cell anymore.
        // SAFETY：指针在被消耗前非空，而消耗 `self` 意味着
        // 读者再也无法指名此单元。
        unsafe { *Box::from_raw(ptr) }
    }
}

impl<T> std::fmt::Debug for GraceCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ptr = self.ptr.load(Ordering::Relaxed);
        f.debug_tuple("GraceCell").field(&ptr).finish()
    }
}

impl<T> Drop for GraceCell<T> {
    /// Drop the final value.
    ///
    /// At drop time no reader can reach the cell anymore, so the last
    /// pointer is taken back directly.
    ///
    /// drop 最终的值。drop 时不再有读者能到达该单元，
    /// 因此直接取回最后的指针。
    #[inline]
    fn drop(&mut self) {
        let ptr = self.ptr.load(Ordering::Relaxed);
        if !ptr.is_null() {
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}
