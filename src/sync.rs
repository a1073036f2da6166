use std::time::Duration;

#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};

#[cfg(feature = "loom")]
pub use loom::sync::Arc;
#[cfg(not(feature = "loom"))]
pub use std::sync::Arc;

#[cfg(feature = "loom")]
pub use loom::thread;
#[cfg(not(feature = "loom"))]
pub use std::thread;

#[cfg(not(feature = "loom"))]
pub use antidote::{Mutex, MutexGuard};

#[cfg(feature = "loom")]
pub use loom::sync::MutexGuard;

#[cfg(feature = "loom")]
#[derive(Debug, Default)]
pub struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> Mutex<T> {
    pub fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }
}

/// Condition variable with a single return shape for both backends.
///
/// `wait_timeout` reports whether the wait timed out as a plain `bool` so the
/// engine does not have to juggle two `WaitTimeoutResult` types. Under loom
/// there is no model of real time, so `wait_timeout` degenerates to `wait`;
/// loom tests must therefore only exercise the event-driven paths.
///
/// 对两种后端具有同一返回形状的条件变量。
/// `wait_timeout` 以普通 `bool` 报告是否超时，这样引擎就不必同时处理两种
/// `WaitTimeoutResult` 类型。在 loom 下没有真实时间的模型，因此
/// `wait_timeout` 退化为 `wait`；loom 测试只能走事件驱动的路径。
#[cfg(not(feature = "loom"))]
pub struct Condvar(antidote::Condvar);

#[cfg(not(feature = "loom"))]
impl Condvar {
    pub fn new() -> Self {
        Self(antidote::Condvar::new())
    }

    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.0.wait(guard)
    }

    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> (MutexGuard<'a, T>, bool) {
        let (guard, result) = self.0.wait_timeout(guard, timeout);
        (guard, result.timed_out())
    }

    pub fn notify_one(&self) {
        self.0.notify_one()
    }

    pub fn notify_all(&self) {
        self.0.notify_all()
    }
}

#[cfg(feature = "loom")]
pub struct Condvar(loom::sync::Condvar);

#[cfg(feature = "loom")]
impl Condvar {
    pub fn new() -> Self {
        Self(loom::sync::Condvar::new())
    }

    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.0.wait(guard).unwrap()
    }

    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        _timeout: Duration,
    ) -> (MutexGuard<'a, T>, bool) {
        (self.0.wait(guard).unwrap(), false)
    }

    pub fn notify_one(&self) {
        self.0.notify_one()
    }

    pub fn notify_all(&self) {
        self.0.notify_all()
    }
}

/// Spawn the engine thread for a domain.
/// 为一个域生成引擎线程。
#[cfg(not(feature = "loom"))]
pub fn spawn_engine<F>(f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name("grace-engine".to_owned())
        .spawn(f)
        .expect("failed to spawn grace engine thread")
}

#[cfg(feature = "loom")]
pub fn spawn_engine<F>(f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(f)
}
