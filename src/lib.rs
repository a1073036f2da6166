//! Sleepable grace-period synchronization domain.
//!
//! A [`GraceDomain`] lets many concurrent readers traverse shared data
//! without blocking, while writers wait for a *grace period* (a point at
//! which every reader that started before the wait was requested has
//! finished) before reclaiming or mutating that data.
//!
//! - Readers: [`GraceDomain::enter`] and friends return a guard for an O(1),
//!   lock-free read-side section; [`GraceDomain::down_read`] returns a
//!   `Send` ticket that may be released on another thread.
//! - Writers: [`GraceDomain::synchronize`] blocks for a full grace period;
//!   [`GraceDomain::defer`] enqueues a callback to run after one;
//!   [`GraceDomain::get_state`] / [`GraceDomain::start_poll`] /
//!   [`GraceDomain::poll_state`] poll for one without blocking.
//! - [`GraceCell`] packages the common read-mostly pointer pattern on top.
//!
//! Internally a dedicated engine task flips the active reader epoch, drains
//! the vacated epoch (blocking on a wait channel that the last reader exit
//! signals), marks the generation completed, and invokes covered callbacks
//! in FIFO order.
//!
//! 可睡眠的宽限期同步域。
//! [`GraceDomain`] 让许多并发读者无阻塞地遍历共享数据，同时写者可以在
//! 回收或修改数据之前等待一个*宽限期*——在该时点，所有先于等待请求开始
//! 的读者都已结束。内部由一个专用引擎任务翻转活跃读者纪元、排空被腾空
//! 的纪元（阻塞在由最后一个读者退出发信号的等待通道上）、标记代完成，
//! 并按 FIFO 顺序调用被覆盖的回调。

mod callback;
mod cell;
mod cookie;
mod domain;
mod engine;
mod reader;
mod state;
mod sync;

pub use callback::DeferError;
pub use cell::GraceCell;
pub use cookie::GraceCookie;
pub use domain::{GraceDomain, GraceDomainBuilder};
pub use reader::{ReadFlavor, ReadGuard, ReadTicket};

#[cfg(test)]
mod tests;
