//! 单元测试树
//! 按主题拆分：基础、并发、边界情况、生命周期

mod basic_tests;
mod concurrent_tests;

use std::time::Duration;

/// 轮询等待一个条件成立，最多约两秒
/// 用于等待引擎线程完成一次排空周期
pub(crate) fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..2000 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}
