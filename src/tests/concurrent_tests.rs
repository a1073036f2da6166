//! 并发测试模块
//! 测试宽限期排序、并发读者与并发等待者

use crate::tests::eventually;
use crate::{GraceCell, GraceDomain};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// 测试1: synchronize 在活跃读者退出前不得返回（场景1）
#[test]
fn test_synchronize_waits_for_active_reader() {
    let domain = Arc::new(GraceDomain::new());
    let entered = Arc::new(AtomicBool::new(false));
    let exited = Arc::new(AtomicBool::new(false));

    let reader = {
        let domain = Arc::clone(&domain);
        let entered = Arc::clone(&entered);
        let exited = Arc::clone(&exited);
        thread::spawn(move || {
            let guard = domain.enter();
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            // 在退出之前设置标志：synchronize 返回蕴含它可见
            exited.store(true, Ordering::SeqCst);
            drop(guard);
        })
    };

    while !entered.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    domain.synchronize();
    assert!(exited.load(Ordering::SeqCst));

    reader.join().unwrap();
}

/// 测试2: 加速 synchronize 同样等待活跃读者
#[test]
fn test_synchronize_expedited_waits_for_active_reader() {
    let domain = Arc::new(GraceDomain::new());
    let entered = Arc::new(AtomicBool::new(false));
    let exited = Arc::new(AtomicBool::new(false));

    let reader = {
        let domain = Arc::clone(&domain);
        let entered = Arc::clone(&entered);
        let exited = Arc::clone(&exited);
        thread::spawn(move || {
            let guard = domain.enter();
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            exited.store(true, Ordering::SeqCst);
            drop(guard);
        })
    };

    while !entered.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    domain.synchronize_expedited();
    assert!(exited.load(Ordering::SeqCst));

    reader.join().unwrap();
}

/// 测试3: NMI 安全流派下的宽限期排序
#[test]
fn test_synchronize_with_nmi_safe_readers() {
    let domain = Arc::new(GraceDomain::new());
    let entered = Arc::new(AtomicBool::new(false));
    let exited = Arc::new(AtomicBool::new(false));

    let reader = {
        let domain = Arc::clone(&domain);
        let entered = Arc::clone(&entered);
        let exited = Arc::clone(&exited);
        thread::spawn(move || {
            let guard = domain.enter_nmi_safe();
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            exited.store(true, Ordering::SeqCst);
            drop(guard);
        })
    };

    while !entered.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    // 该流派的退出不持锁发信号；引擎用有界重查兜底
    domain.synchronize();
    assert!(exited.load(Ordering::SeqCst));

    reader.join().unwrap();
}

/// 测试4: 多个 synchronize 等待者被一起释放
#[test]
fn test_concurrent_synchronize_callers_batched() {
    let domain = Arc::new(GraceDomain::new());
    let entered = Arc::new(AtomicBool::new(false));
    let exited = Arc::new(AtomicBool::new(false));

    let reader = {
        let domain = Arc::clone(&domain);
        let entered = Arc::clone(&entered);
        let exited = Arc::clone(&exited);
        thread::spawn(move || {
            let guard = domain.enter();
            entered.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            exited.store(true, Ordering::SeqCst);
            drop(guard);
        })
    };

    while !entered.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    let mut waiters = vec![];
    for _ in 0..4 {
        let domain = Arc::clone(&domain);
        let exited = Arc::clone(&exited);
        waiters.push(thread::spawn(move || {
            domain.synchronize();
            assert!(exited.load(Ordering::SeqCst));
        }));
    }

    for waiter in waiters {
        waiter.join().unwrap();
    }
    reader.join().unwrap();
}

/// 测试5: 读者持续进出时 synchronize 依然前进（无饥饿）
#[test]
fn test_synchronize_progresses_under_reader_churn() {
    let domain = Arc::new(GraceDomain::new());
    let stop = Arc::new(AtomicBool::new(false));

    let mut readers = vec![];
    for _ in 0..4 {
        let domain = Arc::clone(&domain);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let _guard = domain.enter();
                thread::yield_now();
            }
        }));
    }

    for _ in 0..10 {
        domain.synchronize();
    }

    stop.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(!domain.read_section_held());
}

/// 测试6: 并发生产者下回调保持入队顺序（每个生产者内部 FIFO）
#[test]
fn test_callback_fifo_per_producer() {
    let domain = Arc::new(GraceDomain::new());
    let invoked = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut producers = vec![];
    for producer in 0..2usize {
        let domain = Arc::clone(&domain);
        let invoked = Arc::clone(&invoked);
        producers.push(thread::spawn(move || {
            for sequence in 0..50usize {
                let invoked = Arc::clone(&invoked);
                domain
                    .defer(move || invoked.lock().unwrap().push((producer, sequence)))
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(eventually(|| invoked.lock().unwrap().len() == 100));

    // 全局顺序是两个生产者的交错，但每个生产者自己的序号必须递增
    let invoked = invoked.lock().unwrap();
    for producer in 0..2usize {
        let sequences: Vec<usize> = invoked
            .iter()
            .filter(|(who, _)| *who == producer)
            .map(|(_, sequence)| *sequence)
            .collect();
        assert_eq!(sequences, (0..50).collect::<Vec<_>>());
    }
}

/// 测试7: 凭据在另一个线程释放后宽限期才结束
#[test]
fn test_grace_period_spans_ticket_handoff() {
    let domain = Arc::new(GraceDomain::new());
    let released = Arc::new(AtomicBool::new(false));

    let ticket = domain.down_read();
    let holder = {
        let released = Arc::clone(&released);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            released.store(true, Ordering::SeqCst);
            ticket.release();
        })
    };

    domain.synchronize();
    assert!(released.load(Ordering::SeqCst));

    holder.join().unwrap();
}

/// 记录 drop 次数的负载，用于验证延迟回收恰好发生一次
struct DropTally(Arc<AtomicUsize>);

impl Drop for DropTally {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// 测试8: 并发读者之下 GraceCell 的延迟回收安全且恰好一次
#[test]
fn test_cell_concurrent_readers_and_replaces() {
    let domain = Arc::new(GraceDomain::new());
    let drops = Arc::new(AtomicUsize::new(0));
    let cell = Arc::new(GraceCell::new((0u64, DropTally(Arc::clone(&drops)))));
    let stop = Arc::new(AtomicBool::new(false));

    let mut readers = vec![];
    for _ in 0..3 {
        let domain = Arc::clone(&domain);
        let cell = Arc::clone(&cell);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                let guard = domain.enter();
                let (value, _) = cell.load(&guard);
                assert!(*value <= 8);
                drop(guard);
                thread::yield_now();
            }
        }));
    }

    for version in 1..=8u64 {
        cell.replace((version, DropTally(Arc::clone(&drops))), &domain);
    }

    stop.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }

    // 八次替换退休了八个旧值；最终值仍然存活在单元里
    assert!(eventually(|| drops.load(Ordering::SeqCst) == 8));
    domain.synchronize();

    let guard = domain.enter();
    assert_eq!(cell.load(&guard).0, 8);
}
