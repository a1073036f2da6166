//! 基础测试模块
//! 测试域创建、读者区段、cookie 与基本回调功能

use crate::tests::eventually;
use crate::{GraceCell, GraceCookie, GraceDomain};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 测试1: 创建与销毁一个空域
#[test]
fn test_create_and_drop_domain() {
    let domain = GraceDomain::new();
    assert!(!domain.read_section_held());
    drop(domain);
}

/// 测试2: 进入与退出一个读者区段
#[test]
fn test_enter_exit_cycle() {
    let domain = GraceDomain::new();

    {
        let guard = domain.enter();
        assert!(domain.read_section_held());
        assert!(guard.epoch() <= 1);
    }
    // 守卫在这里被 drop，区段结束
    assert!(!domain.read_section_held());

    {
        let _guard = domain.enter();
        assert!(domain.read_section_held());
    }
    assert!(!domain.read_section_held());
}

/// 测试3: 读者区段可以嵌套
#[test]
fn test_nested_read_sections() {
    let domain = GraceDomain::new();

    let guard1 = domain.enter();
    let guard2 = domain.enter();
    let guard3 = domain.enter();

    assert!(domain.read_section_held());

    drop(guard2);
    assert!(domain.read_section_held());
    drop(guard1);
    assert!(domain.read_section_held());
    drop(guard3);
    assert!(!domain.read_section_held());
}

/// 测试4: 同一流派可以重复使用
#[test]
fn test_same_flavor_repeated_use() {
    let domain = GraceDomain::new();

    for _ in 0..10 {
        let _guard = domain.enter();
    }
    assert!(!domain.read_section_held());
}

/// 测试5: NMI 安全流派的基本进入与退出
#[test]
fn test_nmi_safe_flavor_basic() {
    let domain = GraceDomain::new();

    {
        let _guard = domain.enter_nmi_safe();
        assert!(domain.read_section_held());
    }
    assert!(!domain.read_section_held());
}

/// 测试6: 无屏障流派的基本进入与退出
#[test]
fn test_barrier_free_flavor_basic() {
    let domain = GraceDomain::new();

    {
        let _guard = domain.enter_barrier_free();
        assert!(domain.read_section_held());
    }
    assert!(!domain.read_section_held());
}

/// 测试7: 类信号量凭据可以跨线程释放
#[test]
fn test_ticket_released_on_other_thread() {
    let domain = GraceDomain::new();

    let ticket = domain.down_read();
    assert!(domain.read_section_held());

    let handle = std::thread::spawn(move || {
        ticket.release();
    });
    handle.join().unwrap();

    assert!(!domain.read_section_held());
}

/// 测试8: 哨兵 cookie 总是已完成
#[test]
fn test_completed_sentinel() {
    let domain = GraceDomain::new();

    assert!(domain.poll_state(GraceCookie::COMPLETED));
    assert!(GraceCookie::COMPLETED.same_state(GraceCookie::COMPLETED));
}

/// 测试9: 空闲域上的两次快照相等
#[test]
fn test_get_state_stable_when_idle() {
    let domain = GraceDomain::new();

    let cookie1 = domain.get_state();
    let cookie2 = domain.get_state();
    assert!(cookie1.same_state(cookie2));
    assert_eq!(cookie1, cookie2);
}

/// 测试10: get_state 不会自行启动宽限期
#[test]
fn test_get_state_does_not_start_engine() {
    let domain = GraceDomain::new();

    let cookie = domain.get_state();
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(!domain.poll_state(cookie));
}

/// 测试11: start_poll 推动引擎完成快照的代（场景3）
#[test]
fn test_start_poll_reaches_cookie() {
    let domain = GraceDomain::new();

    let cookie = domain.start_poll();
    assert!(eventually(|| domain.poll_state(cookie)));

    // 单调性：之后恒为真
    domain.synchronize();
    assert!(domain.poll_state(cookie));
}

/// 测试12: 无读者时 synchronize 直接完成
#[test]
fn test_synchronize_without_readers() {
    let domain = GraceDomain::new();

    domain.synchronize();
    domain.synchronize();

    let cookie = domain.get_state();
    assert!(!domain.poll_state(cookie));
}

/// 测试13: 无读者时的加速 synchronize
#[test]
fn test_synchronize_expedited_without_readers() {
    let domain = GraceDomain::new();
    domain.synchronize_expedited();
}

/// 测试14: 回调在一个排空周期内被调用恰好一次（场景2）
#[test]
fn test_deferred_callbacks_run_once_in_order() {
    let domain = GraceDomain::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    for name in ["x", "y", "z"] {
        let order = Arc::clone(&order);
        domain
            .defer(move || order.lock().unwrap().push(name))
            .unwrap();
    }

    assert!(eventually(|| order.lock().unwrap().len() == 3));
    assert_eq!(*order.lock().unwrap(), vec!["x", "y", "z"]);
}

/// 测试15: 回调中可以再延迟新的回调
#[test]
fn test_defer_from_callback() {
    // 手动驱动模式：回调在本线程的 drive() 中运行，结果是确定性的
    let domain = Arc::new(GraceDomain::builder().background_engine(false).build());
    let count = Arc::new(AtomicUsize::new(0));

    let outer_domain = Arc::clone(&domain);
    let outer_count = Arc::clone(&count);
    domain
        .defer(move || {
            outer_count.fetch_add(1, Ordering::SeqCst);
            let inner_count = Arc::clone(&outer_count);
            outer_domain
                .defer(move || {
                    inner_count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        })
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
    domain.drive();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

/// 测试16: GraceCell 的创建与读取
#[test]
fn test_cell_create_and_load() {
    let domain = GraceDomain::new();
    let cell = GraceCell::new(42i32);

    let guard = domain.enter();
    assert_eq!(*cell.load(&guard), 42);
}

/// 测试17: GraceCell 的 replace 与 into_inner
#[test]
fn test_cell_replace_and_into_inner() {
    let domain = GraceDomain::new();
    let cell = GraceCell::new(String::from("old"));

    cell.replace(String::from("new"), &domain);
    {
        let guard = domain.enter();
        assert_eq!(cell.load(&guard), "new");
    }

    // 等旧值的延迟回收被周期覆盖，保证 drop 时队列为空
    domain.synchronize();
    assert_eq!(cell.into_inner(), "new");
}

/// 测试18: Debug 输出可用
#[test]
fn test_debug_formatting() {
    let domain = GraceDomain::new();
    let output = format!("{domain:?}");
    assert!(output.contains("GraceDomain"));

    let guard = domain.enter();
    let output = format!("{guard:?}");
    assert!(output.contains("ReadGuard"));
}
