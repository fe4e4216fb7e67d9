use super::*;
use std::sync::Arc;
use std::thread;

fn rec(payload: &str) -> Record {
    Record::new(payload.to_string())
}

#[test]
fn rejects_once_capacity_is_reached() {
    let q = IntakeQueue::new(3);

    for i in 0..3 {
        assert_eq!(q.enqueue(rec(&format!("r{i}"))), Admission::Accepted);
    }
    assert_eq!(q.enqueue(rec("overflow")), Admission::Rejected);
    assert_eq!(q.len(), 3);

    let c = q.counters();
    assert_eq!((c.accepted, c.rejected, c.drained), (3, 1, 0));
}

#[test]
fn drain_preserves_fifo_order_and_bounds() {
    let q = IntakeQueue::new(10);
    for i in 0..7 {
        q.enqueue(rec(&format!("r{i}")));
    }

    let first: Vec<String> = q.drain(5).into_iter().map(|r| r.payload).collect();
    assert_eq!(first, ["r0", "r1", "r2", "r3", "r4"]);

    let rest: Vec<String> = q.drain(5).into_iter().map(|r| r.payload).collect();
    assert_eq!(rest, ["r5", "r6"]);

    assert!(q.drain(5).is_empty());
    assert!(q.is_empty());
    assert_eq!(q.counters().drained, 7);
}

#[test]
fn drain_frees_room_for_new_records() {
    let q = IntakeQueue::new(2);
    q.enqueue(rec("a"));
    q.enqueue(rec("b"));
    assert_eq!(q.enqueue(rec("c")), Admission::Rejected);

    assert_eq!(q.drain(1).len(), 1);
    assert_eq!(q.enqueue(rec("c")), Admission::Accepted);

    let left: Vec<String> = q.drain(10).into_iter().map(|r| r.payload).collect();
    assert_eq!(left, ["b", "c"]);
}

#[test]
fn drain_zero_is_a_no_op() {
    let q = IntakeQueue::new(2);
    q.enqueue(rec("a"));
    assert!(q.drain(0).is_empty());
    assert_eq!(q.len(), 1);
}

#[test]
fn concurrent_enqueue_never_exceeds_capacity() {
    const CAPACITY: usize = 100;
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let q = Arc::new(IntakeQueue::new(CAPACITY));

    let accepted: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let q = Arc::clone(&q);
                s.spawn(move || {
                    (0..PER_THREAD)
                        .filter(|i| q.enqueue(rec(&format!("{t}-{i}"))) == Admission::Accepted)
                        .count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(accepted, CAPACITY);
    assert_eq!(q.len(), CAPACITY);
    let c = q.counters();
    assert_eq!(c.accepted as usize, CAPACITY);
    assert_eq!(c.rejected as usize, THREADS * PER_THREAD - CAPACITY);
}
