//! A host screen driving a question countdown and a results reveal over the
//! simulated scheduler.

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

use fuiz_pacing::{
    clock::{Clock, Timestamp},
    config::{CountdownConfig, RevealConfig},
    countdown::SyncedCountdown,
    reveal::{Precision, board::RevealBoard},
    scheduler::{Cadence, ManualScheduler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Answering(u32),
    Results(u32),
}

fn epoch() -> web_time::SystemTime {
    Timestamp::from_millis(1_700_000_000_000).to_system_time()
}

#[test]
fn question_then_results_then_next_question() {
    let mut scheduler = ManualScheduler::new(epoch());
    let transitions: Rc<RefCell<VecDeque<Screen>>> = Rc::default();
    let sink = Rc::clone(&transitions);

    let server_start = Timestamp::from_millis(
        Timestamp::from_system_time(scheduler.now()).as_millis() - 3000,
    );
    let mut countdown = SyncedCountdown::new(Screen::Answering(1), 10, Some(server_start), {
        move |phase: &Screen| {
            if let Screen::Answering(question) = phase {
                sink.borrow_mut().push_back(Screen::Results(*question));
            }
        }
    })
    .with_config(CountdownConfig::default())
    .with_slot(0);
    let mut board = RevealBoard::new(Precision::Integer, RevealConfig::default());
    let mut screen = Screen::Answering(1);

    countdown.start(&mut scheduler);
    assert_eq!(countdown.remaining_seconds(), 7);

    let mut results_entered = 0;
    scheduler.advance(Duration::from_secs(10), |s, alarm| {
        if !countdown.receive_alarm(s, &alarm) {
            board.receive_alarm(s, &alarm);
        }

        let next = transitions.borrow_mut().pop_front();
        if let Some(next) = next {
            screen = next;
            results_entered += 1;
            board.sync([("red", 4.0), ("blue", 9.0), ("green", 0.0)], true, s);
        }
    });

    assert_eq!(screen, Screen::Results(1));
    assert_eq!(results_entered, 1);
    assert!(countdown.has_expired());
    assert!(board.is_settled());
    assert_eq!(board.current_value(&"blue"), Some(9.0));
    assert!(scheduler.fired(Cadence::Frame) > 0);

    // Re-rendering the results screen does not replay the reveal.
    board.sync([("red", 4.0), ("blue", 9.0), ("green", 0.0)], true, &mut scheduler);
    assert_eq!(scheduler.pending(), 0);

    // Next question: the countdown is reset for the new phase and fires again.
    board.teardown(&mut scheduler);
    countdown.reset(Screen::Answering(2), 2, None, &mut scheduler);
    scheduler.advance(Duration::from_secs(3), |s, alarm| {
        countdown.receive_alarm(s, &alarm);
    });
    assert_eq!(
        transitions.borrow().iter().copied().collect::<Vec<_>>(),
        vec![Screen::Results(2)]
    );
}

#[test]
fn unmounting_mid_phase_never_transitions() {
    let mut scheduler = ManualScheduler::new(epoch());
    let transitions = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&transitions);

    let mut countdown = SyncedCountdown::new("q", 3, None, move |_: &&str| {
        *sink.borrow_mut() += 1;
    });
    let mut board = RevealBoard::new(Precision::Continuous, RevealConfig::default());

    countdown.start(&mut scheduler);
    board.sync([("row-1", 62.5), ("row-2", 37.5)], true, &mut scheduler);
    scheduler.advance(Duration::from_millis(1500), |s, alarm| {
        if !countdown.receive_alarm(s, &alarm) {
            board.receive_alarm(s, &alarm);
        }
    });
    let frozen = board.values().map(|(_, value)| value).collect::<Vec<_>>();

    countdown.teardown(&mut scheduler);
    board.teardown(&mut scheduler);
    assert_eq!(scheduler.pending(), 0);

    let mut delivered = 0;
    scheduler.advance(Duration::from_secs(10), |_, _| delivered += 1);
    assert_eq!(delivered, 0);
    assert_eq!(*transitions.borrow(), 0);
    assert_eq!(countdown.remaining_seconds(), 2);
    assert_eq!(frozen.len(), 2);
}
