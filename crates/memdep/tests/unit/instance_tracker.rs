//! Instance Tracker Property Tests.
//!
//! Drives the tracker with randomized event streams and checks that the
//! occurrence indices of in-flight instances stay dense and that the window
//! only ever gives up its oldest entry.

use std::collections::BTreeMap;

use memdep_core::MemDepError;
use memdep_core::common::DynInst;
use memdep_core::core::pipeline::InstanceTracker;
use memdep_core::stats::MemDepStats;
use proptest::prelude::*;

const PCS: [u64; 3] = [0x1000, 0x1004, 0x2000];

#[derive(Clone, Copy, Debug)]
enum Event {
    Dispatch { pc: u64, load: bool },
    Squash,
    Commit,
}

fn event(with_commits: bool) -> impl Strategy<Value = Event> {
    let top = if with_commits { 6u8 } else { 4u8 };
    (0..top, 0..PCS.len(), any::<bool>()).prop_map(|(kind, pc, load)| match kind {
        0..=2 => Event::Dispatch { pc: PCS[pc], load },
        3 => Event::Squash,
        _ => Event::Commit,
    })
}

/// Applies `events`, skipping removals on an empty window.
fn replay(events: &[Event], mut check: impl FnMut(&InstanceTracker)) -> InstanceTracker {
    let mut tracker = InstanceTracker::new();
    let mut stats = MemDepStats::default();
    let mut insts: BTreeMap<u64, DynInst> = BTreeMap::new();
    let mut next_seq = 1;

    for ev in events {
        match *ev {
            Event::Dispatch { pc, load } => {
                let mut inst = if load {
                    DynInst::load(pc, next_seq, 0x40, 8)
                } else {
                    DynInst::store(pc, next_seq, 0x40, 8)
                };
                next_seq += 1;
                tracker.insert_from_dispatch(&mut inst, &mut stats).unwrap();
                let _ = insts.insert(inst.seq_num, inst);
            }
            Event::Squash | Event::Commit => {
                let Some((_, mut inst)) = insts.pop_first() else {
                    continue;
                };
                let oldest = tracker.in_flight().map(|e| e.seq_num).min();
                assert_eq!(oldest, Some(inst.seq_num));
                if matches!(ev, Event::Squash) {
                    tracker.remove_squashed(&mut inst, &mut stats).unwrap();
                } else {
                    let _ = tracker.remove_committed(&mut inst, &mut stats).unwrap();
                }
            }
        }
        check(&tracker);
    }
    tracker
}

fn occurrences(tracker: &InstanceTracker, pc: u64) -> Vec<u64> {
    tracker
        .in_flight()
        .filter(|e| e.pc == pc)
        .map(|e| e.occurrence)
        .collect()
}

proptest! {
    /// Without commits, each PC's in-flight occurrences are exactly 1..=k.
    #[test]
    fn occurrences_dense_under_squash(events in prop::collection::vec(event(false), 1..200)) {
        let _ = replay(&events, |tracker| {
            for pc in PCS {
                let occ = occurrences(tracker, pc);
                let expected: Vec<u64> = (1..=occ.len() as u64).collect();
                assert_eq!(occ, expected, "pc {pc:#x}");
                assert_eq!(tracker.occurrence_count(pc), occ.len() as u64);
            }
        });
    }

    /// With commits, each PC's in-flight occurrences are consecutive, ascending in
    /// program order, and end at the PC's counter.
    #[test]
    fn occurrences_contiguous_with_commits(events in prop::collection::vec(event(true), 1..300)) {
        let _ = replay(&events, |tracker| {
            for pc in PCS {
                let occ = occurrences(tracker, pc);
                for pair in occ.windows(2) {
                    assert_eq!(pair[0] + 1, pair[1], "pc {pc:#x}: {occ:?}");
                }
                if let Some(last) = occ.last() {
                    assert_eq!(*last, tracker.occurrence_count(pc));
                }
            }
        });
    }

    /// The window is always in ascending sequence order.
    #[test]
    fn window_stays_sorted(events in prop::collection::vec(event(true), 1..300)) {
        let tracker = replay(&events, |tracker| {
            let seqs: Vec<u64> = tracker.in_flight().map(|e| e.seq_num).collect();
            assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        });
        let dispatched = events.iter().filter(|e| matches!(e, Event::Dispatch { .. })).count();
        assert!(tracker.len() <= dispatched);
    }

    /// Removing anything but the oldest instance is rejected and changes nothing.
    #[test]
    fn non_head_removal_rejected(depth in 2u64..16, pick in 1u64..16, squash in any::<bool>()) {
        let pick = 1 + pick % (depth - 1);
        let mut tracker = InstanceTracker::new();
        let mut stats = MemDepStats::default();
        let mut insts: Vec<DynInst> = (1..=depth).map(|s| DynInst::load(PCS[0], s, 0, 8)).collect();
        for inst in &mut insts {
            tracker.insert_from_dispatch(inst, &mut stats).unwrap();
        }

        let victim = &mut insts[usize::try_from(pick).unwrap()];
        let err = if squash {
            tracker.remove_squashed(victim, &mut stats).unwrap_err()
        } else {
            tracker.remove_committed(victim, &mut stats).unwrap_err()
        };
        prop_assert!(matches!(err, MemDepError::WindowHeadMismatch { expected: Some(1), .. }), "unexpected error: {:?}", err);
        prop_assert!(err.is_invariant_violation());
        prop_assert_eq!(tracker.len() as u64, depth);
        prop_assert_eq!(occurrences(&tracker, PCS[0]), (1..=depth).collect::<Vec<_>>());
    }
}

#[test]
fn dispatch_must_be_younger_than_tail() {
    let mut tracker = InstanceTracker::new();
    let mut stats = MemDepStats::default();
    tracker
        .insert_from_dispatch(&mut DynInst::store(PCS[0], 10, 0, 8), &mut stats)
        .unwrap();
    let err = tracker
        .insert_from_dispatch(&mut DynInst::load(PCS[1], 9, 0, 8), &mut stats)
        .unwrap_err();
    assert!(matches!(err, MemDepError::ProgramOrder { tail: 10, seq_num: 9 }));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn commit_writes_back_renumbered_occurrence() {
    let mut tracker = InstanceTracker::new();
    let mut stats = MemDepStats::default();
    let mut first = DynInst::load(PCS[0], 1, 0, 8);
    let mut second = DynInst::load(PCS[0], 2, 0, 8);
    tracker.insert_from_dispatch(&mut first, &mut stats).unwrap();
    tracker.insert_from_dispatch(&mut second, &mut stats).unwrap();
    assert_eq!(second.occurrence, 2);

    tracker.remove_squashed(&mut first, &mut stats).unwrap();
    let _ = tracker.remove_committed(&mut second, &mut stats).unwrap();
    assert_eq!(second.occurrence, 1);
    assert_eq!(stats.mem_squashed, 1);
    assert_eq!(stats.loads_committed, 1);
}
