//! Violation Detection Tests.
//!
//! Drives store/load streams through the full unit and checks when the
//! commit-time state machine confirms a memory-order violation, how it is
//! classified, and what the predictor learns from it.

use memdep_core::common::TraceUid;
use memdep_core::config::OracleMode;
use memdep_core::core::pipeline::CandidateState;
use memdep_core::core::units::mdp::oracle::shard;
use pretty_assertions::assert_eq;

use crate::common::builder::InstBuilder;
use crate::common::harness::TestContext;

const LOAD_PC: u64 = 100;
const STORE_PC: u64 = 200;
const ADDR: u64 = 0x8000;

// ══════════════════════════════════════════════════════════
// 1. Confirmation
// ══════════════════════════════════════════════════════════

/// Squash of a flagged load followed by the matching re-executed commit
/// counts exactly one violation.
#[test]
fn squash_then_matching_commit_confirms_once() {
    let mut ctx = TestContext::new();
    let mut store = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let mut load = InstBuilder::load(LOAD_PC, 2).addr(ADDR).build();
    let _ = ctx.dispatch(&mut store);
    let _ = ctx.dispatch(&mut load);
    assert_eq!((store.occurrence, load.occurrence), (1, 1));

    assert!(ctx.commit(&mut store).is_none());
    let mut load = InstBuilder::load(LOAD_PC, 2).addr(ADDR).violated_by(&store).build();
    ctx.squash(&mut load);
    assert!(matches!(ctx.mdu.tracker().candidate(), CandidateState::Possible(_)));

    let mut replay = InstBuilder::load(LOAD_PC, 3).addr(ADDR).build();
    let _ = ctx.dispatch(&mut replay);
    assert_eq!(replay.occurrence, 1);
    let confirmed = ctx.commit(&mut replay).unwrap();

    assert_eq!(confirmed.signature.violator, TraceUid::new(LOAD_PC, 1));
    assert_eq!(confirmed.squash_to_commit, 1);
    assert!(replay.confirmed_violator);
    let stats = ctx.mdu.stats();
    assert_eq!(stats.violations, 1);
    assert_eq!(stats.violations_by_load, 1);
    assert_eq!(stats.mispredictions_cold, 1);
    assert_eq!(stats.squash_to_commit.samples(), 1);
    assert_eq!(*ctx.mdu.tracker().candidate(), CandidateState::Idle);
}

/// Wrong-path instructions fetched between the squash and the replay widen
/// the recorded distance.
#[test]
fn squash_to_commit_counts_wrong_path_fetches() {
    let mut ctx = TestContext::new();
    let store = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let mut load = InstBuilder::load(LOAD_PC, 2).addr(ADDR).violated_by(&store).build();
    let _ = ctx.dispatch(&mut load);
    let mut younger: Vec<_> = (3..50)
        .map(|seq| InstBuilder::load(0x1000 + seq * 4, seq).addr(0x40).build())
        .collect();
    for inst in &mut younger {
        let _ = ctx.dispatch(inst);
    }

    ctx.squash(&mut load);
    for inst in &mut younger {
        ctx.squash(inst);
    }
    assert!(ctx.mdu.tracker().is_empty());

    let mut replay = InstBuilder::load(LOAD_PC, 50).addr(ADDR).eff_seq(500).build();
    let _ = ctx.dispatch(&mut replay);
    let confirmed = ctx.commit(&mut replay).unwrap();
    assert_eq!(confirmed.squash_to_commit, 498);
    assert_eq!(ctx.mdu.stats().squash_to_commit.max(), 498);
    assert_eq!(ctx.mdu.stats().mem_squashed, 48);
}

/// Any commit resolves the candidate, so an intervening instruction cancels it.
#[test]
fn intervening_commit_cancels_candidate() {
    let mut ctx = TestContext::new();
    let store = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let mut load = InstBuilder::load(LOAD_PC, 2).addr(ADDR).violated_by(&store).build();
    let _ = ctx.dispatch(&mut load);
    ctx.squash(&mut load);

    let mut alu = InstBuilder::alu(0x50, 3).build();
    let _ = ctx.dispatch(&mut alu);
    assert!(ctx.commit(&mut alu).is_none());

    let mut replay = InstBuilder::load(LOAD_PC, 4).addr(ADDR).build();
    let _ = ctx.dispatch(&mut replay);
    assert!(ctx.commit(&mut replay).is_none());
    assert_eq!(ctx.mdu.stats().violations, 0);
}

/// A replay at a different address is not the same dynamic access.
#[test]
fn address_mismatch_not_confirmed() {
    let mut ctx = TestContext::new();
    let store = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let mut load = InstBuilder::load(LOAD_PC, 2).addr(ADDR).violated_by(&store).build();
    let _ = ctx.dispatch(&mut load);
    ctx.squash(&mut load);

    let mut replay = InstBuilder::load(LOAD_PC, 3).addr(ADDR + 8).build();
    let _ = ctx.dispatch(&mut replay);
    assert!(ctx.commit(&mut replay).is_none());
    assert_eq!(*ctx.mdu.tracker().candidate(), CandidateState::Idle);
}

/// A squash without the violator flag never arms the candidate.
#[test]
fn plain_squash_does_not_arm() {
    let mut ctx = TestContext::new();
    let mut load = InstBuilder::load(LOAD_PC, 1).addr(ADDR).build();
    let _ = ctx.dispatch(&mut load);
    ctx.squash(&mut load);
    assert_eq!(*ctx.mdu.tracker().candidate(), CandidateState::Idle);
    assert_eq!(ctx.mdu.stats().mem_squashed, 1);
}

// ══════════════════════════════════════════════════════════
// 2. Classification and training
// ══════════════════════════════════════════════════════════

/// A violation on a load that had a predicted producer is a false misprediction.
#[test]
fn predicted_load_violation_is_false_misprediction() {
    let mut ctx = TestContext::new();

    // First violation trains the predictor.
    let mut s1 = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let _ = ctx.dispatch(&mut s1);
    let _ = ctx.commit(&mut s1);
    let mut l1 = InstBuilder::load(LOAD_PC, 2).addr(ADDR).violated_by(&s1).build();
    let _ = ctx.dispatch(&mut l1);
    ctx.squash(&mut l1);
    let mut l1 = InstBuilder::load(LOAD_PC, 3).addr(ADDR).build();
    let _ = ctx.dispatch(&mut l1);
    assert!(ctx.commit(&mut l1).is_some());

    // The load now predicts the store, but still gets caught.
    let mut s2 = InstBuilder::store(STORE_PC, 4).addr(ADDR).build();
    let mut l2 = InstBuilder::load(LOAD_PC, 5).addr(ADDR).build();
    let _ = ctx.dispatch(&mut s2);
    let prediction = ctx.dispatch(&mut l2);
    assert_eq!(prediction.store_set, Some(4));
    let _ = ctx.commit(&mut s2);

    let mut l2 = InstBuilder::load(LOAD_PC, 5).addr(ADDR).violated_by(&s2).build();
    l2.predicted_dependency = true;
    ctx.squash(&mut l2);
    let mut replay = InstBuilder::load(LOAD_PC, 6).addr(ADDR).build();
    let _ = ctx.dispatch(&mut replay);
    assert!(ctx.commit(&mut replay).is_some());

    let stats = ctx.mdu.stats();
    assert_eq!(stats.violations, 2);
    assert_eq!(stats.mispredictions_cold, 1);
    assert_eq!(stats.mispredictions_false, 1);
}

/// A store caught violating is split out from load violations.
#[test]
fn store_violator_counted_separately() {
    let mut ctx = TestContext::new();
    let older = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let mut younger = InstBuilder::store(STORE_PC + 4, 2).addr(ADDR).violated_by(&older).build();
    let _ = ctx.dispatch(&mut younger);
    ctx.squash(&mut younger);
    let mut replay = InstBuilder::store(STORE_PC + 4, 3).addr(ADDR).build();
    let _ = ctx.dispatch(&mut replay);
    assert!(ctx.commit(&mut replay).is_some());
    assert_eq!(ctx.mdu.stats().violations_by_store, 1);
    assert_eq!(ctx.mdu.stats().violations_by_load, 0);
}

// ══════════════════════════════════════════════════════════
// 3. Prediction-time vs. detection-time identity
// ══════════════════════════════════════════════════════════

/// When an older instance of the same PC is squashed first, the violator is
/// detected under a lower occurrence than it was predicted under, and the
/// refinement edge uses the prediction-time one.
#[test]
fn refinement_uses_prediction_time_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = TestContext::with_oracle(OracleMode::Refine, dir.path());

    let mut store = InstBuilder::store(STORE_PC, 1).addr(ADDR).build();
    let mut older = InstBuilder::load(LOAD_PC, 2).addr(0x10).build();
    let mut younger = InstBuilder::load(LOAD_PC, 3).addr(ADDR).build();
    let _ = ctx.dispatch(&mut store);
    let _ = ctx.dispatch(&mut older);
    let _ = ctx.dispatch(&mut younger);
    assert_eq!(younger.occurrence, 2);

    let _ = ctx.commit(&mut store);
    ctx.squash(&mut older);
    let mut younger = InstBuilder::load(LOAD_PC, 3).addr(ADDR).violated_by(&store).build();
    ctx.squash(&mut younger);
    assert_eq!(younger.occurrence, 1);

    let CandidateState::Possible(signature) = *ctx.mdu.tracker().candidate() else {
        panic!("candidate not armed");
    };
    assert_eq!(signature.violator, TraceUid::new(LOAD_PC, 1));
    assert_eq!(signature.uid_at_prediction(), TraceUid::new(LOAD_PC, 2));

    let mut replay = InstBuilder::load(LOAD_PC, 4).addr(ADDR).build();
    let _ = ctx.dispatch(&mut replay);
    assert!(ctx.commit(&mut replay).is_some());
    ctx.mdu.shutdown();

    assert_eq!(ctx.mdu.stats().oracle_refinements, 1);
    let text = shard::read_shard(&shard::mini_trace_path(dir.path(), 0))
        .unwrap()
        .unwrap();
    assert_eq!(text, "#Refinement\n100:2,200:1\n");
}

/// Dispatch from a second hardware thread is refused.
#[test]
fn second_thread_rejected() {
    let mut ctx = TestContext::new();
    let mut load = InstBuilder::load(LOAD_PC, 1).thread(1).build();
    let err = ctx.mdu.dispatch(&mut load).unwrap_err();
    assert!(err.is_invariant_violation());
    assert!(ctx.mdu.tracker().is_empty());
}
