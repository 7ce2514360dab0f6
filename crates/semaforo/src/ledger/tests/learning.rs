use std::sync::Arc;

use super::common::*;
use crate::evaluation::{AnswerValue, HardBlockFlags};
use crate::ledger::domain::{CaseId, Decision, SegmentKey};
use crate::learning::{FeedbackLearner, LearningError, ObservedOutcome, PatternList};

/// Close one case in the fixture segment, with P08 answered negatively when asked.
fn closed_case(
    ledger: &CaseLedgerFixture,
    negative_p08: bool,
    decision: Decision,
) -> CaseId {
    let case = ledger.open(open_request()).expect("open");
    for (question_id, mut value) in positive_answers() {
        if negative_p08 && question_id == "P08" {
            value = AnswerValue::Selection(3);
        }
        ledger
            .upsert_answer(&case.id, &question_id, value, &HardBlockFlags::default())
            .expect("upsert");
    }
    ledger
        .close(&case.id, decision, "fixture closure".to_string())
        .expect("close");
    case.id
}

type CaseLedgerFixture =
    crate::ledger::service::CaseLedger<MemoryCaseRepository, MemoryProfileStore>;

#[test]
fn open_cases_cannot_feed_learning() {
    let (ledger, repository, profiles) = build_ledger();
    let case = ledger.open(open_request()).expect("open");
    let learner = FeedbackLearner::new(repository, profiles);

    let err = learner
        .record_outcome(&case.id, ObservedOutcome::Favorable, true)
        .expect_err("case still open");
    assert!(matches!(err, LearningError::CaseStillOpen { .. }));
}

#[test]
fn unknown_cases_are_rejected() {
    let (_, repository, profiles) = build_ledger();
    let learner = FeedbackLearner::new(repository, profiles);

    let err = learner
        .record_outcome(
            &CaseId("case-missing".to_string()),
            ObservedOutcome::Favorable,
            true,
        )
        .expect_err("no such case");
    assert!(matches!(err, LearningError::CaseNotFound { .. }));
}

#[test]
fn approved_outcomes_update_counters_and_running_average() {
    let (ledger, repository, profiles) = build_ledger();
    let case_id = closed_case(&ledger, false, Decision::Approve);
    let learner = FeedbackLearner::new(repository, profiles);

    let profile = learner
        .record_outcome(&case_id, ObservedOutcome::Favorable, true)
        .expect("record");

    assert_eq!(profile.total_cases, 1);
    assert_eq!(profile.approved_cases, 1);
    assert_eq!(profile.rejected_cases, 0);
    // All layers at 100 for the fully positive case.
    assert!((profile.average_approved_score - 100.0).abs() < 1e-9);
    assert!(profile.candidates.is_empty());
    assert_eq!(profile.version, 1);
}

#[test]
fn wrong_verdicts_seed_candidates_from_red_flags() {
    let (ledger, repository, profiles) = build_ledger();
    let first = closed_case(&ledger, true, Decision::Reject);
    let learner = FeedbackLearner::new(repository, profiles);

    let profile = learner
        .record_outcome(&first, ObservedOutcome::Favorable, false)
        .expect("record");
    assert_eq!(profile.rejected_cases, 1);
    assert_eq!(profile.candidates.len(), 1);
    assert_eq!(profile.candidates[0].id, "cand-P08");
    assert_eq!(profile.candidates[0].observations, 1);

    // A second sighting bumps the counter instead of duplicating the candidate.
    let second = closed_case(&ledger, true, Decision::Reject);
    let profile = learner
        .record_outcome(&second, ObservedOutcome::Favorable, false)
        .expect("record");
    assert_eq!(profile.candidates.len(), 1);
    assert_eq!(profile.candidates[0].observations, 2);
}

#[test]
fn promotion_is_gated_on_observations_then_explicit() {
    let (ledger, repository, profiles) = build_ledger();
    let learner = FeedbackLearner::new(repository, profiles);
    let segment = SegmentKey {
        industry: "professional_services".to_string(),
        service_type: "consulting".to_string(),
        amount_band: crate::ledger::domain::AmountBand::UpTo10M,
    };

    for _ in 0..2 {
        let case_id = closed_case(&ledger, true, Decision::Reject);
        learner
            .record_outcome(&case_id, ObservedOutcome::Favorable, false)
            .expect("record");
    }

    let err = learner
        .promote_candidate(&segment, "cand-P08", PatternList::Alerts)
        .expect_err("only two observations");
    assert!(matches!(
        err,
        LearningError::InsufficientObservations {
            observations: 2,
            required: 3,
            ..
        }
    ));

    let case_id = closed_case(&ledger, true, Decision::Reject);
    learner
        .record_outcome(&case_id, ObservedOutcome::Favorable, false)
        .expect("record");

    let profile = learner
        .promote_candidate(&segment, "cand-P08", PatternList::Alerts)
        .expect("promote");
    assert!(profile.candidates.is_empty());
    assert_eq!(profile.alerts.len(), 1);
    assert_eq!(profile.alerts[0].id, "cand-P08");
    assert_eq!(profile.alerts[0].question_id.as_deref(), Some("P08"));
    assert_eq!(profile.alerts[0].times_applied, 0);

    let err = learner
        .promote_candidate(&segment, "cand-P08", PatternList::Alerts)
        .expect_err("already promoted");
    assert!(matches!(err, LearningError::UnknownCandidate { .. }));
}

#[test]
fn promotion_requires_an_existing_profile() {
    let (_, repository, profiles) = build_ledger();
    let learner = FeedbackLearner::new(repository, profiles);
    let segment = SegmentKey {
        industry: "retail".to_string(),
        service_type: "logistics".to_string(),
        amount_band: crate::ledger::domain::AmountBand::UpTo1M,
    };

    let err = learner
        .promote_candidate(&segment, "cand-P08", PatternList::Alerts)
        .expect_err("segment never seen");
    assert!(matches!(err, LearningError::UnknownSegment { .. }));
}

#[test]
fn persistent_write_contention_surfaces_after_bounded_retries() {
    let (ledger, repository, _) = build_ledger();
    let case_id = closed_case(&ledger, false, Decision::Approve);
    let learner = FeedbackLearner::new(repository, Arc::new(ContendedProfileStore));

    let err = learner
        .record_outcome(&case_id, ObservedOutcome::Favorable, true)
        .expect_err("store always conflicts");
    assert!(matches!(err, LearningError::Contention { attempts: 5 }));
}
