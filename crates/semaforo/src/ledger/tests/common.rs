use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::catalog::{
    AcceptableRange, ActiveCatalog, AnswerType, Applicability, Block, EscalationAction, Layer,
    Question, QuestionCatalog, ScoringWeights, Severity,
};
use crate::evaluation::AnswerValue;
use crate::ledger::domain::{Case, CaseId, SegmentKey};
use crate::ledger::repository::{CaseRepository, RepositoryError};
use crate::ledger::service::{CaseLedger, OpenCaseRequest};
use crate::learning::{SegmentProfile, SegmentProfileRepository};

pub(super) fn question(
    id: &str,
    block: Block,
    ordinal: u16,
    severity: Severity,
    answer_type: AnswerType,
) -> Question {
    Question {
        id: id.to_string(),
        block,
        ordinal,
        prompt: format!("question {id}"),
        severity,
        answer_type,
        action_if_negative: EscalationAction::Alert,
        action_if_incomplete: EscalationAction::Alert,
        options: Vec::new(),
        critical_threshold: None,
        alert_threshold: None,
        none_sentinel: None,
        acceptable_range: None,
        applicability: Applicability::All,
        required: true,
    }
}

/// Catalog used across the ledger tests: eleven consulting questions over the six
/// blocks, plus one manufacturing-only question.
pub(super) fn catalog() -> QuestionCatalog {
    let mut questions = Vec::new();

    let mut p01 = question("P01", Block::Documental, 1, Severity::Critical, AnswerType::SingleChoice);
    p01.prompt = "Is a signed master services contract on file?".to_string();
    p01.options = vec![
        "signed and dated".to_string(),
        "signed, undated".to_string(),
        "unsigned draft".to_string(),
        "no contract".to_string(),
    ];
    p01.critical_threshold = Some(2);
    p01.action_if_negative = EscalationAction::RedFlag;
    p01.action_if_incomplete = EscalationAction::ForcedReview;
    questions.push(p01);

    let mut p02 = question("P02", Block::Documental, 2, Severity::Important, AnswerType::Scale);
    p02.prompt = "Do invoices match the contracted scope?".to_string();
    p02.options = vec![
        "fully consistent".to_string(),
        "minor mismatches".to_string(),
        "major mismatches".to_string(),
    ];
    p02.alert_threshold = Some(1);
    p02.critical_threshold = Some(2);
    questions.push(p02);

    let mut p03 = question("P03", Block::Financial, 1, Severity::Critical, AnswerType::SingleChoice);
    p03.prompt = "Was payment executed through the banking system?".to_string();
    p03.options = vec![
        "yes, fully traceable".to_string(),
        "partially traceable".to_string(),
        "cash or untraceable".to_string(),
    ];
    p03.critical_threshold = Some(2);
    p03.action_if_negative = EscalationAction::RedFlag;
    p03.action_if_incomplete = EscalationAction::ForcedReview;
    questions.push(p03);

    let mut p04 = question("P04", Block::Financial, 2, Severity::Important, AnswerType::Amount);
    p04.prompt = "Agreed fee for the engagement".to_string();
    p04.acceptable_range = Some(AcceptableRange {
        min: 0.0,
        max: 5_000_000.0,
    });
    questions.push(p04);

    let mut p05 = question("P05", Block::Deliverables, 1, Severity::Critical, AnswerType::MultiChoice);
    p05.prompt = "Which deliverables exist?".to_string();
    p05.options = vec![
        "final report".to_string(),
        "working papers".to_string(),
        "meeting minutes".to_string(),
        "none of the above".to_string(),
    ];
    p05.none_sentinel = Some(3);
    p05.action_if_negative = EscalationAction::RedFlag;
    p05.action_if_incomplete = EscalationAction::ForcedReview;
    questions.push(p05);

    let mut p06 = question("P06", Block::Deliverables, 2, Severity::Important, AnswerType::Scale);
    p06.prompt = "Is delivery evidence dated and attributable?".to_string();
    p06.options = vec![
        "contemporaneous".to_string(),
        "partially dated".to_string(),
        "undated".to_string(),
    ];
    p06.critical_threshold = Some(2);
    questions.push(p06);

    let mut p07 = question("P07", Block::Communications, 1, Severity::Informational, AnswerType::Scale);
    p07.prompt = "Are work communications retained?".to_string();
    p07.options = vec![
        "complete thread".to_string(),
        "partial".to_string(),
        "none".to_string(),
    ];
    p07.critical_threshold = Some(2);
    questions.push(p07);

    let mut p08 = question("P08", Block::Materiality, 1, Severity::Critical, AnswerType::Scale);
    p08.prompt = "How hard would this evidence be to fabricate after the fact?".to_string();
    p08.options = vec![
        "independently verifiable".to_string(),
        "difficult to fabricate".to_string(),
        "possible to fabricate".to_string(),
        "high probability of post-hoc fabrication".to_string(),
    ];
    p08.critical_threshold = Some(2);
    p08.action_if_negative = EscalationAction::RedFlag;
    p08.action_if_incomplete = EscalationAction::ForcedReview;
    questions.push(p08);

    let mut p09 = question("P09", Block::Materiality, 2, Severity::Important, AnswerType::SingleChoice);
    p09.prompt = "Does the provider have personnel and capacity?".to_string();
    p09.options = vec![
        "verified on site".to_string(),
        "declared only".to_string(),
        "no evidence".to_string(),
    ];
    p09.critical_threshold = Some(2);
    questions.push(p09);

    let mut p10 = question("P10", Block::BusinessPurpose, 1, Severity::Important, AnswerType::LongText);
    p10.prompt = "Business reason for the engagement".to_string();
    questions.push(p10);

    let mut p11 = question("P11", Block::BusinessPurpose, 2, Severity::Critical, AnswerType::Percentage);
    p11.prompt = "Expected benefit as a percentage of the fee".to_string();
    p11.acceptable_range = Some(AcceptableRange {
        min: 5.0,
        max: 10_000.0,
    });
    p11.action_if_negative = EscalationAction::RedFlag;
    p11.action_if_incomplete = EscalationAction::ForcedReview;
    questions.push(p11);

    let mut p12 = question("P12", Block::Communications, 2, Severity::Important, AnswerType::Scale);
    p12.prompt = "Are plant access logs retained?".to_string();
    p12.options = vec![
        "complete".to_string(),
        "partial".to_string(),
        "none".to_string(),
    ];
    p12.critical_threshold = Some(2);
    p12.applicability =
        Applicability::ServiceTypes(BTreeSet::from(["manufacturing".to_string()]));
    questions.push(p12);

    QuestionCatalog {
        version: "2026.1".to_string(),
        questions,
        weights: weights(),
    }
}

pub(super) fn weights() -> ScoringWeights {
    let mut layer_weights = BTreeMap::new();
    layer_weights.insert(
        Layer::Formal,
        BTreeMap::from([
            (Block::Documental, 0.20),
            (Block::Financial, 0.25),
            (Block::Deliverables, 0.35),
            (Block::Communications, 0.20),
        ]),
    );
    layer_weights.insert(Layer::Materiality, BTreeMap::from([(Block::Materiality, 1.0)]));
    layer_weights.insert(
        Layer::BusinessPurpose,
        BTreeMap::from([(Block::BusinessPurpose, 1.0)]),
    );
    ScoringWeights {
        layer_weights,
        critical_cap: 40.0,
        insufficient_threshold: 60.0,
        weak_threshold: 75.0,
        prior_min_sample: 5,
        prior_max_points: 5.0,
    }
}

/// Positive answer to every consulting question in the fixture catalog.
pub(super) fn positive_answers() -> Vec<(String, AnswerValue)> {
    vec![
        ("P01".to_string(), AnswerValue::Selection(0)),
        ("P02".to_string(), AnswerValue::Selection(0)),
        ("P03".to_string(), AnswerValue::Selection(0)),
        ("P04".to_string(), AnswerValue::Numeric(1_200_000.0)),
        ("P05".to_string(), AnswerValue::Selections(vec![0, 1])),
        ("P06".to_string(), AnswerValue::Selection(0)),
        ("P07".to_string(), AnswerValue::Selection(0)),
        ("P08".to_string(), AnswerValue::Selection(1)),
        ("P09".to_string(), AnswerValue::Selection(0)),
        (
            "P10".to_string(),
            AnswerValue::Text("Market entry analysis ahead of a planned expansion".to_string()),
        ),
        ("P11".to_string(), AnswerValue::Numeric(35.0)),
    ]
}

pub(super) fn answers_map(entries: &[(String, AnswerValue)]) -> BTreeMap<String, AnswerValue> {
    entries.iter().cloned().collect()
}

pub(super) fn open_request() -> OpenCaseRequest {
    OpenCaseRequest {
        subject_id: "op-7781".to_string(),
        industry: "professional_services".to_string(),
        service_type: "consulting".to_string(),
        amount: 1_200_000.0,
        counterparty_id: "cp-042".to_string(),
    }
}

pub(super) fn build_ledger() -> (
    CaseLedger<MemoryCaseRepository, MemoryProfileStore>,
    Arc<MemoryCaseRepository>,
    Arc<MemoryProfileStore>,
) {
    let repository = Arc::new(MemoryCaseRepository::default());
    let profiles = Arc::new(MemoryProfileStore::default());
    let catalog = Arc::new(ActiveCatalog::new(catalog()).expect("fixture catalog valid"));
    let ledger = CaseLedger::new(repository.clone(), profiles.clone(), catalog);
    (ledger, repository, profiles)
}

#[derive(Default)]
pub(super) struct MemoryCaseRepository {
    cases: RwLock<HashMap<CaseId, Arc<Mutex<Case>>>>,
}

impl CaseRepository for MemoryCaseRepository {
    fn insert(&self, case: Case) -> Result<(), RepositoryError> {
        let mut cases = self.cases.write().expect("case registry poisoned");
        if cases.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        cases.insert(case.id.clone(), Arc::new(Mutex::new(case)));
        Ok(())
    }

    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        let cases = self.cases.read().expect("case registry poisoned");
        Ok(cases
            .get(id)
            .map(|entry| entry.lock().expect("case mutex poisoned").clone()))
    }

    fn with_case<T, F>(&self, id: &CaseId, mutate: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Case) -> T,
    {
        let entry = {
            let cases = self.cases.read().expect("case registry poisoned");
            cases.get(id).cloned().ok_or(RepositoryError::NotFound)?
        };
        let mut case = entry.lock().expect("case mutex poisoned");
        Ok(mutate(&mut case))
    }
}

#[derive(Default)]
pub(super) struct MemoryProfileStore {
    profiles: Mutex<HashMap<SegmentKey, SegmentProfile>>,
}

impl SegmentProfileRepository for MemoryProfileStore {
    fn fetch(&self, segment: &SegmentKey) -> Result<Option<SegmentProfile>, RepositoryError> {
        let profiles = self.profiles.lock().expect("profile store poisoned");
        Ok(profiles.get(segment).cloned())
    }

    fn put(&self, mut profile: SegmentProfile, expected_version: u64) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.lock().expect("profile store poisoned");
        let current_version = profiles
            .get(&profile.segment)
            .map(|stored| stored.version)
            .unwrap_or(0);
        if current_version != expected_version {
            return Err(RepositoryError::Conflict);
        }
        profile.version = expected_version + 1;
        profiles.insert(profile.segment.clone(), profile);
        Ok(())
    }
}

/// Profile store whose writes always lose the version race.
#[derive(Default)]
pub(super) struct ContendedProfileStore;

impl SegmentProfileRepository for ContendedProfileStore {
    fn fetch(&self, _segment: &SegmentKey) -> Result<Option<SegmentProfile>, RepositoryError> {
        Ok(None)
    }

    fn put(&self, _profile: SegmentProfile, _expected: u64) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict)
    }
}
