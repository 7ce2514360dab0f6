use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use metrics_exporter_prometheus::PrometheusHandle;
use semaforo::catalog::{
    AcceptableRange, ActiveCatalog, AnswerType, Applicability, Block, CatalogError,
    EscalationAction, Layer, Question, QuestionCatalog, ScoringWeights, Severity,
};
use semaforo::defense::{DefenseCase, DefenseCaseId, DefenseRepository};
use semaforo::ledger::{
    Case, CaseId, CaseLedger, CaseRepository, RepositoryError, SegmentKey,
};
use semaforo::learning::{FeedbackLearner, SegmentProfile, SegmentProfileRepository};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wiring for the engine behind the HTTP surface: one ledger, one learner, one
/// defense registry, all sharing the in-memory stores and the active catalog.
pub(crate) struct Services {
    pub(crate) ledger: CaseLedger<InMemoryCaseRepository, InMemorySegmentProfileStore>,
    pub(crate) learner: FeedbackLearner<InMemoryCaseRepository, InMemorySegmentProfileStore>,
    pub(crate) defenses: Arc<InMemoryDefenseRepository>,
    pub(crate) catalog: Arc<ActiveCatalog>,
}

impl Services {
    pub(crate) fn in_memory(catalog: QuestionCatalog) -> Result<Arc<Self>, CatalogError> {
        let cases = Arc::new(InMemoryCaseRepository::default());
        let profiles = Arc::new(InMemorySegmentProfileStore::default());
        let catalog = Arc::new(ActiveCatalog::new(catalog)?);
        Ok(Arc::new(Self {
            ledger: CaseLedger::new(cases.clone(), profiles.clone(), catalog.clone()),
            learner: FeedbackLearner::new(cases, profiles),
            defenses: Arc::new(InMemoryDefenseRepository::default()),
            catalog,
        }))
    }
}

static DEFENSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_defense_id() -> DefenseCaseId {
    let id = DEFENSE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DefenseCaseId(format!("def-{id:06}"))
}

/// Case store keeping one mutex per case so concurrent writers to the same case
/// serialize while distinct cases proceed in parallel.
#[derive(Default)]
pub(crate) struct InMemoryCaseRepository {
    cases: RwLock<HashMap<CaseId, Arc<Mutex<Case>>>>,
}

impl CaseRepository for InMemoryCaseRepository {
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
pub(crate) struct InMemoryDefenseRepository {
    cases: RwLock<HashMap<DefenseCaseId, Arc<Mutex<DefenseCase>>>>,
}

impl DefenseRepository for InMemoryDefenseRepository {
    fn insert(&self, case: DefenseCase) -> Result<(), RepositoryError> {
        let mut cases = self.cases.write().expect("defense registry poisoned");
        if cases.contains_key(&case.id) {
            return Err(RepositoryError::Conflict);
        }
        cases.insert(case.id.clone(), Arc::new(Mutex::new(case)));
        Ok(())
    }

    fn fetch(&self, id: &DefenseCaseId) -> Result<Option<DefenseCase>, RepositoryError> {
        let cases = self.cases.read().expect("defense registry poisoned");
        Ok(cases
            .get(id)
            .map(|entry| entry.lock().expect("defense mutex poisoned").clone()))
    }

    fn with_case<T, F>(&self, id: &DefenseCaseId, mutate: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut DefenseCase) -> T,
    {
        let entry = {
            let cases = self.cases.read().expect("defense registry poisoned");
            cases.get(id).cloned().ok_or(RepositoryError::NotFound)?
        };
        let mut case = entry.lock().expect("defense mutex poisoned");
        Ok(mutate(&mut case))
    }
}

/// Version-checked profile store. `put` refuses writes whose expected version no
/// longer matches, which is what drives the learner's retry loop.
#[derive(Default)]
pub(crate) struct InMemorySegmentProfileStore {
    profiles: Mutex<HashMap<SegmentKey, SegmentProfile>>,
}

impl SegmentProfileRepository for InMemorySegmentProfileStore {
    fn fetch(&self, segment: &SegmentKey) -> Result<Option<SegmentProfile>, RepositoryError> {
        let profiles = self.profiles.lock().expect("profile store poisoned");
        Ok(profiles.get(segment).cloned())
    }

    fn put(
        &self,
        mut profile: SegmentProfile,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
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

fn question(
    id: &str,
    block: Block,
    ordinal: u16,
    prompt: &str,
    severity: Severity,
    answer_type: AnswerType,
) -> Question {
    Question {
        id: id.to_string(),
        block,
        ordinal,
        prompt: prompt.to_string(),
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

fn escalating(mut q: Question) -> Question {
    q.action_if_negative = EscalationAction::RedFlag;
    q.action_if_incomplete = EscalationAction::ForcedReview;
    q
}

fn critical(mut q: Question, threshold: usize) -> Question {
    q.critical_threshold = Some(threshold);
    escalating(q)
}

/// Built-in catalog the service boots with. Replaceable at runtime through
/// `POST /api/v1/catalog` without a restart.
pub(crate) fn default_catalog() -> QuestionCatalog {
    let mut questions = Vec::new();

    let mut q = question(
        "doc-01",
        Block::Documental,
        1,
        "Is a signed and dated contract for the service on file?",
        Severity::Critical,
        AnswerType::SingleChoice,
    );
    q.options = vec![
        "signed and dated".to_string(),
        "signed, undated".to_string(),
        "unsigned draft".to_string(),
        "no contract".to_string(),
    ];
    questions.push(critical(q, 2));

    let mut q = question(
        "doc-02",
        Block::Documental,
        2,
        "Do the issued invoices describe the service consistently with the contract?",
        Severity::Important,
        AnswerType::Scale,
    );
    q.options = vec![
        "fully consistent".to_string(),
        "minor mismatches".to_string(),
        "major mismatches".to_string(),
    ];
    q.alert_threshold = Some(1);
    q.critical_threshold = Some(2);
    questions.push(q);

    let mut q = question(
        "fin-01",
        Block::Financial,
        1,
        "Was the consideration paid through the banking system and traceable end to end?",
        Severity::Critical,
        AnswerType::SingleChoice,
    );
    q.options = vec![
        "fully traceable".to_string(),
        "partially traceable".to_string(),
        "cash or untraceable".to_string(),
    ];
    questions.push(critical(q, 2));

    let mut q = question(
        "fin-02",
        Block::Financial,
        2,
        "Total consideration agreed for the service",
        Severity::Important,
        AnswerType::Amount,
    );
    q.acceptable_range = Some(AcceptableRange {
        min: 0.0,
        max: 50_000_000.0,
    });
    questions.push(q);

    let mut q = question(
        "del-01",
        Block::Deliverables,
        1,
        "Which tangible deliverables of the service exist?",
        Severity::Critical,
        AnswerType::MultiChoice,
    );
    q.options = vec![
        "final report or study".to_string(),
        "working papers".to_string(),
        "meeting minutes".to_string(),
        "source files or models".to_string(),
        "none of the above".to_string(),
    ];
    q.none_sentinel = Some(4);
    questions.push(escalating(q));

    let mut q = question(
        "del-02",
        Block::Deliverables,
        2,
        "Is the delivery evidence dated and attributable to the provider's personnel?",
        Severity::Important,
        AnswerType::Scale,
    );
    q.options = vec![
        "contemporaneous and attributable".to_string(),
        "partially dated".to_string(),
        "undated or anonymous".to_string(),
    ];
    q.critical_threshold = Some(2);
    questions.push(q);

    let mut q = question(
        "com-01",
        Block::Communications,
        1,
        "Are work communications with the provider retained (mail, tickets, minutes)?",
        Severity::Informational,
        AnswerType::Scale,
    );
    q.options = vec![
        "complete thread".to_string(),
        "partial".to_string(),
        "none".to_string(),
    ];
    q.critical_threshold = Some(2);
    questions.push(q);

    let mut q = question(
        "mat-01",
        Block::Materiality,
        1,
        "How hard would the existing evidence be to fabricate after the fact?",
        Severity::Critical,
        AnswerType::Scale,
    );
    q.options = vec![
        "independently verifiable".to_string(),
        "difficult to fabricate".to_string(),
        "possible to fabricate".to_string(),
        "high probability of post-hoc fabrication".to_string(),
    ];
    questions.push(critical(q, 2));

    let mut q = question(
        "mat-02",
        Block::Materiality,
        2,
        "Does the provider demonstrably have the personnel and assets to render the service?",
        Severity::Important,
        AnswerType::SingleChoice,
    );
    q.options = vec![
        "verified on site".to_string(),
        "declared only".to_string(),
        "no evidence".to_string(),
    ];
    q.critical_threshold = Some(2);
    questions.push(q);

    let q = question(
        "biz-01",
        Block::BusinessPurpose,
        1,
        "Business reason for contracting the service",
        Severity::Important,
        AnswerType::LongText,
    );
    questions.push(q);

    let mut q = question(
        "biz-02",
        Block::BusinessPurpose,
        2,
        "Expected economic benefit as a percentage of the fee",
        Severity::Critical,
        AnswerType::Percentage,
    );
    q.acceptable_range = Some(AcceptableRange {
        min: 5.0,
        max: 10_000.0,
    });
    questions.push(escalating(q));

    let mut layer_weights = BTreeMap::new();
    layer_weights.insert(
        Layer::Formal,
        BTreeMap::from([
            (Block::Documental, 0.25),
            (Block::Financial, 0.25),
            (Block::Deliverables, 0.30),
            (Block::Communications, 0.20),
        ]),
    );
    layer_weights.insert(
        Layer::Materiality,
        BTreeMap::from([(Block::Materiality, 1.0)]),
    );
    layer_weights.insert(
        Layer::BusinessPurpose,
        BTreeMap::from([(Block::BusinessPurpose, 1.0)]),
    );

    QuestionCatalog {
        version: "builtin-2026.1".to_string(),
        questions,
        weights: ScoringWeights {
            layer_weights,
            critical_cap: 40.0,
            insufficient_threshold: 60.0,
            weak_threshold: 75.0,
            prior_min_sample: 5,
            prior_max_points: 5.0,
        },
    }
}
