use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::config::LeadsConfig;
use crate::workflows::leads::{
    lead_router, ConversionHooks, ConversionOutcome, ConversionRequest, EnrollmentDraft,
    EnrollmentError, EnrollmentId, EnrollmentWriter, HookError, Lead, LeadCapture, LeadId,
    LeadLifecycleService, LeadRepository, LeadSource, LeadStatus, LeadTransition,
    PostConvertFailurePolicy, RepositoryError, TenantId,
};

pub(super) const TENANT: &str = "academy-north";

pub(super) fn tenant() -> TenantId {
    TenantId(TENANT.to_string())
}

pub(super) fn qualified_lead(id: &str) -> Lead {
    Lead {
        id: LeadId(id.to_string()),
        tenant_id: tenant(),
        email: "ada@example.com".to_string(),
        name: Some("Ada Lovelace".to_string()),
        status: LeadStatus::Qualified,
        gdpr_consent: true,
        ..Lead::default()
    }
}

pub(super) fn capture() -> LeadCapture {
    LeadCapture {
        email: "grace@example.com".to_string(),
        name: Some("Grace Hopper".to_string()),
        phone: Some("+1 555 0100".to_string()),
        source: Some(LeadSource::Referral),
        course_run_id: Some("run-2025-spring".to_string()),
        gdpr_consent: true,
        marketing_consent: true,
        tags: vec!["priority".to_string(), "  ".to_string()],
        ..LeadCapture::default()
    }
}

pub(super) fn request(
    lead_id: &str,
    tenant_id: &str,
    course: &str,
    user: &str,
) -> ConversionRequest {
    ConversionRequest {
        lead_id: LeadId(lead_id.to_string()),
        tenant_id: TenantId(tenant_id.to_string()),
        course_run_id: course.to_string(),
        user_id: user.to_string(),
        enrollment_data: None,
    }
}

/// Ordered record of hook and enrollment-store calls shared by one test.
#[derive(Clone, Default)]
pub(super) struct CallLog {
    events: Arc<Mutex<Vec<&'static str>>>,
    failures: Arc<Mutex<Vec<Vec<String>>>>,
}

impl CallLog {
    pub(super) fn events(&self) -> Vec<&'static str> {
        self.events.lock().expect("log mutex poisoned").clone()
    }

    pub(super) fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|name| **name == event).count()
    }

    pub(super) fn failures(&self) -> Vec<Vec<String>> {
        self.failures.lock().expect("log mutex poisoned").clone()
    }

    fn push(&self, event: &'static str) {
        self.events.lock().expect("log mutex poisoned").push(event);
    }
}

fn stage_result(stage: &'static str, failing: Option<&'static str>) -> Result<(), HookError> {
    if failing == Some(stage) {
        Err(HookError::new(format!("{stage} hook unavailable")))
    } else {
        Ok(())
    }
}

/// Hooks that log each call; the stage named in `failing` returns an error.
pub(super) fn recording_hooks(log: &CallLog, failing: Option<&'static str>) -> ConversionHooks {
    let pre_log = log.clone();
    let post_log = log.clone();
    let failed_log = log.clone();

    ConversionHooks::new()
        .on_pre_convert(move |_request: ConversionRequest| {
            let log = pre_log.clone();
            async move {
                log.push("pre_convert");
                stage_result("pre_convert", failing)
            }
        })
        .on_post_convert(
            move |_request: ConversionRequest, outcome: ConversionOutcome| {
                let log = post_log.clone();
                async move {
                    assert!(outcome.success, "post hook only sees successful outcomes");
                    log.push("post_convert");
                    stage_result("post_convert", failing)
                }
            },
        )
        .on_conversion_failed(move |_request: ConversionRequest, errors: Vec<String>| {
            let log = failed_log.clone();
            async move {
                log.push("conversion_failed");
                log.failures
                    .lock()
                    .expect("log mutex poisoned")
                    .push(errors);
                stage_result("conversion_failed", failing)
            }
        })
}

/// Lead store double. `break_updates` and `break_appends` make later writes
/// fail while reads keep working.
#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    leads: Arc<Mutex<HashMap<(TenantId, LeadId), Lead>>>,
    transitions: Arc<Mutex<Vec<LeadTransition>>>,
    fail_updates: Arc<AtomicBool>,
    fail_appends: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub(super) fn seed(&self, lead: Lead) {
        self.leads
            .lock()
            .expect("repository mutex poisoned")
            .insert((lead.tenant_id.clone(), lead.id.clone()), lead);
    }

    pub(super) fn stored(&self, tenant_id: &TenantId, id: &LeadId) -> Option<Lead> {
        self.fetch(tenant_id, id).expect("fetch succeeds")
    }

    pub(super) fn break_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub(super) fn break_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }
}

impl LeadRepository for MemoryRepository {
    fn insert(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        let mut guard = self.leads.lock().expect("repository mutex poisoned");
        let key = (lead.tenant_id.clone(), lead.id.clone());
        if guard.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(key, lead.clone());
        Ok(lead)
    }

    fn update(&self, lead: Lead) -> Result<(), RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("lead table locked".to_string()));
        }
        let mut guard = self.leads.lock().expect("repository mutex poisoned");
        let key = (lead.tenant_id.clone(), lead.id.clone());
        match guard.get_mut(&key) {
            Some(existing) => {
                *existing = lead;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, tenant_id: &TenantId, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let guard = self.leads.lock().expect("repository mutex poisoned");
        Ok(guard.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    fn append_transition(&self, transition: LeadTransition) -> Result<(), RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("audit table locked".to_string()));
        }
        self.transitions
            .lock()
            .expect("repository mutex poisoned")
            .push(transition);
        Ok(())
    }

    fn transitions(
        &self,
        tenant_id: &TenantId,
        id: &LeadId,
    ) -> Result<Vec<LeadTransition>, RepositoryError> {
        let guard = self.transitions.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .filter(|transition| &transition.tenant_id == tenant_id && &transition.lead_id == id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl LeadRepository for UnavailableRepository {
    fn insert(&self, _lead: Lead) -> Result<Lead, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _lead: Lead) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _tenant_id: &TenantId, _id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn append_transition(&self, _transition: LeadTransition) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn transitions(
        &self,
        _tenant_id: &TenantId,
        _id: &LeadId,
    ) -> Result<Vec<LeadTransition>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Enrollment store double. Failure switches let tests break the write or
/// the compensating discard.
#[derive(Default)]
pub(super) struct MemoryEnrollments {
    log: CallLog,
    sequence: AtomicU64,
    active: Mutex<Vec<(EnrollmentId, EnrollmentDraft)>>,
    fail_create: bool,
    fail_discard: bool,
}

impl MemoryEnrollments {
    pub(super) fn with_log(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub(super) fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(super) fn failing_discard(mut self) -> Self {
        self.fail_discard = true;
        self
    }

    pub(super) fn active(&self) -> Vec<(EnrollmentId, EnrollmentDraft)> {
        self.active.lock().expect("enrollment mutex poisoned").clone()
    }
}

impl EnrollmentWriter for MemoryEnrollments {
    fn create_enrollment(&self, draft: &EnrollmentDraft) -> Result<EnrollmentId, EnrollmentError> {
        self.log.push("create_enrollment");
        if self.fail_create {
            return Err(EnrollmentError::Unavailable("registrar offline".to_string()));
        }
        let next = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = EnrollmentId(format!("enr-{next}"));
        self.active
            .lock()
            .expect("enrollment mutex poisoned")
            .push((id.clone(), draft.clone()));
        Ok(id)
    }

    fn discard_enrollment(&self, id: &EnrollmentId) -> Result<(), EnrollmentError> {
        self.log.push("discard_enrollment");
        if self.fail_discard {
            return Err(EnrollmentError::Unavailable("registrar offline".to_string()));
        }
        let mut guard = self.active.lock().expect("enrollment mutex poisoned");
        let before = guard.len();
        guard.retain(|(existing, _)| existing != id);
        if guard.len() == before {
            return Err(EnrollmentError::NotFound(id.clone()));
        }
        Ok(())
    }
}

pub(super) type TestService = LeadLifecycleService<MemoryRepository, MemoryEnrollments>;

pub(super) fn build_service() -> (TestService, Arc<MemoryRepository>, Arc<MemoryEnrollments>) {
    build_service_with(
        ConversionHooks::default(),
        MemoryEnrollments::default(),
        PostConvertFailurePolicy::Compensate,
    )
}

pub(super) fn build_service_with(
    hooks: ConversionHooks,
    enrollments: MemoryEnrollments,
    policy: PostConvertFailurePolicy,
) -> (TestService, Arc<MemoryRepository>, Arc<MemoryEnrollments>) {
    let repository = Arc::new(MemoryRepository::default());
    let enrollments = Arc::new(enrollments);
    let config = LeadsConfig {
        post_convert_failure_policy: policy,
        ..LeadsConfig::default()
    };
    let service =
        LeadLifecycleService::new(repository.clone(), enrollments.clone(), hooks, &config);
    (service, repository, enrollments)
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    lead_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
