use academy_leads::workflows::leads::{
    ConversionHooks, ConversionOutcome, ConversionRequest, EnrollmentDraft, EnrollmentError,
    EnrollmentId, EnrollmentWriter, Lead, LeadId, LeadRepository, LeadTransition,
    RepositoryError, TenantId,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

type LeadKey = (TenantId, LeadId);

#[derive(Default, Clone)]
pub(crate) struct InMemoryLeadRepository {
    leads: Arc<Mutex<HashMap<LeadKey, Lead>>>,
    transitions: Arc<Mutex<Vec<LeadTransition>>>,
}

impl LeadRepository for InMemoryLeadRepository {
    fn insert(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        let mut guard = lock(&self.leads)?;
        let key = (lead.tenant_id.clone(), lead.id.clone());
        if guard.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(key, lead.clone());
        Ok(lead)
    }

    fn update(&self, lead: Lead) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.leads)?;
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
        let guard = lock(&self.leads)?;
        Ok(guard.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    fn append_transition(&self, transition: LeadTransition) -> Result<(), RepositoryError> {
        lock(&self.transitions)?.push(transition);
        Ok(())
    }

    fn transitions(
        &self,
        tenant_id: &TenantId,
        id: &LeadId,
    ) -> Result<Vec<LeadTransition>, RepositoryError> {
        let guard = lock(&self.transitions)?;
        Ok(guard
            .iter()
            .filter(|transition| &transition.tenant_id == tenant_id && &transition.lead_id == id)
            .cloned()
            .collect())
    }
}

/// Enrollment store keyed by generated id. Re-enrolling the same lead into
/// the same course run is refused.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEnrollmentStore {
    sequence: Arc<AtomicU64>,
    enrollments: Arc<Mutex<HashMap<EnrollmentId, EnrollmentDraft>>>,
}

impl InMemoryEnrollmentStore {
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.enrollments
            .lock()
            .map(|guard| guard.len())
            .unwrap_or_default()
    }
}

impl EnrollmentWriter for InMemoryEnrollmentStore {
    fn create_enrollment(&self, draft: &EnrollmentDraft) -> Result<EnrollmentId, EnrollmentError> {
        let mut guard = self
            .enrollments
            .lock()
            .map_err(|_| EnrollmentError::Unavailable("enrollment store poisoned".to_string()))?;
        let duplicate = guard.values().any(|existing| {
            existing.tenant_id == draft.tenant_id
                && existing.lead_id == draft.lead_id
                && existing.course_run_id == draft.course_run_id
        });
        if duplicate {
            return Err(EnrollmentError::AlreadyEnrolled(draft.course_run_id.clone()));
        }

        let next = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = EnrollmentId(format!("enr-{next:06}"));
        guard.insert(id.clone(), draft.clone());
        Ok(id)
    }

    fn discard_enrollment(&self, id: &EnrollmentId) -> Result<(), EnrollmentError> {
        let mut guard = self
            .enrollments
            .lock()
            .map_err(|_| EnrollmentError::Unavailable("enrollment store poisoned".to_string()))?;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EnrollmentError::NotFound(id.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NotificationKind {
    Welcome,
    AdmissionsFollowUp,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Notification {
    pub(crate) kind: NotificationKind,
    pub(crate) tenant_id: TenantId,
    pub(crate) lead_id: LeadId,
    pub(crate) detail: String,
    pub(crate) queued_at: DateTime<Utc>,
}

/// Messages queued by conversion hooks for a downstream mailer.
#[derive(Default, Clone)]
pub(crate) struct NotificationOutbox {
    queued: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationOutbox {
    fn push(&self, kind: NotificationKind, request: &ConversionRequest, detail: String) {
        let notification = Notification {
            kind,
            tenant_id: request.tenant_id.clone(),
            lead_id: request.lead_id.clone(),
            detail,
            queued_at: Utc::now(),
        };
        match self.queued.lock() {
            Ok(mut guard) => guard.push(notification),
            Err(_) => warn!(lead_id = %request.lead_id, "notification outbox poisoned"),
        }
    }

    pub(crate) fn drain(&self) -> Vec<Notification> {
        self.queued
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

/// Conversion hooks that log each stage and queue the matching notification.
pub(crate) fn notification_hooks(outbox: NotificationOutbox) -> ConversionHooks {
    let post_outbox = outbox.clone();
    let failed_outbox = outbox;

    ConversionHooks::new()
        .on_pre_convert(|request: ConversionRequest| async move {
            info!(
                lead_id = %request.lead_id,
                tenant_id = %request.tenant_id,
                course_run_id = %request.course_run_id,
                "converting lead"
            );
            Ok(())
        })
        .on_post_convert(
            move |request: ConversionRequest, outcome: ConversionOutcome| {
                let outbox = post_outbox.clone();
                async move {
                    let enrollment = outcome
                        .enrollment_id
                        .map(|id| id.0)
                        .unwrap_or_default();
                    outbox.push(
                        NotificationKind::Welcome,
                        &request,
                        format!("enrolled in {} ({enrollment})", request.course_run_id),
                    );
                    Ok(())
                }
            },
        )
        .on_conversion_failed(move |request: ConversionRequest, errors: Vec<String>| {
            let outbox = failed_outbox.clone();
            async move {
                warn!(lead_id = %request.lead_id, ?errors, "lead conversion failed");
                outbox.push(
                    NotificationKind::AdmissionsFollowUp,
                    &request,
                    errors.join("; "),
                );
                Ok(())
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(tenant: &str, id: &str) -> Lead {
        Lead {
            id: LeadId(id.to_string()),
            tenant_id: TenantId(tenant.to_string()),
            email: "ada@example.com".to_string(),
            ..Lead::default()
        }
    }

    fn draft(lead_id: &str) -> EnrollmentDraft {
        EnrollmentDraft {
            lead_id: LeadId(lead_id.to_string()),
            tenant_id: TenantId("academy-north".to_string()),
            course_run_id: "run-1".to_string(),
            user_id: "advisor-1".to_string(),
            enrollment_data: None,
        }
    }

    #[test]
    fn repository_scopes_leads_by_tenant() {
        let repository = InMemoryLeadRepository::default();
        repository
            .insert(lead("academy-north", "lead-1"))
            .expect("insert succeeds");

        assert!(matches!(
            repository.insert(lead("academy-north", "lead-1")),
            Err(RepositoryError::Conflict)
        ));
        assert!(repository
            .fetch(&TenantId("academy-south".to_string()), &LeadId("lead-1".to_string()))
            .expect("fetch succeeds")
            .is_none());
        assert!(matches!(
            repository.update(lead("academy-south", "lead-1")),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn enrollment_store_refuses_duplicates_and_discards() {
        let store = InMemoryEnrollmentStore::default();
        let id = store.create_enrollment(&draft("lead-1")).expect("created");

        assert!(matches!(
            store.create_enrollment(&draft("lead-1")),
            Err(EnrollmentError::AlreadyEnrolled(_))
        ));
        store.discard_enrollment(&id).expect("discarded");
        assert_eq!(store.len(), 0);
        assert!(matches!(
            store.discard_enrollment(&id),
            Err(EnrollmentError::NotFound(_))
        ));
    }
}
