//! In-memory `ResourceStore` over a plain triple list.
//!
//! Used by tests across the workspace in place of the graph database. The
//! semantics mirror the query shapes in `sparql.rs`.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use stackgrid_core::{Status, Term, Trigger, Triple, vocab};

use crate::accessor::ResourceStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    NewService, RepositorySource, RunningService, ScalingBound, ServiceRecord, parse_scaling,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    triples: Mutex<Vec<Triple>>,
    failing_pings: AtomicU32,
    unreadable: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` pings fail.
    pub fn with_failing_pings(self, n: u32) -> Self {
        self.failing_pings.store(n, Ordering::SeqCst);
        self
    }

    /// Make every uuid lookup of `subject` fail from now on.
    pub fn fail_lookups_of(&self, subject: &str) {
        self.unreadable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(subject.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Triple>> {
        self.triples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, s: &str, p: &str, o: Term) {
        let triple = Triple::new(s, p, o);
        let mut triples = self.lock();
        if !triples.contains(&triple) {
            triples.push(triple);
        }
    }

    pub fn remove(&self, s: &str, p: &str, o: &Term) {
        self.lock().retain(|t| !(t.s == s && t.p == p && &t.o == o));
    }

    pub fn triples(&self) -> Vec<Triple> {
        self.lock().clone()
    }

    /// Triples with `subject` as subject.
    pub fn describe(&self, subject: &str) -> Vec<Triple> {
        self.lock().iter().filter(|t| t.s == subject).cloned().collect()
    }

    /// Whether `iri` appears as subject or object anywhere.
    pub fn mentions(&self, iri: &str) -> bool {
        self.lock()
            .iter()
            .any(|t| t.s == iri || t.o.as_iri() == Some(iri))
    }

    pub fn value(&self, s: &str, p: &str) -> Option<Term> {
        self.objects(s, p).into_iter().next()
    }

    pub fn objects(&self, s: &str, p: &str) -> Vec<Term> {
        self.lock()
            .iter()
            .filter(|t| t.s == s && t.p == p)
            .map(|t| t.o.clone())
            .collect()
    }

    fn subjects(&self, p: &str, o: &Term) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|t| t.p == p && &t.o == o)
            .map(|t| t.s.clone())
            .collect()
    }

    fn subject_for(&self, uuid: &str) -> Option<String> {
        self.subjects(vocab::MU_UUID, &Term::literal(uuid))
            .into_iter()
            .next()
    }

    fn uuid_of(&self, subject: &str) -> Option<String> {
        self.value(subject, vocab::MU_UUID)
            .map(|t| t.value().to_string())
    }

    fn has_type(&self, subject: &str, class: &str) -> bool {
        self.objects(subject, vocab::RDF_TYPE)
            .iter()
            .any(|t| t.as_iri() == Some(class))
    }

    fn replace(&self, s: &str, p: &str, o: Term) {
        let mut triples = self.lock();
        triples.retain(|t| !(t.s == s && t.p == p));
        triples.push(Triple::new(s, p, o));
    }

    fn scaling_of(&self, subject: &str) -> Option<u32> {
        self.value(subject, vocab::SCALING)
            .and_then(|t| parse_scaling(t.value()))
    }

    fn status_of(&self, subject: &str) -> Option<Status> {
        self.value(subject, vocab::STATUS)
            .and_then(|t| t.as_iri().and_then(Status::from_iri))
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        let failing = self
            .failing_pings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(StoreError::Unavailable("store not ready".into())),
            Err(_) => Ok(()),
        }
    }

    async fn resource_id(&self, subject: &str) -> StoreResult<Option<String>> {
        let unreadable = self
            .unreadable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(subject);
        if unreadable {
            return Err(StoreError::Unavailable(format!("lookup of {subject} failed")));
        }
        Ok(self.uuid_of(subject))
    }

    async fn subject_of(&self, uuid: &str) -> StoreResult<Option<String>> {
        Ok(self.subject_for(uuid))
    }

    async fn set_status(&self, uuid: &str, status: Status) -> StoreResult<()> {
        self.set_status_unless(uuid, status, &[]).await
    }

    async fn set_status_unless(
        &self,
        uuid: &str,
        status: Status,
        unless: &[Status],
    ) -> StoreResult<()> {
        let Some(subject) = self.subject_for(uuid) else {
            return Ok(());
        };
        if self.status_of(&subject).is_some_and(|c| unless.contains(&c)) {
            return Ok(());
        }
        self.replace(&subject, vocab::STATUS, Term::iri(status.iri()));
        Ok(())
    }

    async fn trigger_values(&self, uuid: &str, trigger: Trigger) -> StoreResult<Vec<Term>> {
        Ok(self
            .subject_for(uuid)
            .map(|s| self.objects(&s, trigger.predicate()))
            .unwrap_or_default())
    }

    async fn clear_trigger(&self, uuid: &str, trigger: Trigger) -> StoreResult<()> {
        if let Some(subject) = self.subject_for(uuid) {
            self.lock()
                .retain(|t| !(t.s == subject && t.p == trigger.predicate()));
        }
        Ok(())
    }

    async fn title(&self, uuid: &str) -> StoreResult<Option<String>> {
        Ok(self
            .subject_for(uuid)
            .and_then(|s| self.value(&s, vocab::DCT_TITLE))
            .map(|t| t.value().to_string()))
    }

    async fn service_pipeline(&self, service_uuid: &str) -> StoreResult<Option<String>> {
        let Some(service) = self.subject_for(service_uuid) else {
            return Ok(None);
        };
        Ok(self
            .subjects(vocab::SERVICES, &Term::iri(&service))
            .into_iter()
            .filter(|p| self.has_type(p, vocab::PIPELINE_CLASS))
            .find_map(|p| self.uuid_of(&p)))
    }

    async fn repository_source(&self, repository: &str) -> StoreResult<RepositorySource> {
        let text = |p: &str| {
            self.value(repository, p)
                .map(|t| t.value().to_string())
                .filter(|v| !v.is_empty())
        };
        Ok(RepositorySource {
            location: text(vocab::DOAP_LOCATION),
            branch: text(vocab::BRANCH),
        })
    }

    async fn repository_of_pipeline(&self, pipeline_uuid: &str) -> StoreResult<Option<String>> {
        Ok(self.subject_for(pipeline_uuid).and_then(|p| {
            self.subjects(vocab::PIPELINES, &Term::iri(&p))
                .into_iter()
                .next()
        }))
    }

    async fn repository_pipelines(&self, repository_uuid: &str) -> StoreResult<Vec<String>> {
        let Some(repository) = self.subject_for(repository_uuid) else {
            return Ok(Vec::new());
        };
        Ok(self
            .objects(&repository, vocab::PIPELINES)
            .iter()
            .filter_map(|o| o.as_iri().and_then(|p| self.uuid_of(p)))
            .collect())
    }

    async fn is_last_pipeline(&self, pipeline_uuid: &str) -> StoreResult<bool> {
        let Some(pipeline) = self.subject_for(pipeline_uuid) else {
            return Ok(false);
        };
        let shared = self
            .subjects(vocab::PIPELINES, &Term::iri(&pipeline))
            .iter()
            .any(|repository| {
                self.objects(repository, vocab::PIPELINES)
                    .iter()
                    .any(|o| o.as_iri() != Some(pipeline.as_str()))
            });
        Ok(!shared)
    }

    async fn insert_services(&self, pipeline: &str, services: &[NewService]) -> StoreResult<()> {
        for service in services {
            let s = service.subject.as_str();
            self.insert(pipeline, vocab::SERVICES, Term::iri(s));
            self.insert(s, vocab::MU_UUID, Term::literal(&service.uuid));
            self.insert(s, vocab::DCT_TITLE, Term::literal(&service.title));
            self.insert(s, vocab::SCALING, Term::literal("0"));
            self.insert(s, vocab::RDF_TYPE, Term::iri(vocab::SERVICE_CLASS));
            self.insert(s, vocab::STATUS, Term::iri(Status::Stopped.iri()));
        }
        Ok(())
    }

    async fn pipeline_services(&self, pipeline_uuid: &str) -> StoreResult<Vec<ServiceRecord>> {
        let Some(pipeline) = self.subject_for(pipeline_uuid) else {
            return Ok(Vec::new());
        };
        Ok(self
            .objects(&pipeline, vocab::SERVICES)
            .iter()
            .filter_map(|o| {
                let subject = o.as_iri()?.to_string();
                Some(ServiceRecord {
                    uuid: self.uuid_of(&subject)?,
                    title: self
                        .value(&subject, vocab::DCT_TITLE)
                        .map(|t| t.value().to_string())
                        .unwrap_or_default(),
                    status: self.status_of(&subject),
                    scaling: self.scaling_of(&subject).unwrap_or(0),
                    subject,
                })
            })
            .collect())
    }

    async fn set_scaling(&self, uuid: &str, scaling: u32) -> StoreResult<()> {
        if let Some(subject) = self.subject_for(uuid) {
            self.replace(&subject, vocab::SCALING, Term::literal(scaling.to_string()));
        }
        Ok(())
    }

    async fn adjust_scaling(&self, uuid: &str, bound: ScalingBound) -> StoreResult<u32> {
        let Some(subject) = self.subject_for(uuid) else {
            return Ok(bound.apply(None));
        };
        let value = bound.apply(self.scaling_of(&subject));
        self.replace(&subject, vocab::SCALING, Term::literal(value.to_string()));
        Ok(value)
    }

    async fn delete_resource(&self, subject: &str) -> StoreResult<()> {
        self.lock()
            .retain(|t| t.s != subject && t.o.as_iri() != Some(subject));
        Ok(())
    }

    async fn pipeline_by_project(&self, project: &str) -> StoreResult<Option<String>> {
        let project = project.to_lowercase();
        let triples = self.triples();
        Ok(triples
            .iter()
            .filter(|t| t.p == vocab::MU_UUID && t.o.value().to_lowercase() == project)
            .find(|t| self.has_type(&t.s, vocab::PIPELINE_CLASS))
            .map(|t| t.o.value().to_string()))
    }

    async fn service_by_title(
        &self,
        pipeline_uuid: &str,
        title: &str,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .pipeline_services(pipeline_uuid)
            .await?
            .into_iter()
            .find(|s| s.title == title)
            .map(|s| s.uuid))
    }

    async fn pending_triggers(&self) -> StoreResult<Vec<Triple>> {
        let triples = self.triples();
        let mut pending: Vec<Triple> = triples
            .iter()
            .filter(|t| Trigger::from_predicate(&t.p).is_some())
            .cloned()
            .collect();
        pending.extend(
            triples
                .iter()
                .filter(|t| t.p == vocab::PIPELINES)
                .filter(|t| {
                    t.o.as_iri().is_some_and(|p| {
                        self.has_type(p, vocab::PIPELINE_CLASS)
                            && self.value(p, vocab::STATUS).is_none()
                    })
                })
                .cloned(),
        );
        Ok(pending)
    }

    async fn running_services(&self) -> StoreResult<Vec<RunningService>> {
        let triples = self.triples();
        let mut running = Vec::new();
        for link in triples.iter().filter(|t| t.p == vocab::SERVICES) {
            let Some(service) = link.o.as_iri() else {
                continue;
            };
            if !self.has_type(&link.s, vocab::PIPELINE_CLASS) {
                continue;
            }
            if !self.status_of(service).is_some_and(|s| s.is_started()) {
                continue;
            }
            let (Some(pipeline), Some(service_id)) = (self.uuid_of(&link.s), self.uuid_of(service))
            else {
                continue;
            };
            running.push(RunningService {
                pipeline,
                service: service_id,
                title: self
                    .value(service, vocab::DCT_TITLE)
                    .map(|t| t.value().to_string())
                    .unwrap_or_default(),
                scaling: self.scaling_of(service).unwrap_or(0),
            });
        }
        Ok(running)
    }
}
