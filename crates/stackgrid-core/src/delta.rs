//! Change-feed payload parsing.
//!
//! The store pushes `{"delta": [{"graph", "inserts", "deletes"}]}` bodies.
//! Each batch is parsed into typed triples once; a triple that is both
//! inserted and deleted in the same batch cancels out and is dropped from
//! both sides before anything is dispatched.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::{DeltaError, DeltaResult};
use crate::triple::{Term, Triple};
use crate::types::ResourceKind;

#[derive(Deserialize)]
struct RawPayload {
    delta: Vec<RawBatch>,
}

#[derive(Deserialize)]
struct RawBatch {
    graph: String,
    inserts: Vec<RawTriple>,
    deletes: Vec<RawTriple>,
}

#[derive(Deserialize)]
struct RawTriple {
    s: RawTerm,
    p: RawTerm,
    o: RawTerm,
}

#[derive(Deserialize)]
struct RawTerm {
    #[serde(rename = "type")]
    kind: Option<String>,
    value: String,
}

impl RawTriple {
    fn into_triple(self) -> DeltaResult<Triple> {
        let o = match self.o.kind.as_deref() {
            Some("uri") => Term::Iri(self.o.value),
            Some("literal") | Some("typed-literal") => Term::Literal(self.o.value),
            Some(other) => {
                return Err(DeltaError::ObjectType {
                    subject: self.s.value,
                    kind: other.to_string(),
                });
            }
            None => {
                return Err(DeltaError::Shape(format!(
                    "object of triple with subject {} has no type",
                    self.s.value
                )));
            }
        };
        Ok(Triple::new(self.s.value, self.p.value, o))
    }
}

/// One graph's worth of inserted and deleted triples.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaBatch {
    pub graph: String,
    pub inserts: Vec<Triple>,
    pub deletes: Vec<Triple>,
}

/// Triples of a single subject, tagged with the subject's resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectGroup {
    pub subject: String,
    pub kind: ResourceKind,
    pub inserts: Vec<Triple>,
    pub deletes: Vec<Triple>,
}

impl DeltaBatch {
    /// Build a batch, de-duplicating each side and cancelling triples that
    /// appear in both. First-seen order is preserved.
    pub fn new(graph: impl Into<String>, inserts: Vec<Triple>, deletes: Vec<Triple>) -> Self {
        let insert_set: HashSet<&Triple> = inserts.iter().collect();
        let delete_set: HashSet<&Triple> = deletes.iter().collect();
        let cancelled: HashSet<Triple> = insert_set
            .intersection(&delete_set)
            .map(|t| (*t).clone())
            .collect();

        Self {
            graph: graph.into(),
            inserts: dedup_except(inserts, &cancelled),
            deletes: dedup_except(deletes, &cancelled),
        }
    }

    /// Parse a raw change-feed body into its batches.
    pub fn parse(body: &[u8]) -> DeltaResult<Vec<DeltaBatch>> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        let payload: RawPayload =
            serde_json::from_value(value).map_err(|e| DeltaError::Shape(e.to_string()))?;

        payload
            .delta
            .into_iter()
            .map(|raw| {
                let inserts = raw
                    .inserts
                    .into_iter()
                    .map(RawTriple::into_triple)
                    .collect::<DeltaResult<Vec<_>>>()?;
                let deletes = raw
                    .deletes
                    .into_iter()
                    .map(RawTriple::into_triple)
                    .collect::<DeltaResult<Vec<_>>>()?;
                Ok(DeltaBatch::new(raw.graph, inserts, deletes))
            })
            .collect()
    }

    /// Pick the first batch addressed to `graph`, if any.
    pub fn select(batches: Vec<DeltaBatch>, graph: &str) -> Option<DeltaBatch> {
        batches.into_iter().find(|b| b.graph == graph)
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.deletes.is_empty()
    }

    /// Group triples by subject for every subject that classifies as a
    /// managed resource under `base`. Groups come out repositories first,
    /// then pipelines, then services, each in first-seen order.
    pub fn group_by_subject(&self, base: &str) -> Vec<SubjectGroup> {
        let mut groups: Vec<SubjectGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        let mut slot = |triple: &Triple| -> Option<usize> {
            if let Some(&i) = index.get(&triple.s) {
                return Some(i);
            }
            let kind = ResourceKind::classify(&triple.s, base)?;
            groups.push(SubjectGroup {
                subject: triple.s.clone(),
                kind,
                inserts: Vec::new(),
                deletes: Vec::new(),
            });
            index.insert(triple.s.clone(), groups.len() - 1);
            Some(groups.len() - 1)
        };

        let mut placed: Vec<(usize, bool, &Triple)> = Vec::new();
        for triple in &self.inserts {
            if let Some(i) = slot(triple) {
                placed.push((i, true, triple));
            }
        }
        for triple in &self.deletes {
            if let Some(i) = slot(triple) {
                placed.push((i, false, triple));
            }
        }
        for (i, insert, triple) in placed {
            if insert {
                groups[i].inserts.push(triple.clone());
            } else {
                groups[i].deletes.push(triple.clone());
            }
        }

        groups.sort_by_key(|g| g.kind);
        groups
    }
}

fn dedup_except(triples: Vec<Triple>, cancelled: &HashSet<Triple>) -> Vec<Triple> {
    let mut seen = HashSet::new();
    triples
        .into_iter()
        .filter(|t| !cancelled.contains(t) && seen.insert(t.clone()))
        .collect()
}
