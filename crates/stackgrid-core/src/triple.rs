//! Triples as delivered by the change feed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Object position of a triple: an IRI or a plain literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Term {
    Iri(String),
    Literal(String),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(value.into())
    }

    pub fn value(&self) -> &str {
        match self {
            Term::Iri(v) | Term::Literal(v) => v,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(v) => Some(v),
            Term::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Term::Literal(v) => Some(v),
            Term::Iri(_) => None,
        }
    }

    /// Boolean literal check (`"true"` or `"1"`).
    pub fn is_true(&self) -> bool {
        matches!(self.as_literal(), Some("true") | Some("1"))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(v) => write!(f, "<{v}>"),
            Term::Literal(v) => write!(f, "{v:?}"),
        }
    }
}

/// A subject/predicate/object statement. Subject and predicate are IRIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub s: String,
    pub p: String,
    pub o: Term,
}

impl Triple {
    pub fn new(s: impl Into<String>, p: impl Into<String>, o: Term) -> Self {
        Self {
            s: s.into(),
            p: p.into(),
            o,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {}", self.s, self.p, self.o)
    }
}
