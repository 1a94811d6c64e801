//! Dependency catalog: which collections reference which roots.
//!
//! # Responsibility
//! - Enumerate, per root collection, the `(collection, foreign_key_field)`
//!   pairs that must be scanned for dependents.
//! - Validate configured rules before any cascade runs.
//!
//! # Invariants
//! - The catalog is immutable after construction.
//! - Entry order per root is the declaration order.
//! - No collection can reach itself through nested roots (acyclic).

use crate::model::clinic::collections::{
    APPOINTMENTS, DENTAL_CHART, INSURANCE_CLAIMS, INVOICES, INVOICE_FIELD, INVOICE_ITEMS,
    PATIENTS, PATIENT_FIELD, PATIENT_INSURANCE, PATIENT_TRANSFERS, PAYMENTS, PRESCRIPTIONS,
    TREATMENTS, TREATMENT_PLANS, TREATMENT_PLAN_FIELD, TREATMENT_PLAN_ITEMS, TREATMENT_RECORDS,
};
use crate::store::is_valid_identifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Clinic cascade rules as `(root, collection, foreign_key_field)`.
///
/// `payments.invoice` is not a rule: a payment recorded by another patient
/// against a purged invoice must block the delete, not vanish with it.
const CLINIC_RULES: &[(&str, &str, &str)] = &[
    (PATIENTS, APPOINTMENTS, PATIENT_FIELD),
    (PATIENTS, PATIENT_TRANSFERS, PATIENT_FIELD),
    (PATIENTS, TREATMENT_RECORDS, PATIENT_FIELD),
    (PATIENTS, TREATMENTS, PATIENT_FIELD),
    (PATIENTS, TREATMENT_PLANS, PATIENT_FIELD),
    (PATIENTS, PRESCRIPTIONS, PATIENT_FIELD),
    (PATIENTS, DENTAL_CHART, PATIENT_FIELD),
    (PATIENTS, PATIENT_INSURANCE, PATIENT_FIELD),
    (PATIENTS, INSURANCE_CLAIMS, PATIENT_FIELD),
    (PATIENTS, PAYMENTS, PATIENT_FIELD),
    (PATIENTS, INVOICES, PATIENT_FIELD),
    (INVOICES, INVOICE_ITEMS, INVOICE_FIELD),
    (TREATMENT_PLANS, TREATMENT_PLAN_ITEMS, TREATMENT_PLAN_FIELD),
];

/// One dependent collection of a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub collection: String,
    pub foreign_key_field: String,
}

/// Configuration form of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeRule {
    pub root: String,
    pub collection: String,
    pub foreign_key_field: String,
}

impl CascadeRule {
    pub fn new(
        root: impl Into<String>,
        collection: impl Into<String>,
        foreign_key_field: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            collection: collection.into(),
            foreign_key_field: foreign_key_field.into(),
        }
    }
}

/// Errors from catalog construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A root, collection or field is not a plain lowercase identifier.
    InvalidIdentifier(String),
    /// The same `(root, collection, field)` triple is declared twice.
    DuplicateRule(CascadeRule),
    /// Nested roots form a cycle; the path starts and ends at the same collection.
    Cycle(Vec<String>),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(value) => write!(f, "invalid catalog identifier `{value}`"),
            Self::DuplicateRule(rule) => write!(
                f,
                "duplicate cascade rule {}.{} -> {}",
                rule.collection, rule.foreign_key_field, rule.root
            ),
            Self::Cycle(path) => write!(f, "cascade rules form a cycle: {}", path.join(" -> ")),
        }
    }
}

impl Error for CatalogError {}

/// Fixed mapping from root collections to their dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyCatalog {
    roots: BTreeMap<String, Vec<DependencyEntry>>,
}

impl DependencyCatalog {
    /// Catalog for the clinic schema: patients, their invoices and their
    /// treatment plans.
    pub fn clinic_default() -> Self {
        let mut roots: BTreeMap<String, Vec<DependencyEntry>> = BTreeMap::new();
        for (root, collection, field) in CLINIC_RULES {
            roots
                .entry((*root).to_string())
                .or_default()
                .push(DependencyEntry {
                    collection: (*collection).to_string(),
                    foreign_key_field: (*field).to_string(),
                });
        }
        Self { roots }
    }

    /// Builds a catalog from configured rules, preserving their order per root.
    pub fn from_rules(rules: &[CascadeRule]) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        let mut roots: BTreeMap<String, Vec<DependencyEntry>> = BTreeMap::new();

        for rule in rules {
            for identifier in [&rule.root, &rule.collection, &rule.foreign_key_field] {
                if !is_valid_identifier(identifier) {
                    return Err(CatalogError::InvalidIdentifier(identifier.clone()));
                }
            }
            if !seen.insert((&rule.root, &rule.collection, &rule.foreign_key_field)) {
                return Err(CatalogError::DuplicateRule(rule.clone()));
            }
            roots
                .entry(rule.root.clone())
                .or_default()
                .push(DependencyEntry {
                    collection: rule.collection.clone(),
                    foreign_key_field: rule.foreign_key_field.clone(),
                });
        }

        let catalog = Self { roots };
        catalog.ensure_acyclic()?;
        Ok(catalog)
    }

    /// Ordered dependents of `root`. Empty when none are registered.
    pub fn entries_for(&self, root: &str) -> &[DependencyEntry] {
        self.roots
            .get(root)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Root collections with at least one registered dependent.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Total number of entries across all roots.
    pub fn len(&self) -> usize {
        self.roots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Rules equivalent to this catalog, roots in name order.
    pub fn rules(&self) -> Vec<CascadeRule> {
        self.roots
            .iter()
            .flat_map(|(root, entries)| {
                entries.iter().map(move |entry| {
                    CascadeRule::new(
                        root.as_str(),
                        entry.collection.as_str(),
                        entry.foreign_key_field.as_str(),
                    )
                })
            })
            .collect()
    }

    fn ensure_acyclic(&self) -> Result<(), CatalogError> {
        let mut done = BTreeSet::new();
        for root in self.roots.keys() {
            let mut path = Vec::new();
            self.visit(root, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        collection: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut BTreeSet<&'a str>,
    ) -> Result<(), CatalogError> {
        if done.contains(collection) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|item| *item == collection) {
            let mut cycle: Vec<String> = path[start..].iter().map(|item| item.to_string()).collect();
            cycle.push(collection.to_string());
            return Err(CatalogError::Cycle(cycle));
        }

        path.push(collection);
        for entry in self.entries_for(collection) {
            self.visit(&entry.collection, path, done)?;
        }
        path.pop();
        done.insert(collection);
        Ok(())
    }
}
