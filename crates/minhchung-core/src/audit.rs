//! # Integrity Audit
//!
//! Cross-checks stored rows against the bucket counters and the sequence
//! index. A clean registry satisfies, for every bucket:
//!
//! - rows ordered by id carry sequences `1..=N` with no gaps or repeats
//! - the bucket counter equals `N`
//! - the sequence index maps every `(bucket, seq)` to exactly its row
//! - every stored code re-derives from its department, criterion, seq and period
//!
//! The audit never stops at the first problem; it collects them all.

use crate::backup::Snapshot;
use crate::code::format_code;
use crate::{Bucket, EvidenceCodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Bucket the problem was found in, when it belongs to one.
    pub bucket: Option<Bucket>,
    pub detail: String,
}

/// Outcome of [`audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub buckets_checked: usize,
    pub codes_checked: usize,
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    fn flag(&mut self, bucket: Option<Bucket>, detail: String) {
        self.violations.push(Violation { bucket, detail });
    }
}

/// Audit a registry given its rows, its counters and its sequence index.
#[must_use]
pub fn audit(
    snapshot: &Snapshot,
    counters: &BTreeMap<Bucket, u32>,
    index: &BTreeMap<(Bucket, u32), EvidenceCodeId>,
) -> IntegrityReport {
    let mut report = IntegrityReport {
        codes_checked: snapshot.evidence_codes.len(),
        ..IntegrityReport::default()
    };

    let departments: BTreeMap<_, _> = snapshot.departments.iter().map(|d| (d.id, d)).collect();
    let criteria: BTreeMap<_, _> = snapshot.criteria.iter().map(|c| (c.id, c)).collect();

    let mut buckets: BTreeMap<Bucket, Vec<(EvidenceCodeId, u32)>> = BTreeMap::new();
    for record in &snapshot.evidence_codes {
        let bucket = record.bucket();
        buckets
            .entry(bucket)
            .or_default()
            .push((record.id, record.sequence_number.value()));

        match (
            departments.get(&record.department_id),
            criteria.get(&record.criterion_id),
        ) {
            (Some(department), Some(criterion)) => {
                let derived = format_code(
                    &department.code,
                    &criterion.code,
                    record.sequence_number,
                    record.period,
                );
                if derived != record.code {
                    report.flag(
                        Some(bucket),
                        format!("{} stored, {derived} derived", record.code),
                    );
                }
            }
            _ => report.flag(
                Some(bucket),
                format!("{} references a missing department or criterion", record.code),
            ),
        }

        match index.get(&(bucket, record.sequence_number.value())) {
            Some(id) if *id == record.id => {}
            Some(id) => report.flag(
                Some(bucket),
                format!(
                    "sequence {} indexed to row {id}, expected {}",
                    record.sequence_number, record.id
                ),
            ),
            None => report.flag(
                Some(bucket),
                format!("{} missing from the sequence index", record.code),
            ),
        }
    }

    for (bucket, rows) in &mut buckets {
        rows.sort_unstable();
        for (expected, (id, sequence)) in (1u32..).zip(rows.iter()) {
            if *sequence != expected {
                report.flag(
                    Some(*bucket),
                    format!("row {id} has sequence {sequence}, expected {expected}"),
                );
                break;
            }
        }
        let issued = u32::try_from(rows.len()).unwrap_or(u32::MAX);
        let counter = counters.get(bucket).copied().unwrap_or(0);
        if counter != issued {
            report.flag(
                Some(*bucket),
                format!("counter is {counter}, {issued} codes issued"),
            );
        }
    }

    for (bucket, counter) in counters {
        if *counter != 0 && !buckets.contains_key(bucket) {
            report.flag(
                Some(*bucket),
                format!("counter is {counter}, no codes issued"),
            );
        }
    }

    let row_ids: BTreeMap<_, _> = snapshot
        .evidence_codes
        .iter()
        .map(|e| (e.id, (e.bucket(), e.sequence_number.value())))
        .collect();
    for ((bucket, sequence), id) in index {
        if row_ids.get(id) != Some(&(*bucket, *sequence)) {
            report.flag(
                Some(*bucket),
                format!("index entry for sequence {sequence} points at row {id}, which does not hold it"),
            );
        }
    }

    report.buckets_checked = buckets.len();
    report
}
