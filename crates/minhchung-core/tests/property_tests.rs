//! # Property-Based Tests
//!
//! Allocation invariants under arbitrary sequences of generate, delete and
//! month changes.

use chrono::{DateTime, Months, TimeZone, Utc};
use minhchung_core::{
    Bucket, CodeSegment, CriterionId, DepartmentId, EvidenceCode, EvidenceFilter, ManualClock,
    NewEvidenceCode, PageRequest, Period, Registry, SequenceNumber, UserId, format_code,
    parse_code,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Generate { department: u64, criterion: u64 },
    Delete { pick: usize },
    NextMonth,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1u64..=2, 1u64..=3).prop_map(|(department, criterion)| Op::Generate { department, criterion }),
        2 => any::<usize>().prop_map(|pick| Op::Delete { pick }),
        1 => Just(Op::NextMonth),
    ]
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0)
        .single()
        .expect("timestamp")
}

fn open_registry(clock: Arc<ManualClock>) -> (TempDir, Registry) {
    let temp = tempfile::tempdir().expect("temp dir");
    let registry = Registry::open(temp.path().join("prop.redb"), clock).expect("open");
    for code in ["CNTT", "KT"] {
        registry.create_department(code, code).expect("department");
    }
    for code in ["1.1", "1.2", "2.1"] {
        registry.create_criterion(code, code, None).expect("criterion");
    }
    (temp, registry)
}

fn all_codes(registry: &Registry) -> Vec<EvidenceCode> {
    registry
        .store()
        .snapshot()
        .expect("snapshot")
        .evidence_codes
}

/// Run ops and return every code issued, in issue order.
fn run(ops: &[Op]) -> (TempDir, Registry, Vec<EvidenceCode>) {
    let clock = Arc::new(ManualClock::new(start()));
    let (temp, registry) = open_registry(clock.clone());
    let mut now = start();
    let mut issued: Vec<EvidenceCode> = Vec::new();

    for op in ops {
        match op {
            Op::Generate {
                department,
                criterion,
            } => {
                let code = registry
                    .generate(&NewEvidenceCode {
                        department_id: DepartmentId(*department),
                        criterion_id: CriterionId(*criterion),
                        description: None,
                        created_by: UserId(1),
                    })
                    .expect("generate");
                issued.push(code);
            }
            Op::Delete { pick } => {
                if !issued.is_empty() {
                    let target = &issued[pick % issued.len()];
                    registry.soft_delete(target.id).expect("delete");
                }
            }
            Op::NextMonth => {
                now = now.checked_add_months(Months::new(1)).expect("month");
                clock.set(now);
            }
        }
    }
    (temp, registry, issued)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every bucket holds exactly the sequence numbers 1..=N, in creation order.
    #[test]
    fn buckets_are_contiguous(ops in vec(op(), 1..40)) {
        let (_temp, registry, issued) = run(&ops);

        let mut buckets: BTreeMap<Bucket, Vec<u32>> = BTreeMap::new();
        for code in &issued {
            buckets.entry(code.bucket()).or_default().push(code.sequence_number.value());
        }
        for (bucket, sequences) in &buckets {
            let expected: Vec<u32> = (1..=sequences.len() as u32).collect();
            prop_assert_eq!(sequences, &expected);
            let stored: Vec<u32> = registry
                .store()
                .bucket_sequences(*bucket)
                .expect("sequences")
                .into_iter()
                .map(SequenceNumber::value)
                .collect();
            prop_assert_eq!(&stored, &expected);
        }

        let report = registry.verify_integrity().expect("verify");
        prop_assert!(report.is_clean(), "{:?}", report.violations);
        prop_assert_eq!(report.codes_checked, issued.len());
    }

    /// Re-deriving a stored row's code reproduces it byte for byte.
    #[test]
    fn stored_codes_rederive(ops in vec(op(), 1..30)) {
        let (_temp, registry, _issued) = run(&ops);
        for record in all_codes(&registry) {
            let department = registry.department(record.department_id).expect("department");
            let criterion = registry.criterion(record.criterion_id).expect("criterion");
            let derived = format_code(
                &department.code,
                &criterion.code,
                record.sequence_number,
                record.period,
            );
            prop_assert_eq!(&derived, &record.code);

            let parsed = parse_code(&record.code).expect("parse");
            prop_assert_eq!(parsed.sequence, record.sequence_number);
            prop_assert_eq!(parsed.period, record.period);
        }
    }

    /// Soft deletes never change a row's code or free its number.
    #[test]
    fn soft_delete_never_frees_numbers(ops in vec(op(), 1..40)) {
        let (_temp, registry, issued) = run(&ops);
        let stored = all_codes(&registry);
        prop_assert_eq!(stored.len(), issued.len());
        for (before, after) in issued.iter().zip(&stored) {
            prop_assert_eq!(before.id, after.id);
            prop_assert_eq!(&before.code, &after.code);
            prop_assert_eq!(before.sequence_number, after.sequence_number);
        }

        // listing with no isActive filter still sees every row
        let page = registry
            .list(&EvidenceFilter::default(), PageRequest::new(Some(1), Some(100)))
            .expect("list");
        prop_assert_eq!(page.total, issued.len() as u64);

        // the next code in a touched bucket continues after the deleted ones
        if let Some(last) = issued.last() {
            let now_period = registry.current_period().expect("period");
            if last.period == now_period {
                let count = issued.iter().filter(|c| c.bucket() == last.bucket()).count() as u32;
                let next = registry
                    .generate(&NewEvidenceCode {
                        department_id: last.department_id,
                        criterion_id: last.criterion_id,
                        description: None,
                        created_by: UserId(2),
                    })
                    .expect("generate");
                prop_assert_eq!(next.sequence_number.value(), count + 1);
            }
        }
    }

    /// format_code is a pure function of its inputs and parse_code inverts it.
    #[test]
    fn code_format_is_deterministic(
        department in "[A-Z0-9.]{1,16}",
        criterion in "[A-Z0-9.]{1,16}",
        seq in 1u32..100_000,
        year in 1970u16..=9999,
        month in 1u8..=12,
    ) {
        let department = CodeSegment::parse("department", &department).expect("segment");
        let criterion = CodeSegment::parse("criterion", &criterion).expect("segment");
        let sequence = SequenceNumber::new(seq).expect("seq");
        let period = Period::new(year, month).expect("period");

        let code = format_code(&department, &criterion, sequence, period);
        prop_assert_eq!(&code, &format_code(&department, &criterion, sequence, period));

        let parsed = parse_code(&code).expect("parse");
        prop_assert_eq!(parsed.department, department);
        prop_assert_eq!(parsed.criterion, criterion);
        prop_assert_eq!(parsed.sequence, sequence);
        prop_assert_eq!(parsed.period, period);
    }
}
