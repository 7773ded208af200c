//! # redb-backed Registry Storage
//!
//! All registry state lives in one redb file. Every mutation runs inside a
//! single write transaction and redb admits one writer at a time, so an
//! allocation reads the bucket counter, claims the next number and writes the
//! row without any other allocation interleaving. A failed step aborts the
//! transaction and leaves no trace.
//!
//! | table | key | value |
//! |-------|-----|-------|
//! | `departments` | id | postcard `Department` |
//! | `department_codes` | code | id |
//! | `criteria` | id | postcard `Criterion` |
//! | `criterion_codes` | code | id |
//! | `evidence_codes` | id | postcard `EvidenceCode` |
//! | `code_index` | code string | id |
//! | `bucket_counters` | (dept, criterion, year, month) | highest issued sequence |
//! | `sequence_index` | (dept, criterion, year, month, seq) | id |
//! | `metadata` | name | next id |

use crate::audit::{IntegrityReport, audit};
use crate::backup::Snapshot;
use crate::code::format_code;
use crate::{
    Bucket, BucketKey, CodeSegment, Criterion, CriterionId, Department, DepartmentId,
    EvidenceCode, EvidenceCodeId, EvidenceFilter, McError, NewEvidenceCode, Page, PageRequest,
    Period, SequenceNumber,
};
use chrono::{DateTime, Utc};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, Table, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;

const DEPARTMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("departments");
const DEPARTMENT_CODES: TableDefinition<&str, u64> = TableDefinition::new("department_codes");
const CRITERIA: TableDefinition<u64, &[u8]> = TableDefinition::new("criteria");
const CRITERION_CODES: TableDefinition<&str, u64> = TableDefinition::new("criterion_codes");
const EVIDENCE_CODES: TableDefinition<u64, &[u8]> = TableDefinition::new("evidence_codes");
const CODE_INDEX: TableDefinition<&str, u64> = TableDefinition::new("code_index");
const BUCKET_COUNTERS: TableDefinition<BucketKey, u32> = TableDefinition::new("bucket_counters");
const SEQUENCE_INDEX: TableDefinition<SequenceKey, u64> = TableDefinition::new("sequence_index");
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_DEPARTMENT_ID: &str = "next_department_id";
const NEXT_CRITERION_ID: &str = "next_criterion_id";
const NEXT_EVIDENCE_CODE_ID: &str = "next_evidence_code_id";

/// (department, criterion, year, month, sequence)
type SequenceKey = (u64, u64, u16, u8, u32);

type RowTable = TableDefinition<'static, u64, &'static [u8]>;

fn io(e: impl std::fmt::Display) -> McError {
    McError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, McError> {
    postcard::to_allocvec(value).map_err(|e| McError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, McError> {
    postcard::from_bytes(bytes).map_err(|e| McError::Serialization(e.to_string()))
}

fn sequence_key(bucket: &Bucket, sequence: SequenceNumber) -> SequenceKey {
    let (department, criterion, year, month) = bucket.key();
    (department, criterion, year, month, sequence.value())
}

fn bucket_range(bucket: &Bucket) -> std::ops::RangeInclusive<SequenceKey> {
    let (department, criterion, year, month) = bucket.key();
    (department, criterion, year, month, 0)..=(department, criterion, year, month, u32::MAX)
}

fn get_record<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Option<T>, McError> {
    table
        .get(id)
        .map_err(io)?
        .map(|guard| decode(guard.value()))
        .transpose()
}

fn all_records<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
) -> Result<Vec<T>, McError> {
    let mut out = Vec::new();
    for entry in table.iter().map_err(io)? {
        let (_, value) = entry.map_err(io)?;
        out.push(decode(value.value())?);
    }
    Ok(out)
}

fn put_record<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    value: &T,
) -> Result<(), McError> {
    table.insert(id, encode(value)?.as_slice()).map_err(io)?;
    Ok(())
}

/// Load, change and rewrite one row.
fn update_row<T: Serialize + DeserializeOwned>(
    txn: &WriteTransaction,
    definition: RowTable,
    id: u64,
    missing: impl FnOnce() -> McError,
    change: impl FnOnce(&mut T),
) -> Result<T, McError> {
    let mut table = txn.open_table(definition).map_err(io)?;
    let mut row: T = get_record(&table, id)?.ok_or_else(missing)?;
    change(&mut row);
    put_record(&mut table, id, &row)?;
    Ok(row)
}

/// Hand out the id stored under `key` and bump it. Ids start at 1.
fn take_next_id(meta: &mut Table<'_, &'static str, u64>, key: &str) -> Result<u64, McError> {
    let id = meta.get(key).map_err(io)?.map(|v| v.value()).unwrap_or(1);
    let next = id
        .checked_add(1)
        .ok_or_else(|| McError::Integrity(format!("{key} overflowed")))?;
    meta.insert(key, next).map_err(io)?;
    Ok(id)
}

fn read_next_id(meta: &impl ReadableTable<&'static str, u64>, key: &str) -> Result<u64, McError> {
    Ok(meta.get(key).map_err(io)?.map(|v| v.value()).unwrap_or(1))
}

/// A disk-backed evidence-code registry.
///
/// All methods take `&self`; redb serializes writers internally, so one
/// store can be shared across threads behind an `Arc`.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a registry database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, McError> {
        let db = Database::create(path.as_ref()).map_err(io)?;
        let store = Self { db };
        store.write(|txn| {
            txn.open_table(DEPARTMENTS).map_err(io)?;
            txn.open_table(DEPARTMENT_CODES).map_err(io)?;
            txn.open_table(CRITERIA).map_err(io)?;
            txn.open_table(CRITERION_CODES).map_err(io)?;
            txn.open_table(EVIDENCE_CODES).map_err(io)?;
            txn.open_table(CODE_INDEX).map_err(io)?;
            txn.open_table(BUCKET_COUNTERS).map_err(io)?;
            txn.open_table(SEQUENCE_INDEX).map_err(io)?;
            txn.open_table(METADATA).map_err(io)?;
            Ok(())
        })?;
        Ok(store)
    }

    /// Run `op` in a write transaction. Commits on `Ok`, aborts on `Err`.
    fn write<T>(
        &self,
        op: impl FnOnce(&WriteTransaction) -> Result<T, McError>,
    ) -> Result<T, McError> {
        let txn = self.db.begin_write().map_err(io)?;
        match op(&txn) {
            Ok(value) => {
                txn.commit().map_err(io)?;
                Ok(value)
            }
            Err(e) => {
                txn.abort().map_err(io)?;
                Err(e)
            }
        }
    }

    fn read<T>(&self, op: impl FnOnce(&ReadTransaction) -> Result<T, McError>) -> Result<T, McError> {
        let txn = self.db.begin_read().map_err(io)?;
        op(&txn)
    }

    // =========================================================================
    // DEPARTMENTS
    // =========================================================================

    /// Insert a department. Its code must not be taken.
    pub fn create_department(
        &self,
        code: CodeSegment,
        name: String,
        now: DateTime<Utc>,
    ) -> Result<Department, McError> {
        self.write(|txn| {
            let mut codes = txn.open_table(DEPARTMENT_CODES).map_err(io)?;
            if codes.get(code.as_str()).map_err(io)?.is_some() {
                return Err(McError::DuplicateCode {
                    kind: "department",
                    code: code.to_string(),
                });
            }
            let mut meta = txn.open_table(METADATA).map_err(io)?;
            let id = take_next_id(&mut meta, NEXT_DEPARTMENT_ID)?;
            let department = Department {
                id: DepartmentId(id),
                code,
                name,
                is_active: true,
                created_at: now,
            };
            let mut rows = txn.open_table(DEPARTMENTS).map_err(io)?;
            put_record(&mut rows, id, &department)?;
            codes.insert(department.code.as_str(), id).map_err(io)?;
            Ok(department)
        })
    }

    pub fn department(&self, id: DepartmentId) -> Result<Option<Department>, McError> {
        self.read(|txn| get_record(&txn.open_table(DEPARTMENTS).map_err(io)?, id.0))
    }

    /// All departments, ordered by id.
    pub fn departments(&self) -> Result<Vec<Department>, McError> {
        self.read(|txn| all_records(&txn.open_table(DEPARTMENTS).map_err(io)?))
    }

    pub fn set_department_active(
        &self,
        id: DepartmentId,
        active: bool,
    ) -> Result<Department, McError> {
        self.write(|txn| {
            update_row(
                txn,
                DEPARTMENTS,
                id.0,
                || McError::DepartmentNotFound(id),
                |d: &mut Department| d.is_active = active,
            )
        })
    }

    // =========================================================================
    // CRITERIA
    // =========================================================================

    /// Insert a criterion. Its code must not be taken.
    pub fn create_criterion(
        &self,
        code: CodeSegment,
        name: String,
        standard: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Criterion, McError> {
        self.write(|txn| {
            let mut codes = txn.open_table(CRITERION_CODES).map_err(io)?;
            if codes.get(code.as_str()).map_err(io)?.is_some() {
                return Err(McError::DuplicateCode {
                    kind: "criterion",
                    code: code.to_string(),
                });
            }
            let mut meta = txn.open_table(METADATA).map_err(io)?;
            let id = take_next_id(&mut meta, NEXT_CRITERION_ID)?;
            let criterion = Criterion {
                id: CriterionId(id),
                code,
                name,
                standard,
                is_active: true,
                created_at: now,
            };
            let mut rows = txn.open_table(CRITERIA).map_err(io)?;
            put_record(&mut rows, id, &criterion)?;
            codes.insert(criterion.code.as_str(), id).map_err(io)?;
            Ok(criterion)
        })
    }

    pub fn criterion(&self, id: CriterionId) -> Result<Option<Criterion>, McError> {
        self.read(|txn| get_record(&txn.open_table(CRITERIA).map_err(io)?, id.0))
    }

    /// All criteria, ordered by id.
    pub fn criteria(&self) -> Result<Vec<Criterion>, McError> {
        self.read(|txn| all_records(&txn.open_table(CRITERIA).map_err(io)?))
    }

    pub fn set_criterion_active(&self, id: CriterionId, active: bool) -> Result<Criterion, McError> {
        self.write(|txn| {
            update_row(
                txn,
                CRITERIA,
                id.0,
                || McError::CriterionNotFound(id),
                |c: &mut Criterion| c.is_active = active,
            )
        })
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Issue the next code of the request's bucket.
    ///
    /// `stamp` yields the period and creation time. It runs after the write
    /// transaction opens, so sequence order and `created_at` order agree.
    /// Counter read, uniqueness checks, row insert, index inserts and counter
    /// bump share the transaction. If the number the counter points at is
    /// already claimed, nothing is written and `SequenceConflict` is returned.
    pub fn allocate(
        &self,
        request: &NewEvidenceCode,
        stamp: impl FnOnce() -> Result<(Period, DateTime<Utc>), McError>,
    ) -> Result<EvidenceCode, McError> {
        self.write(|txn| {
            let (period, now) = stamp()?;
            let department: Department =
                get_record(&txn.open_table(DEPARTMENTS).map_err(io)?, request.department_id.0)?
                    .ok_or(McError::DepartmentNotFound(request.department_id))?;
            if !department.is_active {
                return Err(McError::DepartmentInactive(department.id));
            }
            let criterion: Criterion =
                get_record(&txn.open_table(CRITERIA).map_err(io)?, request.criterion_id.0)?
                    .ok_or(McError::CriterionNotFound(request.criterion_id))?;
            if !criterion.is_active {
                return Err(McError::CriterionInactive(criterion.id));
            }

            let bucket = Bucket::new(department.id, criterion.id, period);
            let mut counters = txn.open_table(BUCKET_COUNTERS).map_err(io)?;
            let issued = counters
                .get(bucket.key())
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(0);
            let sequence = SequenceNumber::after(issued).ok_or(McError::SequenceOverflow(bucket))?;

            let mut sequences = txn.open_table(SEQUENCE_INDEX).map_err(io)?;
            let key = sequence_key(&bucket, sequence);
            if sequences.get(key).map_err(io)?.is_some() {
                return Err(McError::SequenceConflict { bucket, sequence });
            }
            let code = format_code(&department.code, &criterion.code, sequence, period);
            let mut codes = txn.open_table(CODE_INDEX).map_err(io)?;
            if codes.get(code.as_str()).map_err(io)?.is_some() {
                return Err(McError::SequenceConflict { bucket, sequence });
            }

            let mut meta = txn.open_table(METADATA).map_err(io)?;
            let id = take_next_id(&mut meta, NEXT_EVIDENCE_CODE_ID)?;
            let record = EvidenceCode {
                id: EvidenceCodeId(id),
                code,
                department_id: department.id,
                criterion_id: criterion.id,
                sequence_number: sequence,
                period,
                description: request.description.clone(),
                created_by: request.created_by,
                is_active: true,
                created_at: now,
            };
            let mut rows = txn.open_table(EVIDENCE_CODES).map_err(io)?;
            put_record(&mut rows, id, &record)?;
            codes.insert(record.code.as_str(), id).map_err(io)?;
            sequences.insert(key, id).map_err(io)?;
            counters.insert(bucket.key(), sequence.value()).map_err(io)?;
            Ok(record)
        })
    }

    /// Reset a bucket counter to the highest sequence actually issued.
    ///
    /// Returns the repaired counter value.
    pub fn repair_counter(&self, bucket: Bucket) -> Result<u32, McError> {
        self.write(|txn| {
            let sequences = txn.open_table(SEQUENCE_INDEX).map_err(io)?;
            let highest = sequences
                .range(bucket_range(&bucket))
                .map_err(io)?
                .next_back()
                .transpose()
                .map_err(io)?
                .map(|(key, _)| key.value().4)
                .unwrap_or(0);
            let mut counters = txn.open_table(BUCKET_COUNTERS).map_err(io)?;
            counters.insert(bucket.key(), highest).map_err(io)?;
            Ok(highest)
        })
    }

    /// Sequence numbers issued in a bucket, ascending.
    pub fn bucket_sequences(&self, bucket: Bucket) -> Result<Vec<SequenceNumber>, McError> {
        self.read(|txn| {
            let sequences = txn.open_table(SEQUENCE_INDEX).map_err(io)?;
            let mut out = Vec::new();
            for entry in sequences.range(bucket_range(&bucket)).map_err(io)? {
                let (key, _) = entry.map_err(io)?;
                let sequence = SequenceNumber::new(key.value().4)
                    .ok_or_else(|| McError::Integrity(format!("sequence 0 in bucket {bucket}")))?;
                out.push(sequence);
            }
            Ok(out)
        })
    }

    /// Overwrite a bucket counter. Lets tests reproduce a stale counter.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_counter(&self, bucket: Bucket, value: u32) -> Result<(), McError> {
        self.write(|txn| {
            let mut counters = txn.open_table(BUCKET_COUNTERS).map_err(io)?;
            counters.insert(bucket.key(), value).map_err(io)?;
            Ok(())
        })
    }

    // =========================================================================
    // EVIDENCE CODES
    // =========================================================================

    pub fn evidence_code(&self, id: EvidenceCodeId) -> Result<Option<EvidenceCode>, McError> {
        self.read(|txn| get_record(&txn.open_table(EVIDENCE_CODES).map_err(io)?, id.0))
    }

    /// Look a row up by its exact code string.
    pub fn evidence_code_by_code(&self, code: &str) -> Result<Option<EvidenceCode>, McError> {
        self.read(|txn| {
            let index = txn.open_table(CODE_INDEX).map_err(io)?;
            let Some(id) = index.get(code).map_err(io)?.map(|v| v.value()) else {
                return Ok(None);
            };
            get_record(&txn.open_table(EVIDENCE_CODES).map_err(io)?, id)
        })
    }

    /// Matching rows, newest first, cut to the requested page.
    pub fn list(
        &self,
        filter: &EvidenceFilter,
        page: PageRequest,
    ) -> Result<Page<EvidenceCode>, McError> {
        self.read(|txn| {
            let rows = txn.open_table(EVIDENCE_CODES).map_err(io)?;
            let offset = page.offset();
            let limit = page.limit as usize;
            let mut total = 0u64;
            let mut items = Vec::with_capacity(limit);
            for entry in rows.iter().map_err(io)?.rev() {
                let (_, value) = entry.map_err(io)?;
                let record: EvidenceCode = decode(value.value())?;
                if !filter.matches(&record) {
                    continue;
                }
                if total >= offset && items.len() < limit {
                    items.push(record);
                }
                total += 1;
            }
            Ok(Page {
                items,
                page: page.page,
                limit: page.limit,
                total,
            })
        })
    }

    /// Apply already-normalized mutable fields.
    ///
    /// `description`: `None` leaves it, `Some(None)` clears it.
    pub fn update_evidence_code(
        &self,
        id: EvidenceCodeId,
        description: Option<Option<String>>,
        is_active: Option<bool>,
    ) -> Result<EvidenceCode, McError> {
        self.write(|txn| {
            update_row(
                txn,
                EVIDENCE_CODES,
                id.0,
                || McError::EvidenceCodeNotFound(id),
                |record: &mut EvidenceCode| {
                    if let Some(description) = description {
                        record.description = description;
                    }
                    if let Some(active) = is_active {
                        record.is_active = active;
                    }
                },
            )
        })
    }

    // =========================================================================
    // SNAPSHOT / AUDIT
    // =========================================================================

    /// Every row and id counter, read in one transaction.
    pub fn snapshot(&self) -> Result<Snapshot, McError> {
        self.read(Self::read_snapshot)
    }

    fn read_snapshot(txn: &ReadTransaction) -> Result<Snapshot, McError> {
        let meta = txn.open_table(METADATA).map_err(io)?;
        Ok(Snapshot {
            departments: all_records(&txn.open_table(DEPARTMENTS).map_err(io)?)?,
            criteria: all_records(&txn.open_table(CRITERIA).map_err(io)?)?,
            evidence_codes: all_records(&txn.open_table(EVIDENCE_CODES).map_err(io)?)?,
            next_department_id: read_next_id(&meta, NEXT_DEPARTMENT_ID)?,
            next_criterion_id: read_next_id(&meta, NEXT_CRITERION_ID)?,
            next_evidence_code_id: read_next_id(&meta, NEXT_EVIDENCE_CODE_ID)?,
        })
    }

    /// Check stored rows, counters and indexes against each other.
    pub fn verify_integrity(&self) -> Result<IntegrityReport, McError> {
        self.read(|txn| {
            let snapshot = Self::read_snapshot(txn)?;

            let mut counters = BTreeMap::new();
            for entry in txn.open_table(BUCKET_COUNTERS).map_err(io)?.iter().map_err(io)? {
                let (key, value) = entry.map_err(io)?;
                counters.insert(Bucket::from_key(key.value())?, value.value());
            }

            let mut index = BTreeMap::new();
            for entry in txn.open_table(SEQUENCE_INDEX).map_err(io)?.iter().map_err(io)? {
                let (key, value) = entry.map_err(io)?;
                let (department, criterion, year, month, sequence) = key.value();
                let bucket = Bucket::from_key((department, criterion, year, month))?;
                index.insert((bucket, sequence), EvidenceCodeId(value.value()));
            }

            Ok(audit(&snapshot, &counters, &index))
        })
    }

    /// Replace the whole registry with a validated snapshot.
    ///
    /// Tables are dropped and rebuilt in one transaction; counters and
    /// indexes are derived from the rows.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), McError> {
        self.write(|txn| {
            txn.delete_table(DEPARTMENTS).map_err(io)?;
            txn.delete_table(DEPARTMENT_CODES).map_err(io)?;
            txn.delete_table(CRITERIA).map_err(io)?;
            txn.delete_table(CRITERION_CODES).map_err(io)?;
            txn.delete_table(EVIDENCE_CODES).map_err(io)?;
            txn.delete_table(CODE_INDEX).map_err(io)?;
            txn.delete_table(BUCKET_COUNTERS).map_err(io)?;
            txn.delete_table(SEQUENCE_INDEX).map_err(io)?;
            txn.delete_table(METADATA).map_err(io)?;

            {
                let mut rows = txn.open_table(DEPARTMENTS).map_err(io)?;
                let mut codes = txn.open_table(DEPARTMENT_CODES).map_err(io)?;
                for department in &snapshot.departments {
                    put_record(&mut rows, department.id.0, department)?;
                    codes
                        .insert(department.code.as_str(), department.id.0)
                        .map_err(io)?;
                }
            }
            {
                let mut rows = txn.open_table(CRITERIA).map_err(io)?;
                let mut codes = txn.open_table(CRITERION_CODES).map_err(io)?;
                for criterion in &snapshot.criteria {
                    put_record(&mut rows, criterion.id.0, criterion)?;
                    codes
                        .insert(criterion.code.as_str(), criterion.id.0)
                        .map_err(io)?;
                }
            }
            {
                let mut rows = txn.open_table(EVIDENCE_CODES).map_err(io)?;
                let mut codes = txn.open_table(CODE_INDEX).map_err(io)?;
                let mut sequences = txn.open_table(SEQUENCE_INDEX).map_err(io)?;
                for record in &snapshot.evidence_codes {
                    put_record(&mut rows, record.id.0, record)?;
                    codes.insert(record.code.as_str(), record.id.0).map_err(io)?;
                    sequences
                        .insert(
                            sequence_key(&record.bucket(), record.sequence_number),
                            record.id.0,
                        )
                        .map_err(io)?;
                }
            }
            {
                let mut counters = txn.open_table(BUCKET_COUNTERS).map_err(io)?;
                for (bucket, highest) in snapshot.bucket_counters() {
                    counters.insert(bucket.key(), highest).map_err(io)?;
                }
            }
            let mut meta = txn.open_table(METADATA).map_err(io)?;
            meta.insert(NEXT_DEPARTMENT_ID, snapshot.next_department_id)
                .map_err(io)?;
            meta.insert(NEXT_CRITERION_ID, snapshot.next_criterion_id)
                .map_err(io)?;
            meta.insert(NEXT_EVIDENCE_CODE_ID, snapshot.next_evidence_code_id)
                .map_err(io)?;
            Ok(())
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 5, 3, 0, 0)
            .single()
            .expect("timestamp")
    }

    fn october() -> Period {
        Period::new(2026, 10).expect("period")
    }

    fn at(period: Period) -> impl FnOnce() -> Result<(Period, DateTime<Utc>), McError> {
        move || Ok((period, now()))
    }

    fn seg(s: &str) -> CodeSegment {
        CodeSegment::parse("code", s).expect("segment")
    }

    /// Store with department CNTT (1) and criteria 1.1 (1), 1.2 (2).
    fn seeded(path: &Path) -> RedbStore {
        let store = RedbStore::open(path).expect("open db");
        store
            .create_department(seg("CNTT"), "Công nghệ thông tin".to_string(), now())
            .expect("department");
        store
            .create_criterion(seg("1.1"), "Tiêu chí 1.1".to_string(), None, now())
            .expect("criterion");
        store
            .create_criterion(seg("1.2"), "Tiêu chí 1.2".to_string(), None, now())
            .expect("criterion");
        store
    }

    fn request(criterion: u64) -> NewEvidenceCode {
        NewEvidenceCode {
            department_id: DepartmentId(1),
            criterion_id: CriterionId(criterion),
            description: None,
            created_by: UserId(9),
        }
    }

    #[test]
    fn allocation_numbers_from_one() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));

        let first = store.allocate(&request(1), at(october())).expect("allocate");
        let second = store.allocate(&request(1), at(october())).expect("allocate");

        assert_eq!(first.code, "MC-CNTT-1.1-001-2026-10");
        assert_eq!(second.code, "MC-CNTT-1.1-002-2026-10");
        assert_eq!(first.id, EvidenceCodeId(1));
        assert_eq!(second.id, EvidenceCodeId(2));
        assert_eq!(second.created_by, UserId(9));
        assert!(second.is_active);
    }

    #[test]
    fn buckets_are_independent() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));

        store.allocate(&request(1), at(october())).expect("allocate");
        store.allocate(&request(1), at(october())).expect("allocate");
        let other_criterion = store.allocate(&request(2), at(october())).expect("allocate");
        let next_month = store
            .allocate(&request(1), at(Period::new(2026, 11).expect("period")))
            .expect("allocate");

        assert_eq!(other_criterion.sequence_number, SequenceNumber::FIRST);
        assert_eq!(next_month.sequence_number, SequenceNumber::FIRST);
        assert_eq!(next_month.code, "MC-CNTT-1.1-001-2026-11");
    }

    #[test]
    fn unknown_and_inactive_references_rejected() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));

        let mut missing = request(1);
        missing.department_id = DepartmentId(42);
        assert!(matches!(
            store.allocate(&missing, at(october())),
            Err(McError::DepartmentNotFound(DepartmentId(42)))
        ));
        assert!(matches!(
            store.allocate(&request(7), at(october())),
            Err(McError::CriterionNotFound(CriterionId(7)))
        ));

        store
            .set_criterion_active(CriterionId(2), false)
            .expect("deactivate");
        assert!(matches!(
            store.allocate(&request(2), at(october())),
            Err(McError::CriterionInactive(CriterionId(2)))
        ));
        assert!(
            store
                .list(&EvidenceFilter::default(), PageRequest::default())
                .expect("list")
                .items
                .is_empty()
        );
    }

    #[test]
    fn duplicate_reference_codes_rejected() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        assert!(matches!(
            store.create_department(seg("cntt"), "Again".to_string(), now()),
            Err(McError::DuplicateCode { kind: "department", .. })
        ));
        assert!(matches!(
            store.create_criterion(seg("1.1"), "Again".to_string(), None, now()),
            Err(McError::DuplicateCode { kind: "criterion", .. })
        ));
        assert_eq!(store.departments().expect("departments").len(), 1);
    }

    #[test]
    fn failed_stamp_writes_nothing() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        let first = store.allocate(&request(1), at(october())).expect("allocate");

        let result = store.allocate(&request(1), || {
            Err(McError::validation("period", "clock out of range"))
        });
        assert!(matches!(result, Err(McError::Validation { .. })));

        let next = store.allocate(&request(1), at(october())).expect("allocate");
        assert_eq!(next.sequence_number.value(), 2);
        assert_eq!(next.id.0, first.id.0 + 1);
    }

    #[test]
    fn stale_counter_conflicts_without_writing() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        let first = store.allocate(&request(1), at(october())).expect("allocate");
        store.allocate(&request(1), at(october())).expect("allocate");

        store.set_counter(first.bucket(), 1).expect("set counter");
        let result = store.allocate(&request(1), at(october()));
        assert!(matches!(
            result,
            Err(McError::SequenceConflict { sequence, .. }) if sequence.value() == 2
        ));
        assert_eq!(
            store
                .list(&EvidenceFilter::default(), PageRequest::default())
                .expect("list")
                .total,
            2
        );

        assert_eq!(store.repair_counter(first.bucket()).expect("repair"), 2);
        let third = store.allocate(&request(1), at(october())).expect("allocate");
        assert_eq!(third.code, "MC-CNTT-1.1-003-2026-10");
    }

    #[test]
    fn soft_delete_keeps_sequence_taken() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        let first = store.allocate(&request(1), at(october())).expect("allocate");

        let deleted = store
            .update_evidence_code(first.id, None, Some(false))
            .expect("delete");
        assert!(!deleted.is_active);
        assert_eq!(deleted.code, first.code);

        let second = store.allocate(&request(1), at(october())).expect("allocate");
        assert_eq!(second.sequence_number.value(), 2);
        assert_eq!(
            store.bucket_sequences(first.bucket()).expect("sequences"),
            vec![SequenceNumber::FIRST, second.sequence_number]
        );
    }

    #[test]
    fn update_description_set_and_clear() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        let first = store.allocate(&request(1), at(october())).expect("allocate");

        let updated = store
            .update_evidence_code(first.id, Some(Some("Biên bản".to_string())), None)
            .expect("update");
        assert_eq!(updated.description.as_deref(), Some("Biên bản"));
        assert!(updated.is_active);

        let cleared = store
            .update_evidence_code(first.id, Some(None), None)
            .expect("update");
        assert_eq!(cleared.description, None);

        assert!(matches!(
            store.update_evidence_code(EvidenceCodeId(99), None, Some(false)),
            Err(McError::EvidenceCodeNotFound(EvidenceCodeId(99)))
        ));
    }

    #[test]
    fn lookup_by_code() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        let first = store.allocate(&request(1), at(october())).expect("allocate");

        let found = store
            .evidence_code_by_code("MC-CNTT-1.1-001-2026-10")
            .expect("lookup");
        assert_eq!(found, Some(first));
        assert_eq!(
            store
                .evidence_code_by_code("MC-CNTT-1.1-002-2026-10")
                .expect("lookup"),
            None
        );
    }

    #[test]
    fn list_newest_first_with_pages_and_filters() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        for criterion in [1, 2, 1, 2, 1] {
            store
                .allocate(&request(criterion), at(october()))
                .expect("allocate");
        }

        let first_page = store
            .list(&EvidenceFilter::default(), PageRequest::new(Some(1), Some(2)))
            .expect("list");
        assert_eq!(first_page.total, 5);
        assert_eq!(first_page.total_pages(), 3);
        let ids: Vec<u64> = first_page.items.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![5, 4]);

        let last_page = store
            .list(&EvidenceFilter::default(), PageRequest::new(Some(3), Some(2)))
            .expect("list");
        assert_eq!(last_page.items.len(), 1);

        let by_criterion = EvidenceFilter {
            criterion_id: Some(CriterionId(2)),
            ..EvidenceFilter::default()
        };
        let page = store.list(&by_criterion, PageRequest::default()).expect("list");
        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|e| e.criterion_id == CriterionId(2)));
    }

    #[test]
    fn persistence_continues_numbering() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let store = seeded(&db_path);
            store.allocate(&request(1), at(october())).expect("allocate");
        }

        {
            let store = RedbStore::open(&db_path).expect("reopen");
            let second = store.allocate(&request(1), at(october())).expect("allocate");
            assert_eq!(second.code, "MC-CNTT-1.1-002-2026-10");
            assert_eq!(second.id, EvidenceCodeId(2));
        }
    }

    #[test]
    fn fresh_store_is_clean() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        for _ in 0..3 {
            store.allocate(&request(1), at(october())).expect("allocate");
        }
        let report = store.verify_integrity().expect("verify");
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.buckets_checked, 1);
        assert_eq!(report.codes_checked, 3);
    }

    #[test]
    fn verify_reports_stale_counter() {
        let temp = tempdir().expect("temp dir");
        let store = seeded(&temp.path().join("test.redb"));
        let first = store.allocate(&request(1), at(october())).expect("allocate");
        store.set_counter(first.bucket(), 5).expect("set counter");

        let report = store.verify_integrity().expect("verify");
        assert!(!report.is_clean());
    }

    #[test]
    fn snapshot_restore_into_fresh_store() {
        let temp = tempdir().expect("temp dir");
        let source = seeded(&temp.path().join("source.redb"));
        source.allocate(&request(1), at(october())).expect("allocate");
        source.allocate(&request(2), at(october())).expect("allocate");
        let snapshot = source.snapshot().expect("snapshot");

        let target = RedbStore::open(temp.path().join("target.redb")).expect("open db");
        target
            .create_department(seg("KT"), "Kinh tế".to_string(), now())
            .expect("department");
        target.restore(&snapshot).expect("restore");

        assert_eq!(target.snapshot().expect("snapshot"), snapshot);
        assert!(target.verify_integrity().expect("verify").is_clean());
        let next = target.allocate(&request(1), at(october())).expect("allocate");
        assert_eq!(next.code, "MC-CNTT-1.1-002-2026-10");
        assert_eq!(next.id, EvidenceCodeId(3));
    }
}
