//! # Snapshot Backup & Restore
//!
//! > `redb` files are not bit-identical across runs, so backups never copy the
//! > database file. A backup is a sorted `postcard` stream of every row plus
//! > the id counters, framed by a header carrying counts and a checksum.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [SnapshotHeader (postcard)] [Snapshot (postcard)]
//! ```
//!
//! Importing validates everything a restore would rely on (checksum, counts,
//! references, re-derived codes, gap-free buckets) before a single row is
//! written.

use crate::code::format_code;
use crate::{Bucket, Criterion, Department, EvidenceCode, McError, Period};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SNAPSHOT FORMAT
// =============================================================================

/// Magic bytes of a snapshot ("Minh Chung BacKup").
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"MCBK";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Upper bound on rows of any kind in an imported snapshot.
///
/// Checked against the header before the body is decoded.
pub const MAX_SNAPSHOT_ROWS: u64 = 5_000_000;

/// Header for snapshot files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub department_count: u64,
    pub criterion_count: u64,
    pub evidence_count: u64,
    /// FNV-1a of the encoded body.
    pub checksum: u64,
}

impl SnapshotHeader {
    /// Validate magic and version.
    ///
    /// Messages stay generic so a malformed upload learns nothing about the
    /// format.
    pub fn validate(&self) -> Result<(), McError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(McError::Serialization("Invalid backup format".to_string()));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(McError::Serialization(
                "Unsupported backup version".to_string(),
            ));
        }
        for count in [
            self.department_count,
            self.criterion_count,
            self.evidence_count,
        ] {
            if count > MAX_SNAPSHOT_ROWS {
                return Err(McError::Serialization(format!(
                    "Row count {count} exceeds maximum allowed {MAX_SNAPSHOT_ROWS}"
                )));
            }
        }
        Ok(())
    }
}

/// Full registry content, rows sorted by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub departments: Vec<Department>,
    pub criteria: Vec<Criterion>,
    pub evidence_codes: Vec<EvidenceCode>,
    pub next_department_id: u64,
    pub next_criterion_id: u64,
    pub next_evidence_code_id: u64,
}

impl Snapshot {
    /// Sort every row list by id so identical content encodes identically.
    pub fn normalize(&mut self) {
        self.departments.sort_by_key(|d| d.id);
        self.criteria.sort_by_key(|c| c.id);
        self.evidence_codes.sort_by_key(|e| e.id);
    }

    /// Check every invariant a restored registry relies on.
    pub fn validate(&self) -> Result<(), McError> {
        let departments = index_unique(
            &self.departments,
            "department",
            |d| d.id.0,
            |d| d.code.as_str(),
        )?;
        let criteria = index_unique(&self.criteria, "criterion", |c| c.id.0, |c| c.code.as_str())?;
        index_unique(&self.evidence_codes, "evidence code", |e| e.id.0, |e| e.code.as_str())?;

        check_next_id("department", self.next_department_id, &departments)?;
        check_next_id("criterion", self.next_criterion_id, &criteria)?;
        let max_evidence = self.evidence_codes.iter().map(|e| e.id.0).max().unwrap_or(0);
        if self.next_evidence_code_id <= max_evidence {
            return Err(McError::Integrity(format!(
                "next evidence code id {} is not above existing id {max_evidence}",
                self.next_evidence_code_id
            )));
        }

        let mut buckets: BTreeMap<Bucket, Vec<(u64, u32)>> = BTreeMap::new();
        for record in &self.evidence_codes {
            let department: &Department = departments
                .get(&record.department_id.0)
                .ok_or(McError::DepartmentNotFound(record.department_id))?;
            let criterion: &Criterion = criteria
                .get(&record.criterion_id.0)
                .ok_or(McError::CriterionNotFound(record.criterion_id))?;
            let period = Period::new(record.period.year(), record.period.month())?;
            if record.sequence_number.value() == 0 {
                return Err(McError::Integrity(format!(
                    "{} has sequence number 0",
                    record.code
                )));
            }
            let derived = format_code(
                &department.code,
                &criterion.code,
                record.sequence_number,
                period,
            );
            if derived != record.code {
                return Err(McError::Integrity(format!(
                    "stored code {} does not match derived {derived}",
                    record.code
                )));
            }
            buckets
                .entry(record.bucket())
                .or_default()
                .push((record.id.0, record.sequence_number.value()));
        }

        for (bucket, mut rows) in buckets {
            // creation order == id order
            rows.sort_unstable();
            for (expected, (_, sequence)) in (1u32..).zip(&rows) {
                if *sequence != expected {
                    return Err(McError::Integrity(format!(
                        "bucket {bucket} expected sequence {expected}, found {sequence}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Bucket counters implied by the rows: highest sequence per bucket.
    #[must_use]
    pub fn bucket_counters(&self) -> BTreeMap<Bucket, u32> {
        let mut counters = BTreeMap::new();
        for record in &self.evidence_codes {
            let entry = counters.entry(record.bucket()).or_insert(0u32);
            *entry = (*entry).max(record.sequence_number.value());
        }
        counters
    }
}

fn index_unique<'a, T>(
    rows: &'a [T],
    kind: &'static str,
    id: impl Fn(&T) -> u64,
    code: impl Fn(&T) -> &str,
) -> Result<BTreeMap<u64, &'a T>, McError> {
    let mut by_id = BTreeMap::new();
    let mut codes = BTreeSet::new();
    for row in rows {
        if by_id.insert(id(row), row).is_some() {
            return Err(McError::Integrity(format!(
                "duplicate {kind} id {}",
                id(row)
            )));
        }
        if !codes.insert(code(row).to_string()) {
            return Err(McError::DuplicateCode {
                kind,
                code: code(row).to_string(),
            });
        }
    }
    Ok(by_id)
}

fn check_next_id<T>(kind: &str, next: u64, rows: &BTreeMap<u64, T>) -> Result<(), McError> {
    let max = rows.keys().next_back().copied().unwrap_or(0);
    if next <= max {
        return Err(McError::Integrity(format!(
            "next {kind} id {next} is not above existing id {max}"
        )));
    }
    Ok(())
}

/// FNV-1a over a byte slice. Integer-only and order-sensitive.
#[must_use]
pub fn fnv1a(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Encode a snapshot. Rows are sorted first, so equal content yields equal bytes.
pub fn export_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, McError> {
    let mut sorted = snapshot.clone();
    sorted.normalize();

    let body = postcard::to_allocvec(&sorted)
        .map_err(|e| McError::Serialization(format!("Body: {e}")))?;
    let header = SnapshotHeader {
        magic: SNAPSHOT_MAGIC,
        version: SNAPSHOT_VERSION,
        department_count: sorted.departments.len() as u64,
        criterion_count: sorted.criteria.len() as u64,
        evidence_count: sorted.evidence_codes.len() as u64,
        checksum: fnv1a(&body),
    };
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| McError::Serialization(format!("Header: {e}")))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| McError::Serialization("Header too large".to_string()))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + body.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode and fully validate a snapshot.
pub fn import_snapshot(data: &[u8]) -> Result<Snapshot, McError> {
    let (len_bytes, rest) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| McError::Serialization("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    let (header_bytes, body) = rest
        .split_at_checked(header_len)
        .ok_or_else(|| McError::Serialization("Data too short for header".to_string()))?;

    let header: SnapshotHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| McError::Serialization(format!("Header: {e}")))?;
    header.validate()?;

    let computed = fnv1a(body);
    if computed != header.checksum {
        return Err(McError::Serialization(format!(
            "Checksum mismatch: expected {}, got {computed}",
            header.checksum
        )));
    }

    let snapshot: Snapshot = postcard::from_bytes(body)
        .map_err(|e| McError::Serialization(format!("Body: {e}")))?;
    if snapshot.departments.len() as u64 != header.department_count
        || snapshot.criteria.len() as u64 != header.criterion_count
        || snapshot.evidence_codes.len() as u64 != header.evidence_count
    {
        return Err(McError::Serialization("Row count mismatch".to_string()));
    }

    snapshot.validate()?;
    Ok(snapshot)
}

/// Read the checksum from encoded snapshot bytes without decoding the body.
pub fn snapshot_checksum(data: &[u8]) -> Result<u64, McError> {
    let (len_bytes, rest) = data
        .split_first_chunk::<4>()
        .ok_or_else(|| McError::Serialization("Data too short".to_string()))?;
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    let header_bytes = rest
        .get(..header_len)
        .ok_or_else(|| McError::Serialization("Data too short for header".to_string()))?;
    let header: SnapshotHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| McError::Serialization(format!("Header: {e}")))?;
    header.validate()?;
    Ok(header.checksum)
}

/// BLAKE3 digest of encoded snapshot bytes, hex encoded (64 characters).
///
/// Lets an operator verify a backup file out of band.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn snapshot_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CodeSegment, CriterionId, DepartmentId, EvidenceCodeId, SequenceNumber, UserId};
    use chrono::{TimeZone, Utc};

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0)
            .single()
            .expect("timestamp")
    }

    fn department(id: u64, code: &str) -> Department {
        Department {
            id: DepartmentId(id),
            code: CodeSegment::parse("code", code).expect("segment"),
            name: format!("Khoa {code}"),
            is_active: true,
            created_at: ts(),
        }
    }

    fn criterion(id: u64, code: &str) -> Criterion {
        Criterion {
            id: CriterionId(id),
            code: CodeSegment::parse("code", code).expect("segment"),
            name: format!("Tiêu chí {code}"),
            standard: Some("TC1".to_string()),
            is_active: true,
            created_at: ts(),
        }
    }

    fn evidence(id: u64, seq: u32) -> EvidenceCode {
        let period = Period::new(2026, 10).expect("period");
        let sequence = SequenceNumber::new(seq).expect("seq");
        EvidenceCode {
            id: EvidenceCodeId(id),
            code: format_code(
                &CodeSegment::parse("d", "CNTT").expect("segment"),
                &CodeSegment::parse("c", "1.1").expect("segment"),
                sequence,
                period,
            ),
            department_id: DepartmentId(1),
            criterion_id: CriterionId(1),
            sequence_number: sequence,
            period,
            description: None,
            created_by: UserId(1),
            is_active: true,
            created_at: ts(),
        }
    }

    fn sample() -> Snapshot {
        Snapshot {
            departments: vec![department(1, "CNTT")],
            criteria: vec![criterion(1, "1.1")],
            evidence_codes: vec![evidence(1, 1), evidence(2, 2)],
            next_department_id: 2,
            next_criterion_id: 2,
            next_evidence_code_id: 3,
        }
    }

    #[test]
    fn export_import_preserves_content() {
        let snapshot = sample();
        let bytes = export_snapshot(&snapshot).expect("export");
        let imported = import_snapshot(&bytes).expect("import");
        assert_eq!(imported, snapshot);
    }

    #[test]
    fn export_is_order_independent() {
        let mut shuffled = sample();
        shuffled.evidence_codes.reverse();
        assert_eq!(
            export_snapshot(&shuffled).expect("export"),
            export_snapshot(&sample()).expect("export")
        );
    }

    #[test]
    fn corrupted_body_fails_checksum() {
        let mut bytes = export_snapshot(&sample()).expect("export");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        assert!(matches!(
            import_snapshot(&bytes),
            Err(McError::Serialization(_))
        ));
    }

    #[test]
    fn truncated_data_rejected() {
        assert!(import_snapshot(&[1, 2]).is_err());
        assert!(import_snapshot(&[200, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn checksum_readable_from_header() {
        let bytes = export_snapshot(&sample()).expect("export");
        let checksum = snapshot_checksum(&bytes).expect("checksum");
        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(checksum, fnv1a(&bytes[4 + header_len..]));
    }

    #[test]
    fn gap_in_bucket_is_rejected() {
        let mut snapshot = sample();
        snapshot.evidence_codes[1] = evidence(2, 3);
        assert!(matches!(snapshot.validate(), Err(McError::Integrity(_))));
    }

    #[test]
    fn out_of_creation_order_is_rejected() {
        let mut snapshot = sample();
        snapshot.evidence_codes = vec![evidence(1, 2), evidence(2, 1)];
        assert!(matches!(snapshot.validate(), Err(McError::Integrity(_))));
    }

    #[test]
    fn tampered_code_is_rejected() {
        let mut snapshot = sample();
        snapshot.evidence_codes[0].code = "MC-CNTT-1.1-009-2026-10".to_string();
        assert!(matches!(snapshot.validate(), Err(McError::Integrity(_))));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut snapshot = sample();
        snapshot.criteria.clear();
        assert!(matches!(
            snapshot.validate(),
            Err(McError::CriterionNotFound(CriterionId(1)))
        ));
    }

    #[test]
    fn stale_next_id_is_rejected() {
        let mut snapshot = sample();
        snapshot.next_evidence_code_id = 2;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn duplicate_department_code_is_rejected() {
        let mut snapshot = sample();
        snapshot.departments.push(department(2, "CNTT"));
        snapshot.next_department_id = 3;
        assert!(matches!(
            snapshot.validate(),
            Err(McError::DuplicateCode { .. })
        ));
    }

    #[test]
    fn bucket_counters_track_highest_sequence() {
        let counters = sample().bucket_counters();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters.values().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn digest_is_hex_blake3() {
        let bytes = export_snapshot(&sample()).expect("export");
        let digest = snapshot_digest(&bytes);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, snapshot_digest(&bytes));
    }
}
