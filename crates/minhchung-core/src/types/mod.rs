//! # Core Type Definitions
//!
//! This module contains all core types for the evidence-code registry:
//! - Identifiers (`DepartmentId`, `CriterionId`, `EvidenceCodeId`, `UserId`)
//! - Allocation coordinates (`Period`, `Bucket`, `SequenceNumber`)
//! - Reference data (`CodeSegment`, `Department`, `Criterion`)
//! - The issued record (`EvidenceCode`) and its request/patch/filter shapes
//! - Error types (`McError`)
//!
//! All identifiers are plain integers with a total order, so every listing
//! and snapshot built from them is deterministic.

use crate::primitives::{
    DEFAULT_PAGE_LIMIT, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH, MAX_PAGE_LIMIT,
    MAX_SEARCH_LENGTH, MAX_SEGMENT_LENGTH, MAX_YEAR, MIN_YEAR,
};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Server-assigned identifier of a department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub u64);

/// Server-assigned identifier of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CriterionId(pub u64);

/// Server-assigned identifier of an issued evidence code row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvidenceCodeId(pub u64);

/// Identifier of the user who issued a code.
///
/// User accounts live outside the registry; the id is recorded as given by
/// the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl UserId {
    /// The built-in user that acts when authentication is disabled.
    pub const SYSTEM: Self = Self(0);
}

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(DepartmentId, CriterionId, EvidenceCodeId, UserId);

// =============================================================================
// SEQUENCE NUMBER
// =============================================================================

/// Position of a code inside its bucket. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(u32);

impl SequenceNumber {
    /// The first number handed out in every bucket.
    pub const FIRST: Self = Self(1);

    /// Wrap a raw value; zero is not a valid sequence number.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    /// The number that follows `issued` codes already present in a bucket.
    ///
    /// Returns `None` when the bucket is full (`u32::MAX` codes).
    #[must_use]
    pub const fn after(issued: u32) -> Option<Self> {
        match issued.checked_add(1) {
            Some(next) => Some(Self(next)),
            None => None,
        }
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// PERIOD & BUCKET
// =============================================================================

/// Year and month a code was allocated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// Create a period, rejecting months outside 1..=12 and years that do not
    /// render as four digits.
    pub fn new(year: u16, month: u8) -> Result<Self, McError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(McError::validation(
                "year",
                format!("{year} is outside {MIN_YEAR}..={MAX_YEAR}"),
            ));
        }
        if !(1..=12).contains(&month) {
            return Err(McError::validation(
                "month",
                format!("{month} is outside 1..=12"),
            ));
        }
        Ok(Self { year, month })
    }

    /// Derive the period from a timestamp in the timezone it carries.
    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Result<Self, McError> {
        let year = u16::try_from(at.year())
            .map_err(|_| McError::validation("year", format!("{} is negative", at.year())))?;
        Self::new(year, at.month() as u8)
    }

    /// Four-digit year.
    #[must_use]
    pub const fn year(self) -> u16 {
        self.year
    }

    /// Month, 1..=12.
    #[must_use]
    pub const fn month(self) -> u8 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Raw redb key of a bucket: (department, criterion, year, month).
pub type BucketKey = (u64, u64, u16, u8);

/// The scope inside which sequence numbers are unique and contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub department: DepartmentId,
    pub criterion: CriterionId,
    pub period: Period,
}

impl Bucket {
    #[must_use]
    pub const fn new(department: DepartmentId, criterion: CriterionId, period: Period) -> Self {
        Self {
            department,
            criterion,
            period,
        }
    }

    /// Storage key of this bucket.
    #[must_use]
    pub const fn key(&self) -> BucketKey {
        (
            self.department.0,
            self.criterion.0,
            self.period.year,
            self.period.month,
        )
    }

    /// Rebuild a bucket from its storage key.
    pub fn from_key(key: BucketKey) -> Result<Self, McError> {
        let (department, criterion, year, month) = key;
        Ok(Self::new(
            DepartmentId(department),
            CriterionId(criterion),
            Period::new(year, month)?,
        ))
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "department={} criterion={} period={}",
            self.department, self.criterion, self.period
        )
    }
}

// =============================================================================
// CODE SEGMENT
// =============================================================================

/// A department or criterion code as it appears inside an evidence code.
///
/// 1..=`MAX_SEGMENT_LENGTH` characters of `A-Z`, `0-9` and `.`. Input is
/// upper-cased. `-` is the field separator and therefore never allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeSegment(String);

impl CodeSegment {
    /// Validate and normalize a segment. `field` names the input in errors.
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, McError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(McError::validation(field, "must not be empty"));
        }
        if normalized.len() > MAX_SEGMENT_LENGTH {
            return Err(McError::validation(
                field,
                format!("longer than {MAX_SEGMENT_LENGTH} characters"),
            ));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '.'))
        {
            return Err(McError::validation(
                field,
                format!("character '{bad}' is not allowed"),
            ));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim a display name and enforce length bounds.
pub fn validate_name(field: &'static str, raw: &str) -> Result<String, McError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(McError::validation(field, "must not be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(McError::validation(
            field,
            format!("longer than {MAX_NAME_LENGTH} bytes"),
        ));
    }
    Ok(name.to_string())
}

/// Normalize an optional description: blank becomes `None`.
pub fn normalize_description(raw: Option<&str>) -> Result<Option<String>, McError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.len() > MAX_DESCRIPTION_LENGTH {
        return Err(McError::validation(
            "description",
            format!("longer than {MAX_DESCRIPTION_LENGTH} bytes"),
        ));
    }
    Ok(Some(text.to_string()))
}

// =============================================================================
// REFERENCE DATA
// =============================================================================

/// An organizational unit that owns evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub code: CodeSegment,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A quality criterion evidence is filed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub code: CodeSegment,
    pub name: String,
    /// Label of the standard this criterion belongs to, if any.
    pub standard: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// EVIDENCE CODE
// =============================================================================

/// An issued evidence code.
///
/// `code`, the bucket coordinates, `sequence_number`, `created_by` and
/// `created_at` never change after allocation. Only `description` and
/// `is_active` are mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCode {
    pub id: EvidenceCodeId,
    pub code: String,
    pub department_id: DepartmentId,
    pub criterion_id: CriterionId,
    pub sequence_number: SequenceNumber,
    pub period: Period,
    pub description: Option<String>,
    pub created_by: UserId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl EvidenceCode {
    /// The bucket this code was numbered in.
    #[must_use]
    pub const fn bucket(&self) -> Bucket {
        Bucket::new(self.department_id, self.criterion_id, self.period)
    }
}

/// Input of a generate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvidenceCode {
    pub department_id: DepartmentId,
    pub criterion_id: CriterionId,
    pub description: Option<String>,
    pub created_by: UserId,
}

/// The mutable subset of an evidence code.
///
/// A blank `description` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceCodePatch {
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl EvidenceCodePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.is_active.is_none()
    }
}

// =============================================================================
// LISTING
// =============================================================================

/// Filters for listing evidence codes. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceFilter {
    pub department_id: Option<DepartmentId>,
    pub criterion_id: Option<CriterionId>,
    pub year: Option<u16>,
    pub month: Option<u8>,
    /// Case-insensitive substring of the code or description.
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

impl EvidenceFilter {
    /// Reject malformed filters before touching storage.
    pub fn validate(&self) -> Result<(), McError> {
        if let Some(month) = self.month {
            if !(1..=12).contains(&month) {
                return Err(McError::validation("month", format!("{month} is outside 1..=12")));
            }
        }
        if let Some(search) = &self.search {
            if search.len() > MAX_SEARCH_LENGTH {
                return Err(McError::validation(
                    "search",
                    format!("longer than {MAX_SEARCH_LENGTH} bytes"),
                ));
            }
        }
        Ok(())
    }

    /// Check a record against every set filter.
    #[must_use]
    pub fn matches(&self, record: &EvidenceCode) -> bool {
        if self.department_id.is_some_and(|d| d != record.department_id)
            || self.criterion_id.is_some_and(|c| c != record.criterion_id)
            || self.year.is_some_and(|y| y != record.period.year())
            || self.month.is_some_and(|m| m != record.period.month())
            || self.is_active.is_some_and(|a| a != record.is_active)
        {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                record.code.to_lowercase().contains(&needle)
                    || record
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
        }
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    /// Clamp page to >= 1 and limit to 1..=`MAX_PAGE_LIMIT`.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    /// Number of matching rows to skip before this page starts.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)).saturating_mul(u64::from(self.limit))
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` rows, never less than 1.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        let limit = u64::from(self.limit.max(1));
        self.total.div_ceil(limit).max(1)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the registry.
///
/// - No silent failures
/// - Use `Result<T, McError>` for fallible operations
/// - The registry never panics; every error is recoverable
#[derive(Debug, Error)]
pub enum McError {
    /// The referenced department does not exist.
    #[error("Department not found: {0}")]
    DepartmentNotFound(DepartmentId),

    /// The referenced criterion does not exist.
    #[error("Criterion not found: {0}")]
    CriterionNotFound(CriterionId),

    /// No evidence code row with this id.
    #[error("Evidence code not found: {0}")]
    EvidenceCodeNotFound(EvidenceCodeId),

    /// No evidence code row with this code string.
    #[error("Evidence code not found: {0}")]
    CodeNotFound(String),

    /// The department exists but has been deactivated.
    #[error("Department {0} is inactive")]
    DepartmentInactive(DepartmentId),

    /// The criterion exists but has been deactivated.
    #[error("Criterion {0} is inactive")]
    CriterionInactive(CriterionId),

    /// A department or criterion with this code already exists.
    #[error("Duplicate {kind} code: {code}")]
    DuplicateCode { kind: &'static str, code: String },

    /// Input failed validation.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The sequence number picked for a bucket is already taken.
    #[error("Sequence {sequence} already taken in bucket {bucket}")]
    SequenceConflict {
        bucket: Bucket,
        sequence: SequenceNumber,
    },

    /// Allocation kept conflicting and was abandoned.
    #[error("Allocation abandoned after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    /// The bucket has issued `u32::MAX` codes.
    #[error("Sequence space exhausted in bucket {0}")]
    SequenceOverflow(Bucket),

    /// Stored or imported data breaks a registry invariant.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// The storage engine failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encoding or decoding a record or snapshot failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl McError {
    /// Shorthand for a `Validation` error.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
