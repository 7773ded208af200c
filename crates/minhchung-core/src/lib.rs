//! # minhchung-core
//!
//! The evidence-code registry engine.
//!
//! Issues codes of the form `MC-{DEPT}-{CRITERION}-{SEQ}-{YEAR}-{MONTH}`
//! whose sequence numbers are unique and gap-free inside each bucket
//! (department, criterion, year, month).
//!
//! ## Layout
//!
//! - `types` / `primitives`: domain types, errors, limits
//! - `code`: the code format and its parser
//! - `storage`: the redb store; every mutation is one ACID write transaction
//! - `allocator`: [`Registry`], the entry point the API and CLI call
//! - `backup`, `audit`, `stats`: snapshots, integrity checks, counts
//!
//! ## Constraints
//!
//! - NO async, NO network dependencies
//! - No panics in library code; every failure is a [`McError`]

// =============================================================================
// MODULES
// =============================================================================

pub mod allocator;
pub mod audit;
pub mod backup;
pub mod clock;
pub mod code;
pub mod primitives;
pub mod stats;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Bucket, BucketKey, CodeSegment, Criterion, CriterionId, Department, DepartmentId,
    EvidenceCode, EvidenceCodeId, EvidenceCodePatch, EvidenceFilter, McError, NewEvidenceCode,
    Page, PageRequest, Period, SequenceNumber, UserId, normalize_description, validate_name,
};

// =============================================================================
// RE-EXPORTS: Registry
// =============================================================================

pub use allocator::Registry;
pub use audit::{IntegrityReport, Violation};
pub use backup::{
    Snapshot, SnapshotHeader, export_snapshot, import_snapshot, snapshot_checksum,
};
#[cfg(feature = "crypto-hash")]
pub use backup::snapshot_digest;
pub use clock::ManualClock;
pub use code::{ParsedCode, format_code, parse_code};
pub use stats::RegistryStatistics;
pub use storage::RedbStore;
