//! # Evidence Code Allocator
//!
//! [`Registry`] is the single entry point for every registry operation. It
//! owns the store, the clock and the allocation policy:
//!
//! - the period and creation time of a new code come from the clock,
//!   shifted to the configured UTC offset, never from the caller; the clock
//!   is read inside the allocating transaction so numbering follows time
//! - a `SequenceConflict` from the store means the bucket counter fell behind
//!   the sequence index; the counter is repaired and the allocation retried,
//!   at most `max_attempts` times
//! - inputs are validated and normalized here, before any transaction opens

use crate::audit::IntegrityReport;
use crate::backup::{export_snapshot, import_snapshot};
use crate::primitives::{DEFAULT_UTC_OFFSET_MINUTES, MAX_ALLOCATION_RETRIES};
use crate::stats::RegistryStatistics;
use crate::storage::RedbStore;
use crate::{
    CodeSegment, Criterion, CriterionId, Department, DepartmentId, EvidenceCode,
    EvidenceCodeId, EvidenceCodePatch, EvidenceFilter, McError, NewEvidenceCode, Page,
    PageRequest, Period, normalize_description, validate_name,
};
use chrono::{DateTime, FixedOffset, Utc};
use mockable::Clock;
use std::path::Path;
use std::sync::Arc;

/// Evidence-code registry: allocation, lookup, mutation and maintenance.
pub struct Registry {
    store: RedbStore,
    clock: Arc<dyn Clock + Send + Sync>,
    offset: FixedOffset,
    max_attempts: u32,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("offset", &self.offset)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

fn utc_offset(minutes: i32) -> Result<FixedOffset, McError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            McError::validation("utc_offset_minutes", format!("{minutes} is not a valid offset"))
        })
}

impl Registry {
    /// Wrap a store with the default offset (UTC+07:00) and retry budget.
    pub fn new(store: RedbStore, clock: Arc<dyn Clock + Send + Sync>) -> Result<Self, McError> {
        Ok(Self {
            store,
            clock,
            offset: utc_offset(DEFAULT_UTC_OFFSET_MINUTES)?,
            max_attempts: MAX_ALLOCATION_RETRIES,
        })
    }

    /// Open or create the database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, McError> {
        Self::new(RedbStore::open(path)?, clock)
    }

    /// Stamp periods in a different timezone. `minutes` east of UTC.
    pub fn with_utc_offset(mut self, minutes: i32) -> Result<Self, McError> {
        self.offset = utc_offset(minutes)?;
        Ok(self)
    }

    /// Bound allocation attempts. Zero is treated as one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn store(&self) -> &RedbStore {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// The period a code generated right now would be stamped with.
    pub fn current_period(&self) -> Result<Period, McError> {
        self.stamp().map(|(period, _)| period)
    }

    /// Read the clock once: the local period and the UTC instant.
    fn stamp(&self) -> Result<(Period, DateTime<Utc>), McError> {
        let now = self.now();
        Ok((Period::from_datetime(&now.with_timezone(&self.offset))?, now))
    }

    // =========================================================================
    // REFERENCE DATA
    // =========================================================================

    pub fn create_department(&self, code: &str, name: &str) -> Result<Department, McError> {
        let code = CodeSegment::parse("department code", code)?;
        let name = validate_name("department name", name)?;
        let department = self.store.create_department(code, name, self.now())?;
        tracing::info!(id = %department.id, code = %department.code, "department created");
        Ok(department)
    }

    pub fn department(&self, id: DepartmentId) -> Result<Department, McError> {
        self.store
            .department(id)?
            .ok_or(McError::DepartmentNotFound(id))
    }

    pub fn departments(&self) -> Result<Vec<Department>, McError> {
        self.store.departments()
    }

    /// Deactivate or reactivate a department. Issued codes are untouched.
    pub fn set_department_active(
        &self,
        id: DepartmentId,
        active: bool,
    ) -> Result<Department, McError> {
        self.store.set_department_active(id, active)
    }

    pub fn create_criterion(
        &self,
        code: &str,
        name: &str,
        standard: Option<&str>,
    ) -> Result<Criterion, McError> {
        let code = CodeSegment::parse("criterion code", code)?;
        let name = validate_name("criterion name", name)?;
        let standard = standard
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| validate_name("standard", s))
            .transpose()?;
        let criterion = self
            .store
            .create_criterion(code, name, standard, self.now())?;
        tracing::info!(id = %criterion.id, code = %criterion.code, "criterion created");
        Ok(criterion)
    }

    pub fn criterion(&self, id: CriterionId) -> Result<Criterion, McError> {
        self.store
            .criterion(id)?
            .ok_or(McError::CriterionNotFound(id))
    }

    pub fn criteria(&self) -> Result<Vec<Criterion>, McError> {
        self.store.criteria()
    }

    pub fn set_criterion_active(&self, id: CriterionId, active: bool) -> Result<Criterion, McError> {
        self.store.set_criterion_active(id, active)
    }

    // =========================================================================
    // EVIDENCE CODES
    // =========================================================================

    /// Issue the next evidence code of the request's bucket.
    pub fn generate(&self, request: &NewEvidenceCode) -> Result<EvidenceCode, McError> {
        let request = NewEvidenceCode {
            description: normalize_description(request.description.as_deref())?,
            ..request.clone()
        };
        for attempt in 1..=self.max_attempts {
            match self.store.allocate(&request, || self.stamp()) {
                Ok(record) => {
                    tracing::info!(
                        id = %record.id,
                        code = %record.code,
                        created_by = %record.created_by,
                        "evidence code issued"
                    );
                    return Ok(record);
                }
                Err(McError::SequenceConflict { bucket, sequence }) => {
                    let repaired = self.store.repair_counter(bucket)?;
                    tracing::warn!(
                        %bucket,
                        %sequence,
                        attempt,
                        repaired,
                        "sequence already taken, counter repaired"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(
            department = %request.department_id,
            criterion = %request.criterion_id,
            attempts = self.max_attempts,
            "allocation abandoned"
        );
        Err(McError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }

    pub fn get(&self, id: EvidenceCodeId) -> Result<EvidenceCode, McError> {
        self.store
            .evidence_code(id)?
            .ok_or(McError::EvidenceCodeNotFound(id))
    }

    /// Look a code up by its string form. Surrounding whitespace is ignored.
    pub fn get_by_code(&self, code: &str) -> Result<EvidenceCode, McError> {
        let code = code.trim();
        self.store
            .evidence_code_by_code(code)?
            .ok_or_else(|| McError::CodeNotFound(code.to_string()))
    }

    /// Matching codes, newest first.
    pub fn list(
        &self,
        filter: &EvidenceFilter,
        page: PageRequest,
    ) -> Result<Page<EvidenceCode>, McError> {
        filter.validate()?;
        self.store.list(filter, page)
    }

    /// Change the description and/or active flag of a code.
    pub fn update(
        &self,
        id: EvidenceCodeId,
        patch: &EvidenceCodePatch,
    ) -> Result<EvidenceCode, McError> {
        if patch.is_empty() {
            return Err(McError::validation(
                "body",
                "nothing to update; send description and/or isActive",
            ));
        }
        let description = patch
            .description
            .as_deref()
            .map(|d| normalize_description(Some(d)))
            .transpose()?;
        self.store
            .update_evidence_code(id, description, patch.is_active)
    }

    /// Mark a code inactive. Its sequence number stays taken.
    pub fn soft_delete(&self, id: EvidenceCodeId) -> Result<EvidenceCode, McError> {
        let record = self.store.update_evidence_code(id, None, Some(false))?;
        tracing::info!(id = %record.id, code = %record.code, "evidence code deactivated");
        Ok(record)
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    pub fn verify_integrity(&self) -> Result<IntegrityReport, McError> {
        let report = self.store.verify_integrity()?;
        if !report.is_clean() {
            tracing::warn!(
                violations = report.violations.len(),
                "integrity audit found violations"
            );
        }
        Ok(report)
    }

    pub fn statistics(&self) -> Result<RegistryStatistics, McError> {
        Ok(RegistryStatistics::from_snapshot(&self.store.snapshot()?))
    }

    /// Encode the whole registry as snapshot bytes.
    pub fn backup(&self) -> Result<Vec<u8>, McError> {
        export_snapshot(&self.store.snapshot()?)
    }

    /// Replace the registry with a snapshot. Nothing is written unless the
    /// snapshot validates.
    pub fn restore(&self, data: &[u8]) -> Result<RegistryStatistics, McError> {
        let snapshot = import_snapshot(data)?;
        self.store.restore(&snapshot)?;
        tracing::info!(
            departments = snapshot.departments.len(),
            criteria = snapshot.criteria.len(),
            evidence_codes = snapshot.evidence_codes.len(),
            "registry restored from snapshot"
        );
        Ok(RegistryStatistics::from_snapshot(&snapshot))
    }
}

// =============================================================================
// TESTS
// =============================================================================
