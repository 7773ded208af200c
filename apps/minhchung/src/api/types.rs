//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API. Field names are
//! camelCase and every response except `/health` is wrapped in
//! [`ApiResponse`].

use chrono::{DateTime, Utc};
use minhchung_core::{
    Criterion, CriterionId, Department, DepartmentId, EvidenceCode, EvidenceCodePatch,
    EvidenceFilter, IntegrityReport, Page, PageRequest, RegistryStatistics,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// ENVELOPE
// =============================================================================

/// `{ "success": bool, "data": ..., "message": string? }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// EVIDENCE CODES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCodeDto {
    pub id: u64,
    pub code: String,
    pub department_id: u64,
    pub criterion_id: u64,
    pub sequence_number: u32,
    pub year: u16,
    pub month: u8,
    pub description: Option<String>,
    pub created_by: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<EvidenceCode> for EvidenceCodeDto {
    fn from(record: EvidenceCode) -> Self {
        Self {
            id: record.id.0,
            code: record.code,
            department_id: record.department_id.0,
            criterion_id: record.criterion_id.0,
            sequence_number: record.sequence_number.value(),
            year: record.period.year(),
            month: record.period.month(),
            description: record.description,
            created_by: record.created_by.0,
            is_active: record.is_active,
            created_at: record.created_at,
        }
    }
}

/// Body of `POST /evidence-codes/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerateRequest {
    pub department_id: u64,
    pub criterion_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of `PUT /evidence-codes/{id}`. Any other field is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl From<UpdateRequest> for EvidenceCodePatch {
    fn from(request: UpdateRequest) -> Self {
        Self {
            description: request.description,
            is_active: request.is_active,
        }
    }
}

/// Query string of `GET /evidence-codes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ListQuery {
    pub fn filter(&self) -> EvidenceFilter {
        EvidenceFilter {
            department_id: self.department_id.map(DepartmentId),
            criterion_id: self.criterion_id.map(CriterionId),
            year: self.year,
            month: self.month,
            search: self.search.clone(),
            is_active: self.is_active,
        }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// `data` of a list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListData<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> ListData<T> {
    pub fn from_page<S: Into<T>>(page: Page<S>) -> Self {
        let pagination = Pagination {
            page: page.page,
            limit: page.limit,
            total: page.total,
            total_pages: page.total_pages(),
        };
        Self {
            items: page.items.into_iter().map(Into::into).collect(),
            pagination,
        }
    }
}

// =============================================================================
// REFERENCE DATA
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentDto {
    pub id: u64,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Department> for DepartmentDto {
    fn from(department: Department) -> Self {
        Self {
            id: department.id.0,
            code: department.code.as_str().to_string(),
            name: department.name,
            is_active: department.is_active,
            created_at: department.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionDto {
    pub id: u64,
    pub code: String,
    pub name: String,
    pub standard: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Criterion> for CriterionDto {
    fn from(criterion: Criterion) -> Self {
        Self {
            id: criterion.id.0,
            code: criterion.code.as_str().to_string(),
            name: criterion.name,
            standard: criterion.standard,
            is_active: criterion.is_active,
            created_at: criterion.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateDepartmentRequest {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCriterionRequest {
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
}

// =============================================================================
// BACKUP
// =============================================================================

/// A base64 snapshot and its fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    pub data: String,
    /// FNV-1a checksum from the snapshot header, as 16 hex digits.
    pub checksum: String,
    /// BLAKE3 digest of the snapshot bytes.
    pub digest: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RestoreRequest {
    pub data: String,
}

// =============================================================================
// STATISTICS & AUDIT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceCountsDto {
    pub total: u64,
    pub active: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCountsDto {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentUsageDto {
    pub department_id: u64,
    pub department_code: String,
    pub codes: CodeCountsDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodUsageDto {
    pub year: u16,
    pub month: u8,
    pub codes: CodeCountsDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsDto {
    pub departments: ReferenceCountsDto,
    pub criteria: ReferenceCountsDto,
    pub evidence_codes: CodeCountsDto,
    pub by_department: Vec<DepartmentUsageDto>,
    pub by_period: Vec<PeriodUsageDto>,
}

impl From<RegistryStatistics> for StatisticsDto {
    fn from(stats: RegistryStatistics) -> Self {
        let codes = |c: minhchung_core::stats::CodeCounts| CodeCountsDto {
            total: c.total,
            active: c.active,
            inactive: c.inactive,
        };
        Self {
            departments: ReferenceCountsDto {
                total: stats.departments.total,
                active: stats.departments.active,
            },
            criteria: ReferenceCountsDto {
                total: stats.criteria.total,
                active: stats.criteria.active,
            },
            evidence_codes: codes(stats.evidence_codes),
            by_department: stats
                .by_department
                .into_iter()
                .map(|d| DepartmentUsageDto {
                    department_id: d.department_id.0,
                    department_code: d.department_code,
                    codes: codes(d.codes),
                })
                .collect(),
            by_period: stats
                .by_period
                .into_iter()
                .map(|p| PeriodUsageDto {
                    year: p.period.year(),
                    month: p.period.month(),
                    codes: codes(p.codes),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDto {
    pub clean: bool,
    pub buckets_checked: usize,
    pub codes_checked: usize,
    pub violations: Vec<String>,
}

impl From<IntegrityReport> for AuditDto {
    fn from(report: IntegrityReport) -> Self {
        Self {
            clean: report.is_clean(),
            buckets_checked: report.buckets_checked,
            codes_checked: report.codes_checked,
            violations: report
                .violations
                .into_iter()
                .map(|v| match v.bucket {
                    Some(bucket) => format!("{bucket}: {}", v.detail),
                    None => v.detail,
                })
                .collect(),
        }
    }
}
