//! Unit tests for API types serialization/deserialization.

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{TimeZone, Utc};
use minhchung::api::{
    ApiResponse, AuditDto, EvidenceCodeDto, GenerateRequest, HealthResponse, ListData, ListQuery,
    StatisticsDto, UpdateRequest,
};
use minhchung_core::{
    CriterionId, DepartmentId, EvidenceCode, EvidenceCodeId, EvidenceCodePatch, IntegrityReport,
    Page, Period, RegistryStatistics, SequenceNumber, UserId, Violation,
};
use serde_json::json;

fn record(id: u64, seq: u32) -> EvidenceCode {
    EvidenceCode {
        id: EvidenceCodeId(id),
        code: format!("MC-CNTT-1.1-{seq:03}-2026-10"),
        department_id: DepartmentId(1),
        criterion_id: CriterionId(1),
        sequence_number: SequenceNumber::new(seq).unwrap(),
        period: Period::new(2026, 10).unwrap(),
        description: Some("Biên bản".to_string()),
        created_by: UserId(5),
        is_active: true,
        created_at: Utc.with_ymd_and_hms(2026, 10, 19, 3, 0, 0).single().unwrap(),
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

#[test]
fn test_success_envelope_omits_message() {
    let json = serde_json::to_value(ApiResponse::success(5u32)).unwrap();
    assert_eq!(json, json!({ "success": true, "data": 5 }));
}

#[test]
fn test_error_envelope_omits_data() {
    let json = serde_json::to_value(ApiResponse::<u32>::error("Department not found: 9")).unwrap();
    assert_eq!(
        json,
        json!({ "success": false, "message": "Department not found: 9" })
    );
}

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

// =============================================================================
// EVIDENCE CODE DTO
// =============================================================================

#[test]
fn test_evidence_code_dto_is_camel_case() {
    let json = serde_json::to_value(EvidenceCodeDto::from(record(3, 12))).unwrap();
    assert_eq!(json["code"], json!("MC-CNTT-1.1-012-2026-10"));
    assert_eq!(json["departmentId"], json!(1));
    assert_eq!(json["criterionId"], json!(1));
    assert_eq!(json["sequenceNumber"], json!(12));
    assert_eq!(json["year"], json!(2026));
    assert_eq!(json["month"], json!(10));
    assert_eq!(json["createdBy"], json!(5));
    assert_eq!(json["isActive"], json!(true));
    assert_eq!(json["createdAt"], json!("2026-10-19T03:00:00Z"));
}

#[test]
fn test_list_data_from_page() {
    let page = Page {
        items: vec![record(2, 2), record(1, 1)],
        page: 1,
        limit: 2,
        total: 5,
    };
    let data = ListData::<EvidenceCodeDto>::from_page(page);
    assert_eq!(data.items.len(), 2);
    assert_eq!(data.pagination.total_pages, 3);

    let json = serde_json::to_value(&data).unwrap();
    assert_eq!(json["pagination"]["totalPages"], json!(3));
    assert_eq!(json["items"][0]["id"], json!(2));
}

// =============================================================================
// REQUESTS
// =============================================================================

#[test]
fn test_generate_request_deserialization() {
    let request: GenerateRequest =
        serde_json::from_str(r#"{"departmentId":1,"criterionId":2}"#).unwrap();
    assert_eq!(request.department_id, 1);
    assert_eq!(request.criterion_id, 2);
    assert!(request.description.is_none());
}

#[test]
fn test_generate_request_rejects_extra_fields() {
    let result = serde_json::from_str::<GenerateRequest>(
        r#"{"departmentId":1,"criterionId":2,"year":2020}"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_update_request_only_mutable_fields() {
    let request: UpdateRequest =
        serde_json::from_str(r#"{"description":"x","isActive":false}"#).unwrap();
    let patch = EvidenceCodePatch::from(request);
    assert_eq!(patch.description.as_deref(), Some("x"));
    assert_eq!(patch.is_active, Some(false));

    assert!(serde_json::from_str::<UpdateRequest>(r#"{"code":"MC-X"}"#).is_err());
    assert!(serde_json::from_str::<UpdateRequest>(r#"{"createdBy":3}"#).is_err());
    assert!(
        serde_json::from_str::<UpdateRequest>("{}")
            .map(|r| EvidenceCodePatch::from(r).is_empty())
            .unwrap()
    );
}

#[test]
fn test_list_query_to_filter() {
    let query = ListQuery {
        page: Some(0),
        limit: Some(500),
        department_id: Some(2),
        month: Some(10),
        search: Some("biên".to_string()),
        is_active: Some(false),
        ..ListQuery::default()
    };
    let filter = query.filter();
    assert_eq!(filter.department_id, Some(DepartmentId(2)));
    assert_eq!(filter.criterion_id, None);
    assert_eq!(filter.month, Some(10));
    assert_eq!(filter.is_active, Some(false));

    let page = query.page_request();
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, 100);
}

// =============================================================================
// STATISTICS & AUDIT
// =============================================================================

#[test]
fn test_statistics_dto_flattens_period() {
    let stats = RegistryStatistics {
        by_period: vec![minhchung_core::stats::PeriodUsage {
            period: Period::new(2026, 9).unwrap(),
            codes: minhchung_core::stats::CodeCounts {
                total: 4,
                active: 3,
                inactive: 1,
            },
        }],
        ..RegistryStatistics::default()
    };
    let json = serde_json::to_value(StatisticsDto::from(stats)).unwrap();
    assert_eq!(json["byPeriod"][0]["year"], json!(2026));
    assert_eq!(json["byPeriod"][0]["month"], json!(9));
    assert_eq!(json["byPeriod"][0]["codes"]["inactive"], json!(1));
    assert_eq!(json["evidenceCodes"]["total"], json!(0));
}

#[test]
fn test_audit_dto_renders_violations() {
    let bucket = minhchung_core::Bucket::new(
        DepartmentId(1),
        CriterionId(2),
        Period::new(2026, 10).unwrap(),
    );
    let report = IntegrityReport {
        buckets_checked: 1,
        codes_checked: 2,
        violations: vec![Violation {
            bucket: Some(bucket),
            detail: "sequence 2 missing".to_string(),
        }],
    };
    let dto = AuditDto::from(report);
    assert!(!dto.clean);
    assert_eq!(dto.violations.len(), 1);
    assert!(dto.violations[0].starts_with("department=1 criterion=2 period=2026-10"));
    assert!(dto.violations[0].ends_with("sequence 2 missing"));
}
