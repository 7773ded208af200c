//! # CLI Command Implementations
//!
//! Each command opens the registry, runs one operation and prints either
//! plain text or, with `--json-mode`, the same JSON shapes the HTTP API
//! returns.

use super::ReferenceAction;
use crate::api::{
    self, AuditDto, CriterionDto, DepartmentDto, EvidenceCodeDto, ListData, ListQuery,
    StatisticsDto,
};
use crate::config::Config;
use crate::error::AppError;
use minhchung_core::{
    CriterionId, DepartmentId, EvidenceCode, EvidenceCodeId, EvidenceCodePatch, NewEvidenceCode,
    Registry, UserId, snapshot_checksum, snapshot_digest,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum snapshot file size accepted by `restore` (500 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
    pub json_mode: bool,
    pub user_id: u64,
}

// =============================================================================
// FILE HELPERS
// =============================================================================

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), AppError> {
    let metadata = std::fs::metadata(path).map_err(|e| AppError::io(path, e))?;
    if metadata.len() > max_size {
        return Err(AppError::Usage(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, AppError> {
    let canonical = path.canonicalize().map_err(|e| AppError::io(path, e))?;
    if !canonical.is_file() {
        return Err(AppError::Usage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Canonicalize the parent of an output path, which must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, AppError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = parent.canonicalize().map_err(|e| AppError::io(parent, e))?;
    if !canonical_parent.is_dir() {
        return Err(AppError::Usage(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }
    let filename = path
        .file_name()
        .ok_or_else(|| AppError::Usage("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Usage(format!("Cannot render JSON: {e}")))?;
    println!("{text}");
    Ok(())
}

fn print_code(record: &EvidenceCode) {
    println!("{}", record.code);
    println!("  Id:          {}", record.id);
    println!("  Department:  {}", record.department_id);
    println!("  Criterion:   {}", record.criterion_id);
    println!("  Sequence:    {}", record.sequence_number);
    println!("  Period:      {}", record.period);
    println!(
        "  Description: {}",
        record.description.as_deref().unwrap_or("-")
    );
    println!("  Created by:  {}", record.created_by);
    println!("  Created at:  {}", record.created_at.to_rfc3339());
    println!(
        "  Status:      {}",
        if record.is_active { "active" } else { "inactive" }
    );
}

fn show_code(ctx: &Context, record: EvidenceCode) -> Result<(), AppError> {
    if ctx.json_mode {
        return print_json(&EvidenceCodeDto::from(record));
    }
    print_code(&record);
    Ok(())
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Open the configured database with the system clock.
pub fn open_registry(config: &Config) -> Result<Registry, AppError> {
    let registry = Registry::open(&config.storage.database, Arc::new(mockable::DefaultClock))?
        .with_utc_offset(config.allocation.utc_offset_minutes)?
        .with_max_attempts(config.allocation.max_attempts);
    Ok(registry)
}

// =============================================================================
// SERVER & INIT
// =============================================================================

/// `UTC+07:00`, `UTC-00:30`.
fn format_utc_offset(minutes: i32) -> String {
    let sign = if minutes.signum() < 0 { '-' } else { '+' };
    let magnitude = minutes.unsigned_abs();
    format!("UTC{sign}{:02}:{:02}", magnitude / 60, magnitude % 60)
}

/// Start the HTTP server.
pub async fn cmd_server(config: &Config) -> Result<(), AppError> {
    let registry = open_registry(config)?;

    println!("minhchung server starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.server.bind_address());
    println!("  Database: {}", config.storage.database.display());
    println!(
        "  Offset:   {}",
        format_utc_offset(config.allocation.utc_offset_minutes)
    );
    println!(
        "  Auth:     {}",
        if config.auth.tokens.is_empty() {
            "disabled".to_string()
        } else {
            format!("{} token(s)", config.auth.tokens.len())
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config, registry).await
}

/// Create an empty database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), AppError> {
    let path = &ctx.config.storage.database;
    if path.exists() {
        if !force {
            return Err(AppError::Usage(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path).map_err(|e| AppError::io(path, e))?;
    }
    open_registry(&ctx.config)?;
    println!("Initialized new registry at {}", path.display());
    Ok(())
}

// =============================================================================
// STATUS
// =============================================================================

pub fn cmd_status(ctx: &Context) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let stats = registry.statistics()?;
    let period = registry.current_period()?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "database": ctx.config.storage.database.to_string_lossy(),
            "currentPeriod": period.to_string(),
            "statistics": StatisticsDto::from(stats),
        }));
    }

    println!("minhchung Registry Status");
    println!("=========================");
    println!("Database:       {}", ctx.config.storage.database.display());
    println!("Current period: {period}");
    println!();
    println!(
        "Departments:    {} ({} active)",
        stats.departments.total, stats.departments.active
    );
    println!(
        "Criteria:       {} ({} active)",
        stats.criteria.total, stats.criteria.active
    );
    println!(
        "Evidence codes: {} ({} active, {} inactive)",
        stats.evidence_codes.total, stats.evidence_codes.active, stats.evidence_codes.inactive
    );
    if !stats.by_period.is_empty() {
        println!();
        println!("By period:");
        for usage in &stats.by_period {
            println!("  {}  {}", usage.period, usage.codes.total);
        }
    }
    Ok(())
}

// =============================================================================
// REFERENCE DATA
// =============================================================================

pub fn cmd_department(ctx: &Context, action: ReferenceAction) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    match action {
        ReferenceAction::Add {
            code,
            name,
            standard,
        } => {
            if standard.is_some() {
                return Err(AppError::Usage(
                    "--standard only applies to criteria".to_string(),
                ));
            }
            let department = registry.create_department(&code, &name)?;
            if ctx.json_mode {
                return print_json(&DepartmentDto::from(department));
            }
            println!("Created department {} ({})", department.code, department.id);
        }
        ReferenceAction::List => {
            let departments = registry.departments()?;
            if ctx.json_mode {
                let dtos: Vec<DepartmentDto> = departments.into_iter().map(Into::into).collect();
                return print_json(&dtos);
            }
            for d in departments {
                println!(
                    "{:>4}  {:<16} {}{}",
                    d.id,
                    d.code,
                    d.name,
                    if d.is_active { "" } else { "  [inactive]" }
                );
            }
        }
        ReferenceAction::Deactivate { id } => {
            let department = registry.set_department_active(DepartmentId(id), false)?;
            if ctx.json_mode {
                return print_json(&DepartmentDto::from(department));
            }
            println!("Deactivated department {}", department.code);
        }
    }
    Ok(())
}

pub fn cmd_criterion(ctx: &Context, action: ReferenceAction) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    match action {
        ReferenceAction::Add {
            code,
            name,
            standard,
        } => {
            let criterion = registry.create_criterion(&code, &name, standard.as_deref())?;
            if ctx.json_mode {
                return print_json(&CriterionDto::from(criterion));
            }
            println!("Created criterion {} ({})", criterion.code, criterion.id);
        }
        ReferenceAction::List => {
            let criteria = registry.criteria()?;
            if ctx.json_mode {
                let dtos: Vec<CriterionDto> = criteria.into_iter().map(Into::into).collect();
                return print_json(&dtos);
            }
            for c in criteria {
                println!(
                    "{:>4}  {:<16} {}{}",
                    c.id,
                    c.code,
                    c.name,
                    if c.is_active { "" } else { "  [inactive]" }
                );
            }
        }
        ReferenceAction::Deactivate { id } => {
            let criterion = registry.set_criterion_active(CriterionId(id), false)?;
            if ctx.json_mode {
                return print_json(&CriterionDto::from(criterion));
            }
            println!("Deactivated criterion {}", criterion.code);
        }
    }
    Ok(())
}

// =============================================================================
// EVIDENCE CODES
// =============================================================================

pub fn cmd_generate(
    ctx: &Context,
    department: u64,
    criterion: u64,
    description: Option<String>,
) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let record = registry.generate(&NewEvidenceCode {
        department_id: DepartmentId(department),
        criterion_id: CriterionId(criterion),
        description,
        created_by: UserId(ctx.user_id),
    })?;
    show_code(ctx, record)
}

pub fn cmd_list(ctx: &Context, query: &ListQuery) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let page = registry.list(&query.filter(), query.page_request())?;

    if ctx.json_mode {
        return print_json(&ListData::<EvidenceCodeDto>::from_page(page));
    }

    for record in &page.items {
        println!(
            "{:>6}  {:<32} {}{}",
            record.id,
            record.code,
            record.description.as_deref().unwrap_or(""),
            if record.is_active { "" } else { "  [inactive]" }
        );
    }
    println!(
        "-- page {}/{}, {} total",
        page.page,
        page.total_pages(),
        page.total
    );
    Ok(())
}

/// `target` is an id when it is all digits, a code string otherwise.
pub fn cmd_show(ctx: &Context, target: &str) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let record = match target.trim().parse::<u64>() {
        Ok(id) => registry.get(EvidenceCodeId(id))?,
        Err(_) => registry.get_by_code(target)?,
    };
    show_code(ctx, record)
}

pub fn cmd_update(
    ctx: &Context,
    id: u64,
    description: Option<String>,
    active: Option<bool>,
) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let record = registry.update(
        EvidenceCodeId(id),
        &EvidenceCodePatch {
            description,
            is_active: active,
        },
    )?;
    show_code(ctx, record)
}

pub fn cmd_delete(ctx: &Context, id: u64) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let record = registry.soft_delete(EvidenceCodeId(id))?;
    if ctx.json_mode {
        return print_json(&EvidenceCodeDto::from(record));
    }
    println!("Deactivated {}", record.code);
    Ok(())
}

// =============================================================================
// BACKUP, RESTORE & VERIFY
// =============================================================================

pub fn cmd_backup(ctx: &Context, output: &Path) -> Result<(), AppError> {
    let validated_output = validate_output_path(output)?;
    let registry = open_registry(&ctx.config)?;
    let data = registry.backup()?;
    let checksum = snapshot_checksum(&data)?;

    std::fs::write(&validated_output, &data).map_err(|e| AppError::io(&validated_output, e))?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "path": validated_output.to_string_lossy(),
            "size": data.len(),
            "checksum": format!("{checksum:016x}"),
            "digest": snapshot_digest(&data),
        }));
    }
    println!(
        "Exported {} bytes to {}",
        data.len(),
        validated_output.display()
    );
    println!("Checksum: {checksum:016x}");
    println!("BLAKE3:   {}", snapshot_digest(&data));
    Ok(())
}

pub fn cmd_restore(ctx: &Context, input: &Path) -> Result<(), AppError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_SNAPSHOT_FILE_SIZE)?;
    let data = std::fs::read(&validated_path).map_err(|e| AppError::io(&validated_path, e))?;

    let registry = open_registry(&ctx.config)?;
    let stats = registry.restore(&data)?;

    if ctx.json_mode {
        return print_json(&StatisticsDto::from(stats));
    }
    println!(
        "Restored {} departments, {} criteria, {} evidence codes",
        stats.departments.total, stats.criteria.total, stats.evidence_codes.total
    );
    Ok(())
}

pub fn cmd_verify(ctx: &Context) -> Result<(), AppError> {
    let registry = open_registry(&ctx.config)?;
    let report = registry.verify_integrity()?;
    let violations = report.violations.len();

    if ctx.json_mode {
        print_json(&AuditDto::from(report))?;
    } else {
        println!(
            "Checked {} buckets, {} codes",
            report.buckets_checked, report.codes_checked
        );
        for violation in &report.violations {
            match violation.bucket {
                Some(bucket) => println!("  VIOLATION {bucket}: {}", violation.detail),
                None => println!("  VIOLATION: {}", violation.detail),
            }
        }
        if violations == 0 {
            println!("OK: every bucket is numbered 1..N");
        }
    }

    if violations > 0 {
        return Err(AppError::IntegrityFailed(violations));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(dir: &Path) -> Context {
        let mut config = Config::default();
        config.storage.database = dir.join("cli.redb");
        Context {
            config,
            json_mode: false,
            user_id: 4,
        }
    }

    #[test]
    fn utc_offset_keeps_sign_below_one_hour() {
        assert_eq!(format_utc_offset(420), "UTC+07:00");
        assert_eq!(format_utc_offset(0), "UTC+00:00");
        assert_eq!(format_utc_offset(-30), "UTC-00:30");
        assert_eq!(format_utc_offset(-570), "UTC-09:30");
        assert_eq!(format_utc_offset(345), "UTC+05:45");
    }

    #[test]
    fn init_refuses_existing_database() {
        let temp = tempfile::tempdir().expect("temp dir");
        let ctx = context(temp.path());
        cmd_init(&ctx, false).expect("first init");
        assert!(matches!(cmd_init(&ctx, false), Err(AppError::Usage(_))));
        cmd_init(&ctx, true).expect("forced init");
    }

    #[test]
    fn generate_records_cli_user() {
        let temp = tempfile::tempdir().expect("temp dir");
        let ctx = context(temp.path());
        cmd_department(
            &ctx,
            ReferenceAction::Add {
                code: "cntt".to_string(),
                name: "Công nghệ thông tin".to_string(),
                standard: None,
            },
        )
        .expect("department");
        cmd_criterion(
            &ctx,
            ReferenceAction::Add {
                code: "1.1".to_string(),
                name: "Tiêu chí 1.1".to_string(),
                standard: Some("TC1".to_string()),
            },
        )
        .expect("criterion");
        cmd_generate(&ctx, 1, 1, Some("Biên bản".to_string())).expect("generate");

        let registry = open_registry(&ctx.config).expect("open");
        let record = registry.get(EvidenceCodeId(1)).expect("get");
        assert_eq!(record.created_by, UserId(4));
        assert!(record.code.starts_with("MC-CNTT-1.1-001-"));
    }

    #[test]
    fn backup_then_restore_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let ctx = context(temp.path());
        cmd_department(
            &ctx,
            ReferenceAction::Add {
                code: "KT".to_string(),
                name: "Kế toán".to_string(),
                standard: None,
            },
        )
        .expect("department");

        let snapshot = temp.path().join("registry.mcbk");
        cmd_backup(&ctx, &snapshot).expect("backup");
        assert!(snapshot.is_file());

        let mut other = context(temp.path());
        other.config.storage.database = temp.path().join("restored.redb");
        cmd_restore(&other, &snapshot).expect("restore");
        let registry = open_registry(&other.config).expect("open");
        assert_eq!(registry.departments().expect("list").len(), 1);
    }

    #[test]
    fn verify_passes_on_fresh_database() {
        let temp = tempfile::tempdir().expect("temp dir");
        cmd_verify(&context(temp.path())).expect("verify");
    }

    #[test]
    fn standard_rejected_for_departments() {
        let temp = tempfile::tempdir().expect("temp dir");
        let result = cmd_department(
            &context(temp.path()),
            ReferenceAction::Add {
                code: "KT".to_string(),
                name: "Kế toán".to_string(),
                standard: Some("x".to_string()),
            },
        );
        assert!(matches!(result, Err(AppError::Usage(_))));
    }

    #[test]
    fn output_path_needs_existing_parent() {
        let temp = tempfile::tempdir().expect("temp dir");
        assert!(validate_output_path(&temp.path().join("missing/dir/out.bin")).is_err());
        assert!(validate_output_path(&temp.path().join("out.bin")).is_ok());
    }
}
