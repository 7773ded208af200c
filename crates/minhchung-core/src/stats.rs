//! # Registry Statistics
//!
//! Counts for the statistics dashboard, computed from one consistent
//! snapshot so the totals always agree with each other.

use crate::backup::Snapshot;
use crate::{DepartmentId, Period};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Total and active counts of one kind of reference data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCounts {
    pub total: u64,
    pub active: u64,
}

/// Evidence code counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCounts {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
}

impl CodeCounts {
    fn add(&mut self, is_active: bool) {
        self.total += 1;
        if is_active {
            self.active += 1;
        } else {
            self.inactive += 1;
        }
    }
}

/// Codes issued under one department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentUsage {
    pub department_id: DepartmentId,
    pub department_code: String,
    pub codes: CodeCounts,
}

/// Codes issued in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodUsage {
    pub period: Period,
    pub codes: CodeCounts,
}

/// Registry-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub departments: ReferenceCounts,
    pub criteria: ReferenceCounts,
    pub evidence_codes: CodeCounts,
    /// Ordered by department id; departments without codes are listed with zeros.
    pub by_department: Vec<DepartmentUsage>,
    /// Ordered by period, oldest first.
    pub by_period: Vec<PeriodUsage>,
}

impl RegistryStatistics {
    /// Compute statistics from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let departments = ReferenceCounts {
            total: snapshot.departments.len() as u64,
            active: snapshot.departments.iter().filter(|d| d.is_active).count() as u64,
        };
        let criteria = ReferenceCounts {
            total: snapshot.criteria.len() as u64,
            active: snapshot.criteria.iter().filter(|c| c.is_active).count() as u64,
        };

        let mut evidence_codes = CodeCounts::default();
        let mut per_department: BTreeMap<DepartmentId, CodeCounts> = snapshot
            .departments
            .iter()
            .map(|d| (d.id, CodeCounts::default()))
            .collect();
        let mut per_period: BTreeMap<Period, CodeCounts> = BTreeMap::new();
        for record in &snapshot.evidence_codes {
            evidence_codes.add(record.is_active);
            per_department
                .entry(record.department_id)
                .or_default()
                .add(record.is_active);
            per_period
                .entry(record.period)
                .or_default()
                .add(record.is_active);
        }

        let codes_by_id: BTreeMap<_, _> = snapshot
            .departments
            .iter()
            .map(|d| (d.id, d.code.to_string()))
            .collect();
        let by_department = per_department
            .into_iter()
            .map(|(department_id, codes)| DepartmentUsage {
                department_id,
                department_code: codes_by_id.get(&department_id).cloned().unwrap_or_default(),
                codes,
            })
            .collect();
        let by_period = per_period
            .into_iter()
            .map(|(period, codes)| PeriodUsage { period, codes })
            .collect();

        Self {
            departments,
            criteria,
            evidence_codes,
            by_department,
            by_period,
        }
    }
}
