//! # Evidence Code Format
//!
//! `MC-{DEPT}-{CRITERION}-{SEQ}-{YEAR}-{MONTH}`, e.g. `MC-CNTT-1.2-007-2026-10`.
//!
//! [`format_code`] is a pure function of its five inputs, and [`parse_code`]
//! only accepts strings that `format_code` could have produced, so a stored
//! row can always be re-derived and compared byte for byte.

use crate::primitives::{CODE_PREFIX, CODE_SEPARATOR, SEQUENCE_WIDTH};
use crate::{CodeSegment, McError, Period, SequenceNumber};

/// Render an evidence code.
#[must_use]
pub fn format_code(
    department: &CodeSegment,
    criterion: &CodeSegment,
    sequence: SequenceNumber,
    period: Period,
) -> String {
    format!(
        "{prefix}{sep}{department}{sep}{criterion}{sep}{seq:0width$}{sep}{year:04}{sep}{month:02}",
        prefix = CODE_PREFIX,
        sep = CODE_SEPARATOR,
        seq = sequence.value(),
        width = SEQUENCE_WIDTH,
        year = period.year(),
        month = period.month(),
    )
}

/// The fields of a parsed evidence code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCode {
    pub department: CodeSegment,
    pub criterion: CodeSegment,
    pub sequence: SequenceNumber,
    pub period: Period,
}

/// Parse a canonical evidence code.
///
/// Non-canonical spellings (lowercase segments, missing zero padding,
/// extra fields) are rejected.
pub fn parse_code(code: &str) -> Result<ParsedCode, McError> {
    let invalid = |reason: &str| McError::validation("code", format!("'{code}': {reason}"));

    let fields: Vec<&str> = code.split(CODE_SEPARATOR).collect();
    let [prefix, department, criterion, sequence, year, month] = fields.as_slice() else {
        return Err(invalid("expected 6 fields"));
    };
    if *prefix != CODE_PREFIX {
        return Err(invalid("wrong prefix"));
    }

    let department = CodeSegment::parse("department code", department)?;
    let criterion = CodeSegment::parse("criterion code", criterion)?;
    let sequence = sequence
        .parse::<u32>()
        .ok()
        .and_then(SequenceNumber::new)
        .ok_or_else(|| invalid("bad sequence number"))?;
    let year = year.parse::<u16>().map_err(|_| invalid("bad year"))?;
    let month = month.parse::<u8>().map_err(|_| invalid("bad month"))?;
    let period = Period::new(year, month)?;

    let parsed = ParsedCode {
        department,
        criterion,
        sequence,
        period,
    };
    if parsed.render() != code {
        return Err(invalid("not in canonical form"));
    }
    Ok(parsed)
}

impl ParsedCode {
    /// Render back to the canonical string.
    #[must_use]
    pub fn render(&self) -> String {
        format_code(&self.department, &self.criterion, self.sequence, self.period)
    }
}
