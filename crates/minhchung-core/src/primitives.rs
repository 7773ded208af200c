//! # Registry Primitives
//!
//! Compile-time constants for the registry: the code format, input limits,
//! pagination bounds and allocation policy defaults.

/// Prefix of every evidence code ("Minh chứng").
pub const CODE_PREFIX: &str = "MC";

/// Separator between the fields of an evidence code.
pub const CODE_SEPARATOR: char = '-';

/// Minimum rendered width of the sequence field; shorter numbers are zero-padded.
pub const SEQUENCE_WIDTH: usize = 3;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a department or criterion code segment.
pub const MAX_SEGMENT_LENGTH: usize = 16;

/// Maximum length of a department or criterion display name.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length of an evidence code description.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Maximum length of a list search term.
pub const MAX_SEARCH_LENGTH: usize = 128;

/// Earliest allocation year. Keeps the year field at four digits.
pub const MIN_YEAR: u16 = 1970;

/// Latest allocation year.
pub const MAX_YEAR: u16 = 9999;

// =============================================================================
// PAGINATION
// =============================================================================

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

// =============================================================================
// ALLOCATION POLICY
// =============================================================================

/// How many times a conflicting allocation is retried before giving up.
pub const MAX_ALLOCATION_RETRIES: u32 = 5;

/// Offset applied to the server's UTC clock when stamping periods (UTC+07:00).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 7 * 60;
