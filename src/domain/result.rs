// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Result type alias for datawh

use super::errors::EtlError;

/// Result type alias for datawh operations
///
/// # Examples
///
/// ```
/// use datawh::domain::result::Result;
/// use datawh::domain::errors::EtlError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(EtlError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, EtlError>;
