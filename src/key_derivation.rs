// 🔑 Key Derivation - Effective 9-digit keys for subtypes
//
// A subtype's effective key is its BIN followed by the zero-padded extension.
// The key is only authoritative once the collision checks in invariants.rs pass.

use crate::error::{CatalogError, CatalogResult};

/// Maximum length of any derived key
pub const EFFECTIVE_KEY_LEN: usize = 9;

/// BIN lengths accepted by the catalog
pub const BIN_LENGTHS: [usize; 3] = [6, 8, 9];

// ============================================================================
// BIN FORMAT
// ============================================================================

/// Validate the BIN itself: digits only, 6, 8 or 9 of them
pub fn validate_bin_number(bin: &str) -> CatalogResult<()> {
    if bin.is_empty() || !bin.chars().all(|c| c.is_ascii_digit()) {
        return Err(CatalogError::invalid(format!(
            "BIN '{}' must contain only digits",
            bin
        )));
    }
    if !BIN_LENGTHS.contains(&bin.len()) {
        return Err(CatalogError::invalid(format!(
            "BIN '{}' must have 6, 8 or 9 digits, got {}",
            bin,
            bin.len()
        )));
    }
    Ok(())
}

/// Validate a BIN's extension configuration at BIN create/update time
pub fn validate_extension_config(
    bin: &str,
    uses_extension: bool,
    extension_digits: Option<i64>,
) -> CatalogResult<Option<u8>> {
    if !uses_extension {
        return Ok(None);
    }
    let digits = check_extension_digits(bin, extension_digits)?;
    Ok(Some(digits))
}

fn check_extension_digits(bin: &str, extension_digits: Option<i64>) -> CatalogResult<u8> {
    if bin.len() >= EFFECTIVE_KEY_LEN {
        return Err(CatalogError::invalid(format!(
            "BIN '{}' has {} digits and leaves no room for an extension",
            bin,
            bin.len()
        )));
    }

    let max = (EFFECTIVE_KEY_LEN - bin.len()) as i64;
    match extension_digits {
        Some(d) if (1..=max).contains(&d) => Ok(d as u8),
        Some(d) => Err(CatalogError::invalid(format!(
            "extension digits must be between 1 and {} for BIN '{}', got {}",
            max, bin, d
        ))),
        None => Err(CatalogError::invalid(format!(
            "BIN '{}' uses extensions but has no extension digit count",
            bin
        ))),
    }
}

// ============================================================================
// EXTENSION NORMALIZATION
// ============================================================================

/// Normalize a raw extension against the BIN's configuration.
///
/// Returns `None` when the BIN does not use extensions (and none was given),
/// otherwise the extension zero-padded to `extension_digits` width.
pub fn normalize_extension(
    bin: &str,
    raw_extension: Option<&str>,
    uses_extension: bool,
    extension_digits: Option<i64>,
) -> CatalogResult<Option<String>> {
    let raw = raw_extension.map(str::trim).unwrap_or("");

    if !uses_extension {
        if !raw.is_empty() {
            return Err(CatalogError::invalid(format!(
                "BIN '{}' does not use extensions, got extension '{}'",
                bin, raw
            )));
        }
        return Ok(None);
    }

    let width = check_extension_digits(bin, extension_digits)? as usize;

    if raw.is_empty() {
        return Err(CatalogError::invalid(format!(
            "BIN '{}' requires an extension of {} digits",
            bin, width
        )));
    }

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(CatalogError::invalid(format!(
            "extension '{}' contains no digits",
            raw
        )));
    }
    if digits.len() > width {
        return Err(CatalogError::invalid(format!(
            "extension '{}' has more than {} digits",
            raw, width
        )));
    }
    if bin.len() + width > EFFECTIVE_KEY_LEN {
        return Err(CatalogError::invalid(format!(
            "BIN '{}' plus {} extension digits exceeds {} digits",
            bin, width, EFFECTIVE_KEY_LEN
        )));
    }

    Ok(Some(format!("{:0>width$}", digits, width = width)))
}

/// BIN + normalized extension, or the BIN unchanged when there is no extension
pub fn compute_effective_key(bin: &str, normalized_extension: Option<&str>) -> String {
    match normalized_extension {
        Some(ext) => format!("{}{}", bin, ext),
        None => bin.to_string(),
    }
}

/// The derived key a subtype carries, if any.
///
/// Subtypes with an extension always carry one. Without an extension only a
/// full 9-digit BIN yields a key; shorter BINs are not addressable on their own.
pub fn derived_key_for(bin: &str, normalized_extension: Option<&str>) -> Option<String> {
    match normalized_extension {
        Some(_) => Some(compute_effective_key(bin, normalized_extension)),
        None if bin.len() == EFFECTIVE_KEY_LEN => Some(bin.to_string()),
        None => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_bin_number() {
        assert!(validate_bin_number("123456").is_ok());
        assert!(validate_bin_number("12345678").is_ok());
        assert!(validate_bin_number("123456789").is_ok());
        assert!(validate_bin_number("1234567").is_err());
        assert!(validate_bin_number("12345A").is_err());
        assert!(validate_bin_number("").is_err());
    }

    #[test]
    fn test_no_extension_bin_rejects_any_extension() {
        for bin in ["123456", "12345678", "123456789"] {
            let err = normalize_extension(bin, Some("7"), false, None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidData);

            assert_eq!(normalize_extension(bin, None, false, None).unwrap(), None);
            assert_eq!(normalize_extension(bin, Some("   "), false, Some(3)).unwrap(), None);
        }
    }

    #[test]
    fn test_zero_padding_for_all_valid_widths() {
        for (bin, max) in [("123456", 3), ("12345678", 1)] {
            for d in 1..=max {
                for raw in ["7", "0", "1-"] {
                    let ext = normalize_extension(bin, Some(raw), true, Some(d))
                        .unwrap()
                        .unwrap();
                    assert_eq!(ext.len(), d as usize);
                    let key = compute_effective_key(bin, Some(&ext));
                    assert_eq!(key.len(), bin.len() + d as usize);
                }
            }
        }
    }

    #[test]
    fn test_scenario_extension_seven() {
        let ext = normalize_extension("123456", Some("7"), true, Some(3)).unwrap();
        assert_eq!(ext.as_deref(), Some("007"));
        assert_eq!(compute_effective_key("123456", ext.as_deref()), "123456007");
    }

    #[test]
    fn test_non_digits_are_stripped_before_counting() {
        let ext = normalize_extension("123456", Some("1-2"), true, Some(3)).unwrap();
        assert_eq!(ext.as_deref(), Some("012"));

        assert!(normalize_extension("123456", Some("12-34"), true, Some(3)).is_err());
        assert!(normalize_extension("123456", Some("abc"), true, Some(3)).is_err());
    }

    #[test]
    fn test_extension_config_failures() {
        // 9-digit BIN has no room
        assert!(normalize_extension("123456789", Some("1"), true, Some(1)).is_err());
        // digits outside [1, 9 - len]
        assert!(normalize_extension("123456", Some("1"), true, Some(0)).is_err());
        assert!(normalize_extension("123456", Some("1"), true, Some(4)).is_err());
        assert!(normalize_extension("12345678", Some("1"), true, Some(2)).is_err());
        assert!(normalize_extension("123456", Some("1"), true, None).is_err());
        // blank extension
        assert!(normalize_extension("123456", Some(" "), true, Some(3)).is_err());
        assert!(normalize_extension("123456", None, true, Some(3)).is_err());
        // too many digits
        assert!(normalize_extension("123456", Some("1234"), true, Some(3)).is_err());
    }

    #[test]
    fn test_compute_effective_key_without_extension() {
        assert_eq!(compute_effective_key("123456", None), "123456");
    }

    #[test]
    fn test_derived_key_for() {
        assert_eq!(derived_key_for("123456", None), None);
        assert_eq!(derived_key_for("123456789", None).as_deref(), Some("123456789"));
        assert_eq!(derived_key_for("123456", Some("007")).as_deref(), Some("123456007"));
    }

    #[test]
    fn test_validate_extension_config() {
        assert_eq!(validate_extension_config("123456", false, Some(9)).unwrap(), None);
        assert_eq!(validate_extension_config("123456", true, Some(3)).unwrap(), Some(3));
        assert!(validate_extension_config("123456789", true, Some(1)).is_err());
        assert!(validate_extension_config("123456", true, None).is_err());
    }
}
