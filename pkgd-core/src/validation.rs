//! # Input Validation
//!
//! Package names, versions, and file names end up as path components under the
//! storage root (`packages/<name>-<version>.tgz`), so everything that reaches the
//! filesystem is checked here first. The rules follow the npm registry's naming
//! conventions, minus scoped (`@scope/name`) packages which would need a nested
//! directory layout.

/// Maximum length for npm package names
pub const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Maximum length for version strings
pub const MAX_VERSION_LENGTH: usize = 64;

/// Maximum length for filenames
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Rejected input.
#[derive(Debug, thiserror::Error)]
pub enum InvalidInput {
    #[error("Input too long: {actual} exceeds maximum {max}")]
    TooLong { actual: usize, max: usize },

    #[error("Input too short: {actual} is below minimum {min}")]
    TooShort { actual: usize, min: usize },

    #[error("Invalid characters in input: {input}")]
    InvalidCharacters { input: String },

    #[error("Path traversal detected: {path}")]
    PathTraversal { path: String },

    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Contains null bytes")]
    NullBytes,

    #[error("Contains control characters")]
    ControlCharacters,
}

pub type ValidationResult<T> = Result<T, InvalidInput>;

fn check_common(input: &str, max: usize) -> ValidationResult<()> {
    if input.is_empty() {
        return Err(InvalidInput::TooShort { actual: 0, min: 1 });
    }

    if input.len() > max {
        return Err(InvalidInput::TooLong {
            actual: input.len(),
            max,
        });
    }

    if input.contains('\0') {
        return Err(InvalidInput::NullBytes);
    }

    if input.chars().any(|c| c.is_control()) {
        return Err(InvalidInput::ControlCharacters);
    }

    Ok(())
}

/// Validate an npm package name.
///
/// # Examples
///
/// ```
/// # use pkgd_core::validation::validate_package_name;
/// assert!(validate_package_name("left-pad").is_ok());
/// assert!(validate_package_name("../etc").is_err());
/// assert!(validate_package_name("Express").is_err());
/// ```
pub fn validate_package_name(name: &str) -> ValidationResult<&str> {
    check_common(name, MAX_PACKAGE_NAME_LENGTH)?;

    if name.starts_with('.') || name.starts_with('_') {
        return Err(InvalidInput::InvalidFormat {
            reason: "npm package names cannot start with . or _".to_string(),
        });
    }

    if name.to_lowercase() != name {
        return Err(InvalidInput::InvalidFormat {
            reason: "npm package names must be lowercase".to_string(),
        });
    }

    if name.contains("..") {
        return Err(InvalidInput::PathTraversal {
            path: name.to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '~'))
    {
        return Err(InvalidInput::InvalidCharacters {
            input: name.to_string(),
        });
    }

    Ok(name)
}

/// Validate a version string: safe as a path component and a semantic version.
pub fn validate_version(version: &str) -> ValidationResult<semver::Version> {
    check_common(version, MAX_VERSION_LENGTH)?;

    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return Err(InvalidInput::InvalidCharacters {
            input: version.to_string(),
        });
    }

    semver::Version::parse(version).map_err(|e| InvalidInput::InvalidFormat {
        reason: format!("not a semantic version: {e}"),
    })
}

/// Validate a file name requested from (or uploaded to) the packages directory.
pub fn validate_filename(filename: &str) -> ValidationResult<&str> {
    check_common(filename, MAX_FILENAME_LENGTH)?;

    if filename.contains("..") {
        return Err(InvalidInput::PathTraversal {
            path: filename.to_string(),
        });
    }

    if filename.contains('/') || filename.contains('\\') {
        return Err(InvalidInput::InvalidCharacters {
            input: filename.to_string(),
        });
    }

    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_package_name() {
        assert!(validate_package_name("express").is_ok());
        assert!(validate_package_name("lodash.merge").is_ok());
        assert!(validate_package_name("my_pkg-2").is_ok());

        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("@scope/package").is_err());
        assert!(validate_package_name("Express").is_err());
        assert!(validate_package_name(".hidden").is_err());
        assert!(validate_package_name("_private").is_err());
        assert!(validate_package_name("a..b").is_err());
        assert!(validate_package_name("with space").is_err());
        assert!(validate_package_name("nul\0byte").is_err());

        let long_name = "a".repeat(MAX_PACKAGE_NAME_LENGTH + 1);
        assert!(matches!(
            validate_package_name(&long_name),
            Err(InvalidInput::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_version() {
        assert_eq!(
            validate_version("1.0.0").unwrap(),
            semver::Version::new(1, 0, 0)
        );
        assert!(validate_version("2.1.0-beta.1").is_ok());
        assert!(validate_version("1.0.2-10").is_ok());
        assert!(validate_version("1.0.0+build.5").is_ok());

        assert!(validate_version("").is_err());
        assert!(validate_version("1.0").is_err());
        assert!(validate_version("latest").is_err());
        assert!(validate_version("1.0.0/../x").is_err());

        let long_version = format!("1.0.0-{}", "a".repeat(MAX_VERSION_LENGTH));
        assert!(validate_version(&long_version).is_err());
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("left-pad-1.3.0.tgz").is_ok());
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("dir/file.tgz").is_err());
        assert!(validate_filename("dir\\file.tgz").is_err());
        assert!(validate_filename("").is_err());
    }
}
