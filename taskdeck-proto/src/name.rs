//! Display-name validation, shared by the client's name gate and the hub.

/// Minimum display-name length in characters, after trimming.
pub const MIN_NAME_CHARS: usize = 2;

/// Maximum display-name length in characters, after trimming.
pub const MAX_NAME_CHARS: usize = 50;

/// Why a display name was rejected.
///
/// The messages are shown to the user verbatim, so each reason names the
/// specific rule that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Name is empty after trimming.
    #[error("please enter your name")]
    Empty,
    /// Name is shorter than the minimum.
    #[error("name must be at least {min} characters long")]
    TooShort {
        /// Actual length in characters.
        chars: usize,
        /// Minimum allowed length.
        min: usize,
    },
    /// Name is longer than the maximum.
    #[error("name must be at most {max} characters")]
    TooLong {
        /// Actual length in characters.
        chars: usize,
        /// Maximum allowed length.
        max: usize,
    },
    /// Name contains a character outside the allowed set.
    #[error("name may only contain letters, digits, spaces, hyphens, and apostrophes")]
    InvalidCharacter {
        /// The first offending character.
        found: char,
    },
}

/// Validates a display name and returns the trimmed form.
///
/// Rules: non-empty after trimming, length in
/// [`MIN_NAME_CHARS`]..=[`MAX_NAME_CHARS`], and characters limited to
/// ASCII letters and digits, whitespace, hyphens, and apostrophes.
///
/// # Errors
///
/// Returns the specific [`NameError`] for the first rule that fails.
pub fn validate_display_name(input: &str) -> Result<&str, NameError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NameError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars < MIN_NAME_CHARS {
        return Err(NameError::TooShort {
            chars,
            min: MIN_NAME_CHARS,
        });
    }
    if chars > MAX_NAME_CHARS {
        return Err(NameError::TooLong {
            chars,
            max: MAX_NAME_CHARS,
        });
    }
    for c in trimmed.chars() {
        let allowed = c.is_ascii_alphanumeric() || c.is_whitespace() || c == '-' || c == '\'';
        if !allowed {
            return Err(NameError::InvalidCharacter { found: c });
        }
    }
    Ok(trimmed)
}
