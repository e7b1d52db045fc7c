//! Password policy evaluation.
//!
//! Pure functions over [`PasswordPolicy`]; the report they produce is sent
//! back to the client verbatim so account UIs can show which requirement
//! failed without re-implementing the policy.

use crate::config::PasswordPolicy;
use serde::Serialize;

/// Character-class counts of a candidate password.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordComponents {
    pub total_length: usize,
    pub uppercase_letters: usize,
    pub lowercase_letters: usize,
    pub digits: usize,
    pub special_chars: usize,
    /// Whether the candidate matches a previously used password.
    pub reused: bool,
}

/// Outcome of checking a candidate against the policy.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordReport {
    pub valid: bool,
    /// One sentence per unmet requirement.
    pub hints: Vec<String>,
    /// The special characters the policy counts.
    pub marker: String,
    pub components: PasswordComponents,
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// Evaluate a candidate password.
///
/// `reused` is supplied by the caller since only it can see the password
/// history; it is ignored when the policy allows reuse.
pub fn validate_password(policy: &PasswordPolicy, password: &str, reused: bool) -> PasswordReport {
    let components = PasswordComponents {
        total_length: password.chars().count(),
        uppercase_letters: password.chars().filter(|c| c.is_uppercase()).count(),
        lowercase_letters: password.chars().filter(|c| c.is_lowercase()).count(),
        digits: password.chars().filter(|c| c.is_ascii_digit()).count(),
        special_chars: password
            .chars()
            .filter(|c| policy.special_chars.contains(*c))
            .count(),
        reused: reused && !policy.reuse,
    };

    let mut hints = Vec::new();
    if components.total_length < policy.length {
        hints.push(format!(
            "The password must be at least {} long.",
            plural(policy.length, "character", "characters")
        ));
    }
    if components.uppercase_letters < policy.uppercase {
        hints.push(format!(
            "The password must contain at least {}.",
            plural(policy.uppercase, "uppercase letter", "uppercase letters")
        ));
    }
    if components.lowercase_letters < policy.lowercase {
        hints.push(format!(
            "The password must contain at least {}.",
            plural(policy.lowercase, "lowercase letter", "lowercase letters")
        ));
    }
    if components.digits < policy.numbers {
        hints.push(format!(
            "The password must contain at least {}.",
            plural(policy.numbers, "number", "numbers")
        ));
    }
    if components.special_chars < policy.special {
        hints.push(format!(
            "The password must contain at least {} ({}).",
            plural(policy.special, "special character", "special characters"),
            policy.special_chars
        ));
    }
    if components.reused {
        hints.push("The password has been used before and cannot be reused.".to_string());
    }

    PasswordReport {
        valid: hints.is_empty(),
        hints,
        marker: policy.special_chars.clone(),
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_accepts_a_strong_password() {
        let policy = PasswordPolicy::default();
        let report = validate_password(&policy, "Str0ng!Pass", false);
        assert!(report.valid, "{:?}", report.hints);
        assert_eq!(report.components.digits, 1);
        assert_eq!(report.components.special_chars, 1);
    }

    #[test]
    fn every_unmet_requirement_gets_a_hint() {
        let policy = PasswordPolicy::default();
        let report = validate_password(&policy, "abc", false);
        assert!(!report.valid);
        // Too short, no uppercase, no digit, no special character.
        assert_eq!(report.hints.len(), 4);
    }

    #[test]
    fn reuse_is_rejected_unless_allowed() {
        let policy = PasswordPolicy::default();
        let report = validate_password(&policy, "Str0ng!Pass", true);
        assert!(!report.valid);
        assert!(report.components.reused);

        let lenient = PasswordPolicy {
            reuse: true,
            ..PasswordPolicy::default()
        };
        let report = validate_password(&lenient, "Str0ng!Pass", true);
        assert!(report.valid);
    }

    #[test]
    fn singular_hint_text() {
        let policy = PasswordPolicy::default();
        let report = validate_password(&policy, "strongpassword!", false);
        assert!(report
            .hints
            .iter()
            .any(|h| h.contains("1 uppercase letter.")));
        assert!(report.hints.iter().any(|h| h.contains("1 number.")));
    }
}
