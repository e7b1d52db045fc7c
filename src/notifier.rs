//! Outbound notification boundary.
//!
//! Mail transport is the hosting environment's concern. The built-in
//! endpoints only ever hand over a template name, substitution values and a
//! recipient; whether that becomes SMTP, an API call or a queue entry is up
//! to the host.

use std::collections::HashMap;
use tracing::debug;

/// Host-provided notification sender.
pub trait Notifier: Send + Sync {
    /// Render `template` with the substitutions and deliver it. Returns
    /// whether delivery was accepted.
    fn send(
        &self,
        template: &str,
        substitutions: &HashMap<String, String>,
        recipient_name: &str,
        recipient_email: &str,
    ) -> bool;
}

/// Discards every notification. Useful for tests and hosts without mail.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(
        &self,
        template: &str,
        _substitutions: &HashMap<String, String>,
        _recipient_name: &str,
        recipient_email: &str,
    ) -> bool {
        debug!(template = %template, recipient = %recipient_email, "notification discarded");
        true
    }
}
