use serde::{Deserialize, Serialize};
use std::fmt;

/// Key a handler is registered under (`document_analysis`, `webhook_delivery`, ...).
///
/// Accepted shape: non-empty, lowercase ASCII letters, digits, `_` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskName(String);

impl TaskName {
    pub const DOCUMENT_ANALYSIS: &'static str = "document_analysis";
    pub const MEDIA_PROCESSING: &'static str = "media_processing";
    pub const FORENSIC_ANALYSIS: &'static str = "forensic_analysis";
    pub const EXPORT_GENERATION: &'static str = "export_generation";
    pub const EMAIL_NOTIFICATION: &'static str = "email_notification";
    pub const DATA_CLEANUP: &'static str = "data_cleanup";
    pub const BACKUP_CREATION: &'static str = "backup_creation";
    pub const WEBHOOK_DELIVERY: &'static str = "webhook_delivery";

    /// Build a name, rejecting malformed input.
    pub fn parse(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        if Self::is_well_formed(&s) {
            Some(Self(s))
        } else {
            None
        }
    }

    pub fn is_well_formed(s: &str) -> bool {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for TaskName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::builtin("webhook_delivery", true)]
    #[case::dotted("case.reindex.v1", true)]
    #[case::empty("", false)]
    #[case::uppercase("DocumentAnalysis", false)]
    #[case::spaces("document analysis", false)]
    fn well_formed_names(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(TaskName::parse(raw).is_some(), ok);
    }
}
