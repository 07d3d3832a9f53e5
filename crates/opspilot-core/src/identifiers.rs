// crates/opspilot-core/src/identifiers.rs
// ============================================================================
// Module: OpsPilot Identifiers
// Description: Canonical opaque identifiers shared across the runtime.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque newtypes over `String`. They serialize transparently
//! so wire payloads and storage keys carry plain strings, while call sites get
//! compile-time protection against mixing up unrelated id spaces (a module id
//! passed where an incident id is expected, for example).

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Declares a transparent string-backed identifier newtype.
macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the owned string.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(ModuleId, "Unique module identifier of form `<category>.<name>`.");
string_id!(CorrelationId, "Correlation identifier propagated across derivative events.");
string_id!(RequestId, "Approval request identifier.");
string_id!(TokenId, "Approval token identifier.");
string_id!(AuditId, "Audit entry identifier.");
string_id!(IncidentId, "Incident identifier.");
string_id!(GroupId, "Correlation group identifier.");
string_id!(RuleId, "Threshold detector rule identifier.");

impl ModuleId {
    /// Splits the identifier into its `(category, name)` parts.
    ///
    /// Returns `None` when the identifier does not contain exactly one `.`
    /// separator, i.e. it is not of the required `<category>.<name>` form.
    #[must_use]
    pub fn category_and_name(&self) -> Option<(&str, &str)> {
        self.0.split_once('.')
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleId;

    #[test]
    fn category_and_name_splits_on_first_dot() {
        let id = ModuleId::new("detector.threshold.cpu");
        assert_eq!(id.category_and_name(), Some(("detector", "threshold.cpu")));
    }

    #[test]
    fn category_and_name_rejects_missing_separator() {
        let id = ModuleId::new("detector");
        assert_eq!(id.category_and_name(), None);
    }

    #[test]
    fn ids_are_ordered_lexicographically() {
        let mut ids = vec![ModuleId::new("b"), ModuleId::new("a"), ModuleId::new("c")];
        ids.sort();
        assert_eq!(ids, vec![ModuleId::new("a"), ModuleId::new("b"), ModuleId::new("c")]);
    }
}
