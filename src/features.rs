//! Feature flag surface (§6 "Feature flag surface"): an advisory map from
//! SCXML constructs to how completely this crate implements them. Purely
//! informational — nothing here affects parsing or execution, it just
//! gives a host a single place to ask "can I rely on `<invoke>`?" before
//! shipping a document that uses it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// Implemented per the W3C semantics this crate targets.
    Supported,
    /// Parses and runs, but with a narrowed or simplified semantics —
    /// see the construct's own doc comment for the gap.
    Partial,
    /// Recognized by name only (parsed and ignored, or rejected) —
    /// no runtime behavior is implemented.
    Unsupported,
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Support::Supported => "supported",
            Support::Partial => "partial",
            Support::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

/// One row of the feature surface: a construct name (as it appears in
/// SCXML source, e.g. `"<invoke>"` or `"history.deep"`) plus its support
/// level and a one-line note on what a caller should expect.
#[derive(Debug, Clone, Copy)]
pub struct Feature {
    pub name: &'static str,
    pub support: Support,
    pub note: &'static str,
}

/// The full feature surface this crate implements, in no particular order.
/// Grounded directly in the module list that carries each construct:
/// `document`/`reader` for parsing, `fsm` for execution, `resolver` for
/// transition selection.
pub fn surface() -> Vec<Feature> {
    vec![
        Feature { name: "state", support: Support::Supported, note: "atomic and compound states" },
        Feature { name: "parallel", support: Support::Supported, note: "full orthogonal-region semantics" },
        Feature { name: "final", support: Support::Supported, note: "no <donedata> payload" },
        Feature { name: "history.shallow", support: Support::Supported, note: "" },
        Feature { name: "history.deep", support: Support::Supported, note: "" },
        Feature { name: "initial (attribute)", support: Support::Supported, note: "" },
        Feature { name: "initial (element)", support: Support::Supported, note: "" },
        Feature {
            name: "transition.type",
            support: Support::Partial,
            note: "parsed and stored; exit/entry-set computation does not yet distinguish internal from external",
        },
        Feature { name: "transition.cond", support: Support::Supported, note: "" },
        Feature { name: "transition.event", support: Support::Supported, note: "token-prefix matching, including '*'" },
        Feature { name: "onentry", support: Support::Supported, note: "" },
        Feature { name: "onexit", support: Support::Supported, note: "" },
        Feature { name: "raise", support: Support::Supported, note: "" },
        Feature { name: "log", support: Support::Supported, note: "" },
        Feature { name: "assign", support: Support::Supported, note: "" },
        Feature { name: "if/elseif/else", support: Support::Supported, note: "" },
        Feature { name: "foreach", support: Support::Supported, note: "" },
        Feature {
            name: "send",
            support: Support::Partial,
            note: "internal targets enqueue; external targets are handed to the host, not delivered over a network",
        },
        Feature { name: "script", support: Support::Unsupported, note: "parsed and ignored" },
        Feature { name: "invoke", support: Support::Unsupported, note: "deferred to the host" },
        Feature { name: "datamodel/data", support: Support::Partial, note: "flattened to one document-level list regardless of nesting" },
        Feature {
            name: "datamodel (ECMAScript)",
            support: Support::Unsupported,
            note: "only the bundled evaluator ships; a host may plug in a richer one via the Evaluator trait",
        },
    ]
}

/// Looks up a single construct's support level by name.
pub fn support_for(name: &str) -> Option<Support> {
    surface().into_iter().find(|f| f.name == name).map(|f| f.support)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_constructs_are_fully_supported() {
        for name in ["state", "parallel", "transition.cond", "foreach"] {
            assert_eq!(support_for(name), Some(Support::Supported));
        }
    }

    #[test]
    fn invoke_is_unsupported() {
        assert_eq!(support_for("invoke"), Some(Support::Unsupported));
    }

    #[test]
    fn unknown_construct_is_none() {
        assert_eq!(support_for("not-a-real-tag"), None);
    }
}
