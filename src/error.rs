use std::fmt;

use thiserror::Error;
use tracing::warn;

/// Convenience alias for plan-document results.
pub type Result<T> = std::result::Result<T, PlanParseError>;

/// Structured errors raised while turning an explain document into a plan tree.
///
/// Every variant is fatal: the builder never hands back a partial tree.
#[derive(Debug, Error)]
pub enum PlanParseError {
    /// The payload was not valid JSON or a field carried the wrong JSON type.
    #[error("malformed plan document: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field was absent from a plan node.
    #[error("plan node{} is missing required field '{field}'", describe_node(.node_type))]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
        /// Operator type of the offending node, when known.
        node_type: Option<String>,
    },
    /// A numeric sub-plan entry does not resolve inside the replacement-target set.
    #[error("sub-plan reference {index} does not resolve ({targets} replacement targets)")]
    DanglingReference {
        /// Index found in the `plans` array.
        index: u64,
        /// Size of the replacement-target set in scope.
        targets: usize,
    },
    /// A numeric sub-plan entry was reached while its target was still being built.
    #[error("sub-plan reference {index} forms a cycle")]
    ReferenceCycle {
        /// Index found in the `plans` array.
        index: u64,
    },
    /// `suggested_display_ctx_idx` points outside the node's `contexts` list.
    #[error("display context index {index} out of range ({len} contexts)")]
    ContextOutOfRange {
        /// Requested display index.
        index: usize,
        /// Number of contexts carried by the node.
        len: usize,
    },
    /// A context references a buffer the document does not carry.
    #[error("context references buffer {buffer_idx} but the document has {buffers} buffers")]
    BufferOutOfRange {
        /// Referenced buffer index.
        buffer_idx: usize,
        /// Number of buffers in the document.
        buffers: usize,
    },
}

fn describe_node(node_type: &Option<String>) -> String {
    match node_type {
        Some(name) => format!(" '{name}'"),
        None => String::new(),
    }
}

impl PlanParseError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlanParseError::Json(_) => "MalformedJson",
            PlanParseError::MissingField { .. } => "MissingField",
            PlanParseError::DanglingReference { .. } => "DanglingReference",
            PlanParseError::ReferenceCycle { .. } => "ReferenceCycle",
            PlanParseError::ContextOutOfRange { .. } => "ContextOutOfRange",
            PlanParseError::BufferOutOfRange { .. } => "BufferOutOfRange",
        }
    }

    pub(crate) fn missing(field: &'static str, node_type: Option<&str>) -> Self {
        let err = PlanParseError::MissingField {
            field,
            node_type: node_type.map(str::to_string),
        };
        warn!(code = err.code(), field, "plan.parse.rejected");
        err
    }
}

/// Convenience wrapper that formats parse errors with their codes.
pub struct PlanParseErrorWithCode<'a>(pub &'a PlanParseError);

impl fmt::Display for PlanParseErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
