//! Error types for the Hlox IR.

/// Errors raised while building, mutating, verifying or evaluating IR.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A handle does not name a live value of its container.
    #[error("handle {index} does not name a live {kind}")]
    BadHandle { kind: &'static str, index: usize },

    /// Operand shapes are inconsistent with an operation.
    #[error("shape mismatch in {op}: {message}")]
    ShapeMismatch { op: &'static str, message: String },

    /// An attribute value is out of range or malformed.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// An instruction cannot be removed while other instructions use it.
    #[error("instruction {name} still has {users} user(s)")]
    HasUsers { name: String, users: usize },

    /// The structural verifier rejected a computation.
    #[error("verification failed in {computation}: {message}")]
    Verification {
        computation: String,
        message: String,
    },

    /// The reference evaluator could not run a computation.
    #[error("evaluation failed: {0}")]
    Eval(String),
}

impl IrError {
    pub(crate) fn shape(op: &'static str, message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            op,
            message: message.into(),
        }
    }
}
