use hlox_ir::IrError;

/// Machine-checkable category of an [`OptError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input uses a size the pass cannot lower.
    UnsupportedSize,
    /// An internal invariant failed while rewriting.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum OptError {
    #[error(
        "Gather operations with more than {limit} gather indices are not supported. \
         This error occurred for {instruction}."
    )]
    UnsupportedSize { limit: i64, instruction: String },
    #[error("internal error: {0}")]
    Ir(#[from] IrError),
}

impl OptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedSize { .. } => ErrorKind::UnsupportedSize,
            Self::Ir(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_size_message() {
        let err = OptError::UnsupportedSize {
            limit: 2147483647,
            instruction: "gather = s32[] gather(a, b)".into(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedSize);
        assert_eq!(
            err.to_string(),
            "Gather operations with more than 2147483647 gather indices are not supported. \
             This error occurred for gather = s32[] gather(a, b)."
        );
    }

    #[test]
    fn ir_errors_are_internal() {
        let err = OptError::from(IrError::InvalidAttribute("bad".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
