//! Text format parser for Hlox.
//!
//! Reads the format written by [`hlox_ir::dump_module`] (and HLO-like text
//! in general) into an [`hlox_ir::Module`]. Parsing happens in two steps: a
//! `nom` grammar produces an unresolved syntax tree, then lowering resolves
//! names, attributes and literals and checks every declared shape.

mod lower;
mod syntax;

use hlox_ir::{IrError, Module};

/// Parse a module from text.
///
/// The computation marked `ENTRY` becomes the entry computation; without a
/// marker the last computation is used. Within a computation the `ROOT`
/// instruction defaults to the last one.
pub fn parse(source: &str) -> Result<Module, ParseError> {
    let lines = lower::Lines::new(source);
    let (_, ast) = syntax::module(source).map_err(|err| match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => ParseError::Syntax {
            line: lines.line_of(e.input),
            message: format!("unexpected input {}", snippet(e.input)),
        },
        nom::Err::Incomplete(_) => ParseError::Syntax {
            line: lines.line_of(&source[source.len()..]),
            message: "unexpected end of input".into(),
        },
    })?;
    lower::lower_module(&ast, source)
}

fn snippet(rest: &str) -> String {
    let first_line = rest.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "at end of input".into();
    }
    let mut text: String = first_line.chars().take(40).collect();
    if text.len() < first_line.len() {
        text.push_str("...");
    }
    format!("near `{text}`")
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: unknown name `{name}`")]
    UnknownName { line: usize, name: String },
    #[error("line {line}: {source}")]
    Ir {
        line: usize,
        #[source]
        source: IrError,
    },
}

impl ParseError {
    /// 1-based line the error was reported at.
    pub fn line(&self) -> usize {
        match self {
            Self::Syntax { line, .. } | Self::UnknownName { line, .. } | Self::Ir { line, .. } => {
                *line
            }
        }
    }
}
