//! Lowering of the syntax tree into an `hlox_ir::Module`.
//!
//! Names are resolved in definition order: an operand must be defined
//! earlier in its computation, and a computation called by `while` must be
//! defined before the computation that calls it.

use std::collections::{HashMap, HashSet};

use hlox_ir::{
    ComparisonDirection, Computation, GatherDimensionNumbers, InstrId, Instruction, Literal,
    Module, Op, OpMetadata, Opcode, Shape, check_shape, parse_element,
};
use nom::{
    IResult, Parser as _,
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag},
    character::complete::{char, multispace0, u32 as line_number},
    combinator::{all_consuming, map, opt, value},
    multi::many0,
    sequence::{delimited, preceded, separated_pair},
};

use crate::ParseError;
use crate::syntax::{ComputationAst, InstructionAst, ModuleAst, name};

/// Maps positions in the source back to line numbers.
pub(crate) struct Lines<'a> {
    source: &'a str,
}

impl<'a> Lines<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// 1-based line of a slice taken from the source.
    pub(crate) fn line_of(&self, fragment: &str) -> usize {
        let start = self.source.as_ptr() as usize;
        let offset = (fragment.as_ptr() as usize)
            .saturating_sub(start)
            .min(self.source.len());
        self.source[..offset].matches('\n').count() + 1
    }
}

/// Attributes of one instruction, tracking which ones were consumed.
struct Attributes<'a> {
    items: Vec<(&'a str, &'a str, bool)>,
    line: usize,
}

impl<'a> Attributes<'a> {
    fn new(items: &[(&'a str, &'a str)], line: usize) -> Self {
        Self {
            items: items.iter().map(|&(k, v)| (k, v, false)).collect(),
            line,
        }
    }

    fn take(&mut self, key: &str) -> Option<&'a str> {
        let item = self.items.iter_mut().find(|(k, _, used)| *k == key && !*used)?;
        item.2 = true;
        Some(item.1)
    }

    fn require(&mut self, key: &str) -> Result<&'a str, ParseError> {
        self.take(key).ok_or_else(|| ParseError::Syntax {
            line: self.line,
            message: format!("missing attribute `{key}`"),
        })
    }

    fn require_list<T: std::str::FromStr>(&mut self, key: &str) -> Result<Vec<T>, ParseError> {
        let text = self.require(key)?;
        parse_list(text).ok_or_else(|| ParseError::Syntax {
            line: self.line,
            message: format!("`{key}` is not a list of integers: {{{text}}}"),
        })
    }

    fn require_number<T: std::str::FromStr>(&mut self, key: &str) -> Result<T, ParseError> {
        let text = self.require(key)?;
        text.parse().map_err(|_| ParseError::Syntax {
            line: self.line,
            message: format!("`{key}` is not a number: {text}"),
        })
    }

    fn finish(self) -> Result<(), ParseError> {
        match self.items.iter().find(|(_, _, used)| !*used) {
            Some((key, ..)) => Err(ParseError::Syntax {
                line: self.line,
                message: format!("unexpected attribute `{key}`"),
            }),
            None => Ok(()),
        }
    }
}

fn parse_list<T: std::str::FromStr>(text: &str) -> Option<Vec<T>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// `[start:limit]` entries of a `slice` attribute. A stride, if present,
/// must be 1.
fn parse_slice_ranges(text: &str) -> Option<(Vec<i64>, Vec<i64>)> {
    let mut starts = Vec::new();
    let mut limits = Vec::new();
    for range in text.split(']') {
        let range = range.trim().trim_start_matches(',').trim();
        if range.is_empty() {
            continue;
        }
        let inner = range.strip_prefix('[')?;
        let parts: Vec<i64> = parse_list(&inner.replace(':', ","))?;
        match parts[..] {
            [start, limit] | [start, limit, 1] => {
                starts.push(start);
                limits.push(limit);
            }
            _ => return None,
        }
    }
    Some((starts, limits))
}

fn quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((value("\\", tag("\\")), value("\"", tag("\"")))),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )
    .parse(input)
}

enum MetadataValue {
    Text(String),
    Line(u32),
}

fn metadata_field(input: &str) -> IResult<&str, (&str, MetadataValue)> {
    preceded(
        multispace0,
        separated_pair(
            name,
            char('='),
            alt((
                map(quoted, MetadataValue::Text),
                map(line_number, MetadataValue::Line),
            )),
        ),
    )
    .parse(input)
}

fn parse_metadata(text: &str, line: usize) -> Result<OpMetadata, ParseError> {
    let syntax = |message: String| ParseError::Syntax { line, message };
    let (_, fields) = all_consuming(delimited(multispace0, many0(metadata_field), multispace0))
        .parse(text)
        .map_err(|_| syntax(format!("malformed metadata {{{text}}}")))?;
    let mut md = OpMetadata::default();
    for (key, value) in fields {
        match (key, value) {
            ("op_type", MetadataValue::Text(s)) => md.op_type = s,
            ("op_name", MetadataValue::Text(s)) => md.op_name = s,
            ("source_file", MetadataValue::Text(s)) => md.source_file = s,
            ("source_line", MetadataValue::Line(n)) => md.source_line = n,
            (key, _) => return Err(syntax(format!("unknown metadata field `{key}`"))),
        }
    }
    Ok(md)
}

fn parse_constant(text: &str, shape: &Shape, line: usize) -> Result<Literal, ParseError> {
    let syntax = |message: String| ParseError::Syntax { line, message };
    let Some(element_type) = shape.element_type() else {
        return Err(syntax(format!("constant must have an array shape, got {shape}")));
    };
    let data = text
        .split(|c: char| c == '{' || c == '}' || c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            parse_element(element_type, token)
                .ok_or_else(|| syntax(format!("invalid {element_type} value `{token}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Literal::new(shape.clone(), data).map_err(|source| ParseError::Ir { line, source })
}

struct Lowerer<'s> {
    lines: Lines<'s>,
    module: Module,
}

impl<'s> Lowerer<'s> {
    fn lower_op(
        &self,
        instr: &InstructionAst<'s>,
        line: usize,
        attrs: &mut Attributes<'s>,
    ) -> Result<Op, ParseError> {
        let syntax = |message: String| ParseError::Syntax { line, message };
        let opcode = Opcode::from_name(instr.opcode)
            .ok_or_else(|| syntax(format!("unknown opcode `{}`", instr.opcode)))?;
        let op = match opcode {
            Opcode::Parameter => Op::Parameter {
                number: instr
                    .args
                    .trim()
                    .parse()
                    .map_err(|_| syntax(format!("invalid parameter number `{}`", instr.args)))?,
            },
            Opcode::Constant => Op::Constant(parse_constant(instr.args, &instr.shape, line)?),
            Opcode::Add => Op::Add,
            Opcode::Compare => {
                let text = attrs.require("direction")?;
                let direction = ComparisonDirection::from_name(text)
                    .ok_or_else(|| syntax(format!("unknown comparison direction `{text}`")))?;
                Op::Compare { direction }
            }
            Opcode::Clamp => Op::Clamp,
            Opcode::Broadcast => Op::Broadcast {
                dimensions: attrs.require_list("dimensions")?,
            },
            Opcode::Reshape => Op::Reshape,
            Opcode::Convert => Op::Convert,
            Opcode::Transpose => Op::Transpose {
                permutation: attrs.require_list("dimensions")?,
            },
            Opcode::Slice => {
                let text = attrs.require("slice")?;
                let (starts, limits) = parse_slice_ranges(text)
                    .ok_or_else(|| syntax(format!("invalid slice {{{text}}}")))?;
                Op::Slice { starts, limits }
            }
            Opcode::DynamicSlice => Op::DynamicSlice {
                sizes: attrs.require_list("dynamic_slice_sizes")?,
            },
            Opcode::DynamicUpdateSlice => Op::DynamicUpdateSlice,
            Opcode::Concatenate => match attrs.require_list::<usize>("dimensions")?[..] {
                [dimension] => Op::Concatenate { dimension },
                _ => return Err(syntax("concatenate takes exactly one dimension".into())),
            },
            Opcode::Tuple => Op::Tuple,
            Opcode::GetTupleElement => Op::GetTupleElement {
                index: attrs.require_number("index")?,
            },
            Opcode::While => {
                let mut callee = |key: &str| -> Result<_, ParseError> {
                    let callee_name = attrs.require(key)?.trim_start_matches('%');
                    self.module
                        .find_computation(callee_name)
                        .ok_or_else(|| ParseError::UnknownName {
                            line,
                            name: callee_name.to_string(),
                        })
                };
                let condition = callee("condition")?;
                let body = callee("body")?;
                Op::While { condition, body }
            }
            Opcode::Gather => {
                let dimension_numbers = GatherDimensionNumbers {
                    offset_dims: attrs.require_list("offset_dims")?,
                    collapsed_slice_dims: attrs.require_list("collapsed_slice_dims")?,
                    start_index_map: attrs.require_list("start_index_map")?,
                    index_vector_dim: attrs.require_number("index_vector_dim")?,
                };
                let slice_sizes = attrs.require_list("slice_sizes")?;
                // Accepted for compatibility; carries no semantics here.
                attrs.take("indices_are_sorted");
                Op::Gather {
                    dimension_numbers,
                    slice_sizes,
                }
            }
        };
        Ok(op)
    }

    fn lower_computation(&self, ast: &ComputationAst<'s>) -> Result<Computation, ParseError> {
        let comp_line = self.lines.line_of(ast.name);
        let mut comp = Computation::new(ast.name);
        let mut names: HashMap<&str, InstrId> = HashMap::new();
        let mut parameter_numbers = HashSet::new();
        let mut root = None;

        for instr in &ast.instructions {
            let line = self.lines.line_of(instr.name);
            let mut attrs = Attributes::new(&instr.attributes, line);
            let op = self.lower_op(instr, line, &mut attrs)?;
            let metadata = match attrs.take("metadata") {
                Some(text) => parse_metadata(text, line)?,
                None => OpMetadata::default(),
            };
            attrs.finish()?;

            let operands = match op {
                Op::Parameter { .. } | Op::Constant(_) => Vec::new(),
                _ => resolve_operands(instr.args, &names, line)?,
            };
            let shapes: Vec<&Shape> = operands.iter().map(|&id| comp.shape(id)).collect();
            check_shape(&op, &shapes, &instr.shape).map_err(|source| ParseError::Ir { line, source })?;

            if names.contains_key(instr.name) {
                return Err(ParseError::Syntax {
                    line,
                    message: format!("`{}` is defined twice", instr.name),
                });
            }
            if let Op::Parameter { number } = op
                && !parameter_numbers.insert(number)
            {
                return Err(ParseError::Syntax {
                    line,
                    message: format!("parameter {number} is defined twice"),
                });
            }
            let mut instruction = Instruction::new(instr.name, op, operands, instr.shape.clone());
            instruction.metadata = metadata;
            let id = comp.add_instruction(instruction);
            names.insert(instr.name, id);
            if instr.is_root {
                if root.is_some() {
                    return Err(ParseError::Syntax {
                        line,
                        message: format!("{} has more than one ROOT", ast.name),
                    });
                }
                root = Some(id);
            }
        }

        let root = root
            .or_else(|| comp.instruction_ids().last().copied())
            .ok_or_else(|| ParseError::Syntax {
                line: comp_line,
                message: format!("computation {} is empty", ast.name),
            })?;
        comp.set_root(root);
        Ok(comp)
    }
}

fn resolve_operands(
    args: &str,
    names: &HashMap<&str, InstrId>,
    line: usize,
) -> Result<Vec<InstrId>, ParseError> {
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                pieces.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&args[start..]);

    pieces
        .into_iter()
        .map(|piece| {
            // Operands may be written with their shape, as in `s32[2] %indices`.
            let token = piece.split_whitespace().last().ok_or_else(|| ParseError::Syntax {
                line,
                message: format!("empty operand in ({args})"),
            })?;
            let operand_name = token.trim_start_matches('%');
            names
                .get(operand_name)
                .copied()
                .ok_or_else(|| ParseError::UnknownName {
                    line,
                    name: operand_name.to_string(),
                })
        })
        .collect()
}

pub(crate) fn lower_module(ast: &ModuleAst<'_>, source: &str) -> Result<Module, ParseError> {
    let mut lowerer = Lowerer {
        lines: Lines::new(source),
        module: Module::new(ast.name),
    };
    let mut entry = None;
    for comp_ast in &ast.computations {
        let line = lowerer.lines.line_of(comp_ast.name);
        if lowerer.module.find_computation(comp_ast.name).is_some() {
            return Err(ParseError::Syntax {
                line,
                message: format!("computation {} is defined twice", comp_ast.name),
            });
        }
        let comp = lowerer.lower_computation(comp_ast)?;
        let id = lowerer.module.add_computation(comp);
        if comp_ast.is_entry {
            if entry.is_some() {
                return Err(ParseError::Syntax {
                    line,
                    message: "more than one ENTRY computation".into(),
                });
            }
            entry = Some(id);
        }
    }
    let entry = entry
        .or_else(|| lowerer.module.computation_ids().last().copied())
        .ok_or_else(|| ParseError::Syntax {
            line: 1,
            message: "module has no computations".into(),
        })?;
    lowerer.module.set_entry(entry);
    Ok(lowerer.module)
}
