//! Grammar of the text format, producing an unresolved syntax tree.
//!
//! ```text
//! module       := "HloModule" name header-rest computation*
//! computation  := ["ENTRY"] name signature? "{" instruction* "}"
//! instruction  := ["ROOT"] name "=" shape opcode "(" args ")" ("," attribute)*
//! shape        := type "[" dims "]" layout? | "(" shape ("," shape)* ")"
//! attribute    := key "=" (braced | token)
//! ```
//!
//! Attribute values and call arguments are kept as raw text; their meaning
//! depends on the opcode and is resolved by `lower`.

use hlox_ir::{PrimitiveType, Shape};
use nom::{
    IResult, Parser as _,
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, i64 as integer, multispace0, multispace1, not_line_ending},
    combinator::{all_consuming, cut, map, map_opt, opt, verify},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded, terminated},
};

#[derive(Debug)]
pub(crate) struct ModuleAst<'a> {
    pub name: &'a str,
    pub computations: Vec<ComputationAst<'a>>,
}

#[derive(Debug)]
pub(crate) struct ComputationAst<'a> {
    pub is_entry: bool,
    pub name: &'a str,
    pub instructions: Vec<InstructionAst<'a>>,
}

#[derive(Debug)]
pub(crate) struct InstructionAst<'a> {
    pub is_root: bool,
    pub name: &'a str,
    pub shape: Shape,
    pub opcode: &'a str,
    /// Text between the call parentheses.
    pub args: &'a str,
    pub attributes: Vec<(&'a str, &'a str)>,
}

fn ws<'a, O, P>(inner: P) -> impl nom::Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    P: nom::Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Instruction, computation or attribute name. A leading `%` is dropped.
pub(crate) fn name(input: &str) -> IResult<&str, &str> {
    preceded(opt(char('%')), take_while1(is_name_char)).parse(input)
}

/// Contents of a `{...}` group, braces balanced and string literals skipped.
pub(crate) fn braced(input: &str) -> IResult<&str, &str> {
    let Some(body) = input.strip_prefix('{') else {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Char)));
    };
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[i + 1..], &body[..i]));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Failure(Error::new(input, ErrorKind::TakeUntil)))
}

fn element_type(input: &str) -> IResult<&str, PrimitiveType> {
    map_opt(take_while1(|c: char| c.is_ascii_alphanumeric()), PrimitiveType::from_name).parse(input)
}

fn array_shape(input: &str) -> IResult<&str, Shape> {
    map(
        (
            element_type,
            delimited(
                char('['),
                separated_list0(char(','), ws(verify(integer, |d: &i64| *d >= 0))),
                char(']'),
            ),
            opt(braced),
        ),
        |(ty, dims, _layout)| Shape::array(ty, dims),
    )
    .parse(input)
}

fn tuple_shape(input: &str) -> IResult<&str, Shape> {
    map(
        delimited(
            char('('),
            separated_list0(char(','), ws(shape)),
            char(')'),
        ),
        Shape::Tuple,
    )
    .parse(input)
}

pub(crate) fn shape(input: &str) -> IResult<&str, Shape> {
    alt((tuple_shape, array_shape)).parse(input)
}

fn attribute(input: &str) -> IResult<&str, (&str, &str)> {
    (
        name,
        preceded(
            ws(char('=')),
            cut(alt((braced, take_while1(|c: char| is_name_char(c) || c == '%')))),
        ),
    )
        .parse(input)
}

fn instruction(input: &str) -> IResult<&str, InstructionAst<'_>> {
    let (input, is_root) =
        map(opt(terminated(tag("ROOT"), multispace1)), |r| r.is_some()).parse(input)?;
    let (input, instr_name) = name(input)?;
    let (input, _) = ws(char('=')).parse(input)?;
    let (input, (result_shape, opcode, args, attributes)) = cut((
        terminated(shape, multispace1),
        name,
        delimited(char('('), take_till(|c: char| c == ')'), char(')')),
        many0(preceded(ws(char(',')), attribute)),
    ))
    .parse(input)?;
    Ok((
        input,
        InstructionAst {
            is_root,
            name: instr_name,
            shape: result_shape,
            opcode,
            args,
            attributes,
        },
    ))
}

fn computation(input: &str) -> IResult<&str, ComputationAst<'_>> {
    let (input, is_entry) =
        map(opt(terminated(tag("ENTRY"), multispace1)), |e| e.is_some()).parse(input)?;
    let (input, comp_name) = name(input)?;
    // Optional signature such as `(p: s32[]) -> s32[]` is not needed.
    let (input, _) = take_till(|c: char| c == '{' || c == '}').parse(input)?;
    let (input, instructions) = cut(delimited(
        char('{'),
        many0(ws(instruction)),
        char('}'),
    ))
    .parse(input)?;
    Ok((
        input,
        ComputationAst {
            is_entry,
            name: comp_name,
            instructions,
        },
    ))
}

pub(crate) fn module(input: &str) -> IResult<&str, ModuleAst<'_>> {
    let (input, _) = ws(tag("HloModule")).parse(input)?;
    let (input, (module_name, _header)) = cut((name, not_line_ending)).parse(input)?;
    let (input, computations) = all_consuming(terminated(
        many0(ws(computation)),
        take_while(|c: char| c.is_whitespace()),
    ))
    .parse(input)?;
    Ok((
        input,
        ModuleAst {
            name: module_name,
            computations,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlox_ir::PrimitiveType::{S32, U8};

    #[test]
    fn shapes_with_layouts_and_tuples() {
        assert_eq!(shape("s32[3,3]{1,0}").unwrap().1, Shape::array(S32, [3, 3]));
        assert_eq!(shape("u8[]").unwrap().1, Shape::scalar(U8));
        assert_eq!(
            shape("(s32[], s32[2]{0})").unwrap().1,
            Shape::tuple([Shape::scalar(S32), Shape::array(S32, [2])])
        );
        assert_eq!(shape("s32[3, 1]").unwrap().1, Shape::array(S32, [3, 1]));
        assert!(shape("i32[3]").is_err());
        assert!(shape("s32[-1]").is_err());
    }

    #[test]
    fn braced_skips_nested_and_quoted() {
        let (rest, inner) = braced("{op_name=\"a}b\" x={1}}, tail").unwrap();
        assert_eq!(inner, "op_name=\"a}b\" x={1}");
        assert_eq!(rest, ", tail");
        assert!(braced("{unterminated").is_err());
    }

    #[test]
    fn instruction_with_wrapped_attributes() {
        let text = "ROOT gather = s32[3,2] gather(operand, indices),\n      offset_dims={0},\n      slice_sizes={3, 1}";
        let (rest, instr) = instruction(text).unwrap();
        assert!(rest.is_empty());
        assert!(instr.is_root);
        assert_eq!(instr.name, "gather");
        assert_eq!(instr.opcode, "gather");
        assert_eq!(instr.args, "operand, indices");
        assert_eq!(instr.attributes, vec![("offset_dims", "0"), ("slice_sizes", "3, 1")]);
    }

    #[test]
    fn module_with_signature_and_percent_names() {
        let text = "HloModule m, is_scheduled=true\n\n%body (p: s32[]) -> s32[] {\n  %p = s32[] parameter(0)\n}\n\nENTRY %main {\n  ROOT c = s32[] constant(1)\n}\n";
        let (_, ast) = module(text).unwrap();
        assert_eq!(ast.name, "m");
        assert_eq!(ast.computations.len(), 2);
        assert_eq!(ast.computations[0].name, "body");
        assert_eq!(ast.computations[0].instructions[0].name, "p");
        assert!(ast.computations[1].is_entry);
        assert_eq!(ast.computations[1].instructions[0].args, "1");
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(module("HloModule m\nENTRY e {\n}\nstray").is_err());
    }
}
