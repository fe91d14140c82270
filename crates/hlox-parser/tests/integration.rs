//! Integration tests for the text format parser.

use hlox_ir::{
    Literal, Op, Opcode, PrimitiveType, Shape, Value, dump_module, evaluate, verify_module,
};
use hlox_parser::{ParseError, parse};

const SIMPLE_GATHER: &str = r#"
HloModule test_module

ENTRY main {
  operand = s32[3,3] parameter(0)
  indices = s32[2] parameter(1)
  ROOT gather = s32[3,2] gather(operand, indices),
      offset_dims={0},
      collapsed_slice_dims={1},
      start_index_map={1},
      index_vector_dim=1,
      slice_sizes={3, 1},
      metadata={op_name="Gather"}
}
"#;

const COUNTING_LOOP: &str = r#"
HloModule counting_loop

cond {
  state = (s32[], s32[3]) parameter(0)
  i = s32[] get-tuple-element(state), index=0
  n = s32[] constant(3)
  ROOT lt = pred[] compare(i, n), direction=LT
}

body {
  state = (s32[], s32[3]) parameter(0)
  i = s32[] get-tuple-element(state), index=0
  acc = s32[3] get-tuple-element(state), index=1
  one = s32[] constant(1)
  next = s32[] add(i, one)
  value = s32[1] reshape(next)
  at = s32[1] reshape(i)
  updated = s32[3] dynamic-update-slice(acc, value, at)
  ROOT t = (s32[], s32[3]) tuple(next, updated)
}

ENTRY main {
  zero = s32[] constant(0)
  init = s32[3] constant({0, 0, 0})
  t = (s32[], s32[3]) tuple(zero, init)
  w = (s32[], s32[3]) while(t), condition=cond, body=body
  ROOT out = s32[3] get-tuple-element(w), index=1
}
"#;

#[test]
fn parse_simple_gather() {
    let module = parse(SIMPLE_GATHER).expect("gather module should parse");
    verify_module(&module).unwrap();
    assert_eq!(module.name, "test_module");
    assert_eq!(module.computation_count(), 1);

    let main = module.entry_computation();
    assert_eq!(main.instruction_count(), 3);
    let root = main.instruction(main.root().unwrap());
    assert_eq!(root.name, "gather");
    assert_eq!(root.shape, Shape::array(PrimitiveType::S32, [3, 2]));
    assert_eq!(root.metadata.op_name, "Gather");
    let Op::Gather {
        dimension_numbers,
        slice_sizes,
    } = &root.op
    else {
        panic!("root should be a gather, got {:?}", root.op);
    };
    assert_eq!(dimension_numbers.offset_dims, vec![0]);
    assert_eq!(dimension_numbers.collapsed_slice_dims, vec![1]);
    assert_eq!(dimension_numbers.start_index_map, vec![1]);
    assert_eq!(dimension_numbers.index_vector_dim, 1);
    assert_eq!(slice_sizes, &vec![3, 1]);
}

#[test]
fn parse_large_index_count() {
    // The indices are never materialized, so huge extents parse fine.
    let source = r#"
HloModule test_module

ENTRY main {
  operand = s32[3,3] parameter(0)
  indices = s32[2147483647,5] parameter(1)
  ROOT gather = s32[2147483647,3,5] gather(operand, indices),
      offset_dims={1},
      collapsed_slice_dims={1},
      start_index_map={1},
      index_vector_dim=2,
      slice_sizes={3, 1}
}
"#;
    let module = parse(source).unwrap();
    verify_module(&module).unwrap();
    assert!(module.entry_computation().contains_opcode(Opcode::Gather));
}

#[test]
fn dump_round_trips() {
    for source in [SIMPLE_GATHER, COUNTING_LOOP] {
        let module = parse(source).unwrap();
        let text = dump_module(&module);
        let reparsed = parse(&text).unwrap_or_else(|e| panic!("{e}\n{text}"));
        assert_eq!(dump_module(&reparsed), text);
    }
}

#[test]
fn parsed_loop_evaluates() {
    let module = parse(COUNTING_LOOP).unwrap();
    verify_module(&module).unwrap();
    assert_eq!(module.computation_count(), 3);
    let out = evaluate(&module, &[]).unwrap();
    assert_eq!(
        out,
        Value::Array(Literal::vector(PrimitiveType::S32, &[1, 2, 3]))
    );
}

#[test]
fn parsed_gather_evaluates() {
    let module = parse(SIMPLE_GATHER).unwrap();
    let operand = Literal::new(
        Shape::array(PrimitiveType::S32, [3, 3]),
        (1..=9).collect(),
    )
    .unwrap();
    let indices = Literal::vector(PrimitiveType::S32, &[0, 2]);
    let out = evaluate(&module, &[operand, indices]).unwrap();
    let expected = Literal::new(
        Shape::array(PrimitiveType::S32, [3, 2]),
        vec![1, 3, 4, 6, 7, 9],
    )
    .unwrap();
    assert_eq!(out, Value::Array(expected));
}

#[test]
fn percent_names_layouts_and_signatures() {
    let source = r#"
HloModule m, entry_computation_layout={(s32[2]{0})->s32[2]{0}}

ENTRY %main (p: s32[2]) -> s32[2] {
  %p = s32[2]{0} parameter(0)
  %c = s32[2]{0} constant({1, 2})
  ROOT %sum = s32[2]{0} add(s32[2]{0} %p, s32[2]{0} %c)
}
"#;
    let module = parse(source).unwrap();
    let main = module.entry_computation();
    assert_eq!(main.instruction(main.root().unwrap()).name, "sum");
    let out = evaluate(&module, &[Literal::vector(PrimitiveType::S32, &[10, 20])]).unwrap();
    assert_eq!(
        out,
        Value::Array(Literal::vector(PrimitiveType::S32, &[11, 22]))
    );
}

#[test]
fn root_and_entry_default_to_last() {
    let source = "HloModule m\n\nmain {\n  a = f32[] constant(1.5)\n  b = f32[] add(a, a)\n}\n";
    let module = parse(source).unwrap();
    let main = module.entry_computation();
    assert_eq!(main.instruction(main.root().unwrap()).name, "b");
}

#[test]
fn unknown_operand_is_reported_with_line() {
    let source = "HloModule m\n\nENTRY main {\n  a = s32[] constant(1)\n  ROOT b = s32[] add(a, c)\n}\n";
    match parse(source) {
        Err(ParseError::UnknownName { line, name }) => {
            assert_eq!(line, 5);
            assert_eq!(name, "c");
        }
        other => panic!("expected an unknown name error, got {other:?}"),
    }
}

#[test]
fn unknown_loop_computation_is_reported() {
    let source = "HloModule m\n\nENTRY main {\n  t = (s32[]) parameter(0)\n  ROOT w = (s32[]) while(t), condition=cond, body=body\n}\n";
    let err = parse(source).unwrap_err();
    assert!(matches!(err, ParseError::UnknownName { ref name, .. } if name == "cond"), "{err}");
}

#[test]
fn declared_shape_must_match() {
    let source = "HloModule m\n\nENTRY main {\n  a = s32[2] parameter(0)\n  ROOT b = s32[3] add(a, a)\n}\n";
    let err = parse(source).unwrap_err();
    assert!(matches!(err, ParseError::Ir { line: 5, .. }), "{err}");
}

#[test]
fn integer_convert_parses_and_evaluates() {
    let source = "HloModule m\n\nENTRY main {\n  a = u8[2] parameter(0)\n  ROOT b = s64[2] convert(a)\n}\n";
    let module = parse(source).unwrap();
    verify_module(&module).unwrap();
    let value = evaluate(&module, &[Literal::vector(PrimitiveType::U8, &[200, 7])]).unwrap();
    assert_eq!(value, Value::Array(Literal::vector(PrimitiveType::S64, &[200, 7])));
    assert_eq!(parse(&dump_module(&module)).unwrap().computation_count(), 1);

    let float = "HloModule m\n\nENTRY main {\n  a = u8[2] parameter(0)\n  ROOT b = f32[2] convert(a)\n}\n";
    assert!(matches!(parse(float), Err(ParseError::Ir { line: 5, .. })));
}

#[test]
fn attribute_errors() {
    let missing = "HloModule m\n\nENTRY main {\n  a = s32[2,3] parameter(0)\n  ROOT b = s32[3,2] transpose(a)\n}\n";
    let err = parse(missing).unwrap_err();
    assert!(err.to_string().contains("missing attribute `dimensions`"), "{err}");

    let unexpected = "HloModule m\n\nENTRY main {\n  a = s32[2] parameter(0)\n  ROOT b = s32[2] add(a, a), dimensions={0}\n}\n";
    let err = parse(unexpected).unwrap_err();
    assert!(err.to_string().contains("unexpected attribute `dimensions`"), "{err}");
}

#[test]
fn unknown_opcode_is_a_syntax_error() {
    let source = "HloModule m\n\nENTRY main {\n  a = s32[2] parameter(0)\n  ROOT b = s32[2] negate(a)\n}\n";
    let err = parse(source).unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 5, .. }), "{err}");
    assert!(err.to_string().contains("unknown opcode `negate`"));
}

#[test]
fn duplicate_names_are_rejected() {
    let source = "HloModule m\n\nENTRY main {\n  a = s32[] constant(1)\n  a = s32[] constant(2)\n}\n";
    assert!(matches!(parse(source), Err(ParseError::Syntax { line: 5, .. })));
}

#[test]
fn garbage_is_a_syntax_error() {
    assert!(matches!(parse(""), Err(ParseError::Syntax { line: 1, .. })));
    assert!(matches!(
        parse("HloModule m\n\nENTRY main {\n  a = s32[] parameter(0)\n"),
        Err(ParseError::Syntax { .. })
    ));
}
