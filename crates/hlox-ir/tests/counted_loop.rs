//! Integration test: build a row-shifting loop programmatically, verify it,
//! evaluate it and check the text dump.

use hlox_ir::builder::*;
use hlox_ir::*;

/// Copies row `i + 1` of a `[3,4]` input into row `i` of the accumulator.
/// The last start is out of range and clamps back to row 2:
///
/// ```text
/// for i in 0..3:
///     acc[i, :] = x[min(i + 1, 2), :]
/// ```
fn build_shift_rows() -> Module {
    let mut module = Module::new("shift_rows");
    let mut main = Computation::new("main");
    let x = main.add_parameter(0, Shape::array(PrimitiveType::F32, [3, 4]), "x");
    let acc = make_zeros(&mut main, &Shape::array(PrimitiveType::F32, [3, 4])).unwrap();
    let entry = module.add_entry_computation(main);

    let lp = make_counted_loop(
        &mut module,
        entry,
        3,
        &[x, acc],
        |body, i, state| {
            let one = make_constant(body, Literal::scalar(PrimitiveType::S32, 1));
            let row = make_add(body, i, one)?;
            let row_vec = make_reshape(body, row, &[1])?;
            let start = pad_vector_with_zeros(body, row_vec, 0, 1)?;
            let slice = make_dynamic_slice(body, state[0], start, &[1, 4])?;
            let i_vec = make_reshape(body, i, &[1])?;
            let at = pad_vector_with_zeros(body, i_vec, 0, 1)?;
            let updated = make_dynamic_update_slice(body, state[1], slice, at)?;
            Ok(vec![state[0], updated])
        },
        &OpMetadata::named("shift"),
    )
    .unwrap();

    let main = module.computation_mut(entry);
    let out = lp.result(main, 1).unwrap();
    main.set_root(out);
    module
}

fn f32_literal(dims: &[i64], values: &[f32]) -> Literal {
    Literal::new(
        Shape::array(PrimitiveType::F32, dims.to_vec()),
        values.iter().map(|v| i64::from(v.to_bits())).collect(),
    )
    .unwrap()
}

#[test]
fn loop_module_verifies() {
    let module = build_shift_rows();
    verify_module(&module).unwrap();
    assert_eq!(module.computation_count(), 3);
}

#[test]
fn loop_module_evaluates_with_clamped_starts() {
    let module = build_shift_rows();
    let input: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let out = evaluate(&module, &[f32_literal(&[3, 4], &input)]).unwrap();
    let expected = [4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 8.0, 9.0, 10.0, 11.0];
    assert_eq!(out, Value::Array(f32_literal(&[3, 4], &expected)));
}

#[test]
fn loop_module_dump() {
    let module = build_shift_rows();
    let text = dump_module(&module);
    assert!(text.starts_with("HloModule shift_rows\n"));
    assert!(text.contains("ENTRY main {"));
    assert!(text.contains("while(tuple."));
    assert!(text.contains("metadata={op_name=\"shift\"}"));
    assert!(text.contains("dynamic_slice_sizes={1,4}"));
    assert_eq!(text.matches("ROOT ").count(), 3);
}
