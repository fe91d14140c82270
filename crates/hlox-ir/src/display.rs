//! Text dump of modules.
//!
//! The output is the same text format `hlox-parser` reads, so a dump parses
//! back into an equivalent module.

use std::fmt::{self, Write};

use crate::computation::Computation;
use crate::instr::{InstrId, Instruction, Op, OpMetadata};
use crate::module::Module;

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn write_metadata(out: &mut String, md: &OpMetadata) -> fmt::Result {
    let mut fields = Vec::new();
    if !md.op_type.is_empty() {
        fields.push(format!("op_type=\"{}\"", escape(&md.op_type)));
    }
    if !md.op_name.is_empty() {
        fields.push(format!("op_name=\"{}\"", escape(&md.op_name)));
    }
    if !md.source_file.is_empty() {
        fields.push(format!("source_file=\"{}\"", escape(&md.source_file)));
    }
    if md.source_line != 0 {
        fields.push(format!("source_line={}", md.source_line));
    }
    write!(out, ", metadata={{{}}}", fields.join(" "))
}

fn write_instruction(
    out: &mut String,
    module: &Module,
    comp: &Computation,
    instr: &Instruction,
) -> fmt::Result {
    write!(out, "{} = {} {}(", instr.name, instr.shape, instr.opcode())?;
    match &instr.op {
        Op::Parameter { number } => write!(out, "{number}")?,
        Op::Constant(lit) => write!(out, "{lit}")?,
        _ => {
            let names: Vec<&str> = instr
                .operands
                .iter()
                .map(|&o| comp.instruction(o).name.as_str())
                .collect();
            out.push_str(&names.join(", "));
        }
    }
    out.push(')');

    match &instr.op {
        Op::Broadcast { dimensions } => write!(out, ", dimensions={{{}}}", join(dimensions))?,
        Op::Transpose { permutation } => write!(out, ", dimensions={{{}}}", join(permutation))?,
        Op::Concatenate { dimension } => write!(out, ", dimensions={{{dimension}}}")?,
        Op::Slice { starts, limits } => {
            let ranges: Vec<String> = starts
                .iter()
                .zip(limits)
                .map(|(s, l)| format!("[{s}:{l}]"))
                .collect();
            write!(out, ", slice={{{}}}", ranges.join(", "))?;
        }
        Op::DynamicSlice { sizes } => write!(out, ", dynamic_slice_sizes={{{}}}", join(sizes))?,
        Op::Compare { direction } => write!(out, ", direction={}", direction.name())?,
        Op::GetTupleElement { index } => write!(out, ", index={index}")?,
        Op::While { condition, body } => {
            let name = |id| module.try_computation(id).map_or("<missing>", |c| c.name.as_str());
            write!(out, ", condition={}, body={}", name(*condition), name(*body))?;
        }
        Op::Gather {
            dimension_numbers: d,
            slice_sizes,
        } => write!(
            out,
            ", offset_dims={{{}}}, collapsed_slice_dims={{{}}}, start_index_map={{{}}}, \
             index_vector_dim={}, slice_sizes={{{}}}",
            join(&d.offset_dims),
            join(&d.collapsed_slice_dims),
            join(&d.start_index_map),
            d.index_vector_dim,
            join(slice_sizes)
        )?,
        _ => {}
    }
    if !instr.metadata.is_empty() {
        write_metadata(out, &instr.metadata)?;
    }
    Ok(())
}

/// One instruction of `comp` in the text format, without the `ROOT` marker.
pub fn format_instruction(module: &Module, comp: &Computation, id: InstrId) -> String {
    let mut out = String::new();
    let _ = write_instruction(&mut out, module, comp, comp.instruction(id));
    out
}

fn write_computation(out: &mut String, module: &Module, comp: &Computation, entry: bool) -> fmt::Result {
    if entry {
        out.push_str("ENTRY ");
    }
    writeln!(out, "{} {{", comp.name)?;
    // Operands before users, so the text can be read back in one pass.
    for id in comp.post_order() {
        out.push_str(if comp.root() == Some(id) { "  ROOT " } else { "  " });
        write_instruction(out, module, comp, comp.instruction(id))?;
        out.push('\n');
    }
    out.push_str("}\n");
    Ok(())
}

/// Renders `module` in the text format, callees before callers and the entry
/// computation last.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut out, module);
    out
}

fn write_module(out: &mut String, module: &Module) -> fmt::Result {
    writeln!(out, "HloModule {}", module.name)?;
    for id in module.computation_post_order() {
        out.push('\n');
        write_computation(out, module, module.computation(id), module.entry() == Some(id))?;
    }
    Ok(())
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&dump_module(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::make_gather;
    use crate::counted_loop::make_counted_loop;
    use crate::gather::GatherDimensionNumbers;
    use crate::types::{PrimitiveType::S32, Shape};

    fn gather_module() -> Module {
        let mut comp = Computation::new("main");
        let o = comp.add_parameter(0, Shape::array(S32, [3, 3]), "operand");
        let i = comp.add_parameter(1, Shape::array(S32, [2]), "indices");
        let g = make_gather(
            &mut comp,
            o,
            i,
            GatherDimensionNumbers {
                offset_dims: vec![0],
                collapsed_slice_dims: vec![1],
                start_index_map: vec![1],
                index_vector_dim: 1,
            },
            &[3, 1],
        )
        .unwrap();
        comp.instruction_mut(g).metadata = OpMetadata::named("Gather");
        comp.set_root(g);
        let mut module = Module::new("gather_test");
        module.add_entry_computation(comp);
        module
    }

    #[test]
    fn dumps_gather_attributes() {
        let text = dump_module(&gather_module());
        assert_eq!(
            text,
            "HloModule gather_test\n\n\
             ENTRY main {\n\
             \x20 operand = s32[3,3] parameter(0)\n\
             \x20 indices = s32[2] parameter(1)\n\
             \x20 ROOT gather.2 = s32[3,2] gather(operand, indices), offset_dims={0}, \
             collapsed_slice_dims={1}, start_index_map={1}, index_vector_dim=1, \
             slice_sizes={3,1}, metadata={op_name=\"Gather\"}\n\
             }\n"
        );
    }

    #[test]
    fn loop_computations_come_first() {
        let mut module = gather_module();
        let entry = module.entry().unwrap();
        let p = module.computation(entry).parameter(0).unwrap();
        make_counted_loop(
            &mut module,
            entry,
            2,
            &[p],
            |_, _, state| Ok(state.to_vec()),
            &OpMetadata::default(),
        )
        .unwrap();
        let text = dump_module(&module);
        let cond = text.find("while_cond.1 {").unwrap();
        let body = text.find("while_body.2 {").unwrap();
        let main = text.find("ENTRY main {").unwrap();
        assert!(cond < main && body < main);
        assert!(text.contains("condition=while_cond.1, body=while_body.2"));
        assert!(text.contains("direction=LT"));
        assert!(text.contains("s32[] constant(2)"));
    }

    #[test]
    fn replacements_are_dumped_before_their_users() {
        let mut module = gather_module();
        let comp = module.computation_mut(module.entry().unwrap());
        let operand = comp.parameter(0).unwrap();
        let gather = comp.root().unwrap();
        let gather_shape = comp.shape(gather).clone();
        let add = crate::builder::make_add(comp, gather, gather).unwrap();
        comp.set_root(add);
        let slice = crate::builder::make_slice(comp, operand, &[0, 0], &[3, 2]).unwrap();
        assert_eq!(comp.shape(slice), &gather_shape);
        comp.replace_instruction(gather, slice).unwrap();

        let text = dump_module(&module);
        let slice_at = text.find("slice.").unwrap();
        let add_at = text.find("ROOT add.").unwrap();
        assert!(slice_at < add_at, "{text}");
    }

    #[test]
    fn single_instruction_text() {
        let module = gather_module();
        let comp = module.entry_computation();
        let text = format_instruction(&module, comp, comp.root().unwrap());
        assert!(text.starts_with("gather.2 = s32[3,2] gather(operand, indices), offset_dims={0}"));
        assert!(!text.contains("ROOT"));
    }

    #[test]
    fn metadata_strings_are_escaped() {
        let mut out = String::new();
        let md = OpMetadata {
            op_type: "Gather".into(),
            op_name: "say \"hi\"".into(),
            source_file: String::new(),
            source_line: 7,
        };
        write_metadata(&mut out, &md).unwrap();
        assert_eq!(
            out,
            ", metadata={op_type=\"Gather\" op_name=\"say \\\"hi\\\"\" source_line=7}"
        );
    }
}
