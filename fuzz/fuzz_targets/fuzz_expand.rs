#![no_main]

use hlox_opt::{GatherExpander, GatherExpansionMode, Pass};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(module) = hlox_parser::parse(source) else {
        return;
    };
    // Only well-formed modules are valid pass input.
    if hlox_ir::verify_module(&module).is_err() {
        return;
    }
    for mode in [
        GatherExpansionMode::EliminateAll,
        GatherExpansionMode::EliminateSimpleOnly,
    ] {
        let mut module = module.clone();
        if GatherExpander::new(mode).run(&mut module).is_ok() {
            assert!(
                hlox_ir::verify_module(&module).is_ok(),
                "expansion produced a malformed module:\n{}",
                hlox_ir::dump_module(&module)
            );
        }
    }
});
