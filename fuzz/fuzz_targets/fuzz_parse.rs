#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // Parsing, and dumping whatever parses, should never panic.
        if let Ok(module) = hlox_parser::parse(source) {
            let _ = hlox_ir::dump_module(&module);
        }
    }
});
