#![no_main]

use libfuzzer_sys::fuzz_target;
use matrix_abi::{compile, verify_compile_result, CompileOptions};

mod capture;

fuzz_target!(|data: &[u8]| {
    let result = std::panic::catch_unwind(|| {
        let Ok(source) = std::str::from_utf8(data) else {
            return;
        };
        let options = CompileOptions::default()
            .with_fields(["a", "b", "rating"])
            .with_params(["k"])
            .with_max_depth(256);
        if let Ok(out) = compile(source, &options) {
            // Anything the compiler accepts must verify against the same options.
            assert!(verify_compile_result(&out, &options).is_ok());
        }
    });

    if result.is_err() {
        capture::record_panic("expr_compile", data);
    }
});
