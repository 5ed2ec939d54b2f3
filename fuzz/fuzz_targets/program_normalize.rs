#![no_main]

use libfuzzer_sys::fuzz_target;
use matrix_abi::{admit, run_program, MemoryStore, Policy, ProgramPack};

mod capture;

fuzz_target!(|data: &[u8]| {
    let result = std::panic::catch_unwind(|| {
        let Ok(raw) = serde_json::from_slice::<serde_json::Value>(data) else {
            return;
        };
        let policy = raw.get("policy").map(Policy::normalize);
        let program = raw.get("program").map(ProgramPack::normalize);
        if let (Some(Ok(policy)), Some(Ok(program))) = (policy, program) {
            let _ = policy.digest();
            let _ = program.digest();
            if admit(&program, &policy).is_ok() {
                let mut store = MemoryStore::new();
                let _ = run_program(&program, &policy, &mut store);
            }
        }
    });

    if result.is_err() {
        capture::record_panic("program_normalize", data);
    }
});
