#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    let options = wardc::compile::CompileOptions::default();
    if let Ok(out) = wardc::compile::compile_wardast_to_c(data, &options) {
        assert_eq!(
            wardc::compile::check_wardast(data, &options).ok(),
            Some(out.stats)
        );
    }
});
