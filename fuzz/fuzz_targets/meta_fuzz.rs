#![no_main]
use firmpatch::config::Meta;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(meta) = Meta::from_yaml(text) {
        let _ = meta.variables();
        if let Ok(cpu) = meta.cpu.resolve() {
            let _ = cpu.build_map();
        }
    }
});
