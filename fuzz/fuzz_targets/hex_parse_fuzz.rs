#![no_main]
use firmpatch::hex::{self, EncodeOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary text must only ever produce errors, never panics.
    let text = String::from_utf8_lossy(data);
    let _ = hex::parse_to_vec(text.lines());

    // Whatever a catalog image accepts must re-encode to the same bytes.
    let Ok(cpu) = firmpatch::cpu::resolve("pic16f1516") else {
        return;
    };
    let Ok(mut image) = firmpatch::Image::new(cpu, Vec::new()) else {
        return;
    };
    if image.mount_hex(text.lines()).is_err() {
        return;
    }
    let lines = image.to_hex(&EncodeOptions::default()).unwrap();
    let mut reloaded = firmpatch::Image::new(image.cpu().clone(), Vec::new()).unwrap();
    reloaded.mount_hex(&lines).unwrap();
    assert!(image.diff(&reloaded, "fuzz").is_empty());
});
