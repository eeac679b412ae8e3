#![no_main]

use deduction_observer::event::{decode, decode_value};
use deduction_observer::reconcile::Reconciler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Arbitrary text must never panic the decoder or the reconciler.
    let event = decode(s);
    let mut reconciler = Reconciler::new();
    let _ = reconciler.handle(&event);

    // The bootstrap path decodes already-parsed values.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        let _ = decode_value(value);
    }
});
