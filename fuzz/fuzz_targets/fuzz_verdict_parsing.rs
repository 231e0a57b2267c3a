#![no_main]

use libfuzzer_sys::fuzz_target;

use moderation_relay::moderation::{parse_verdict, sanitize};

fuzz_target!(|data: &str| {
    // The full post-model path: sanitize then parse. Errors are expected;
    // panics are not.
    let cleaned = sanitize(data);
    if let Ok(verdict) = parse_verdict(&cleaned) {
        // Anything accepted must serialize back to an object.
        let value = serde_json::to_value(&verdict).unwrap();
        assert!(value.is_object());
    }
});
