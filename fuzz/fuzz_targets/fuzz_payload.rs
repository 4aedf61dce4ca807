#![no_main]
use libfuzzer_sys::fuzz_target;
use team_sigchain::Payload;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    // Anything that decodes must re-encode and decode to the same value.
    if let Ok(payload) = Payload::from_json(json) {
        let encoded = payload.to_json().expect("re-encode");
        assert_eq!(Payload::from_json(&encoded).expect("re-decode"), payload);
    }
});
