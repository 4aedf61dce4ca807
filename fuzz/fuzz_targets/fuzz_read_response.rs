#![no_main]
use libfuzzer_sys::fuzz_target;
use serde::de::IgnoredAny;
use team_sigchain::chain::{ReadResponse, ServerResponse};

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(response) = ServerResponse::<ReadResponse>::from_json(body) {
        if let Ok(page) = response.into_result() {
            let _ = page.check_size();
            for block in &page.blocks {
                let _ = block.hash();
                let _ = block.verify();
                let _ = block.decode_payload();
            }
        }
    }
    let _ = ServerResponse::<IgnoredAny>::from_json(body);
});
