#![no_main]
use libfuzzer_sys::fuzz_target;
use team_sigchain::TeamInvite;

fuzz_target!(|data: &[u8]| {
    let Ok(link) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(invite) = TeamInvite::parse(link) {
        let reparsed = TeamInvite::parse(&invite.to_link()).expect("reparse");
        assert_eq!(reparsed.block_hash, invite.block_hash);
        assert_eq!(reparsed.initial_team_public_key, invite.initial_team_public_key);
    }
});
