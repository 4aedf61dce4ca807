#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use team_sigchain::{verify_and_commit, Block, MemoryTeamStore, TeamDataStore, TeamIdentity};

/// Untrusted blocks appended after a valid genesis.
#[derive(Arbitrary, Debug)]
struct FoldInput {
    payloads: Vec<String>,
    resign: bool,
}

fuzz_target!(|input: FoldInput| {
    if input.payloads.len() > 64 {
        return;
    }
    let (mut admin, genesis) =
        TeamIdentity::new_admin("fuzz@acme.co", "Fuzz", vec![], vec![]).expect("admin");
    let mut store = MemoryTeamStore::new(admin.team_id.clone());
    verify_and_commit(&mut admin, &mut store, &[genesis.clone()]).expect("genesis");

    let blocks: Vec<Block> = input
        .payloads
        .into_iter()
        .map(|payload| {
            let mut block = genesis.clone();
            if input.resign {
                block.signature = team_sigchain::chain::Signature::from_bytes(
                    admin.keypair().sign(payload.as_bytes()),
                );
            }
            block.payload = payload;
            block
        })
        .collect();

    let before = store.last_block_hash().expect("tip");
    // A failed fold must leave the store untouched.
    if verify_and_commit(&mut admin, &mut store, &blocks).is_err() {
        assert_eq!(store.last_block_hash().expect("tip"), before);
    }
});
