pub mod encryption;
pub mod signing;
pub mod wrap;

pub use encryption::{decrypt_message, encrypt_message, generate_key, random_bytes};
pub use signing::{verify_signature, SigningKeyPair, SEED_BYTES};
pub use wrap::{unwrap, wrap, BoxKeyPair};
