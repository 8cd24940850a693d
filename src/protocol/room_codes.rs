use crate::config::ProtocolConfig;
use rand::RngExt;

/// Alphabet for join codes: uppercase alphanumerics minus the characters
/// players confuse when reading codes aloud (0, O, I, 1).
const CODE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generate a join code with the configured length.
pub fn generate_room_code_with_config(config: &ProtocolConfig) -> String {
    generate_room_code_of_length(config.room_code_length)
}

/// Generate a join code of the requested length.
pub fn generate_room_code_of_length(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CODE_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = CODE_CHARS[idx] as char;
            ch
        })
        .collect()
}
