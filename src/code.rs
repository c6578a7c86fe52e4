use rand::Rng;

/// Code alphabet excluding visually ambiguous characters (I, O, 0, 1).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LENGTH: usize = 4;

/// How many times `create_room` retries against the uniqueness check
/// before giving up with `CodeExhaustion`.
pub const CODE_GENERATION_ATTEMPTS: u32 = 10;

/// Generate a room code of the default length.
pub fn generate_code() -> String {
    generate_code_of_length(CODE_LENGTH)
}

pub fn generate_code_of_length(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Accepts 4-8 uppercase characters from the code alphabet.
pub fn is_valid_code(code: &str) -> bool {
    (4..=8).contains(&code.len()) && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
