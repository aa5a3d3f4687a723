//! Family invite codes

use rand::Rng;

/// Uppercase letters and digits without the look-alikes I, O, 0 and 1
pub const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const INVITE_CODE_LEN: usize = 8;

/// Attempts made to find an unused code before giving up
pub const MAX_INVITE_ATTEMPTS: usize = 10;

/// Random 8-character invite code
pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}
