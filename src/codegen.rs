use rand::{Rng, thread_rng};

const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub const GUEST_CODE_LEN: usize = 4;

pub fn make_code(len: usize) -> String {
    let mut rng = thread_rng();

    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Username for a client started without one, e.g. `guest-K7QM`.
pub fn guest_name(len: usize) -> String {
    format!("guest-{}", make_code(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_the_unambiguous_alphabet() {
        let code = make_code(32);
        assert_eq!(code.len(), 32);
        assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn guest_names_carry_a_code() {
        let name = guest_name(GUEST_CODE_LEN);
        assert_eq!(name.len(), "guest-".len() + GUEST_CODE_LEN);
        assert!(!name.contains(char::is_whitespace));
    }
}
