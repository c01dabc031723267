use rand::Rng;
use rand::distr::Alphanumeric;

const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_LEN: usize = 8;
const PASSWORD_LEN: usize = 12;

pub fn generate_vps_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LEN)
        .map(|_| ID_CHARSET[rng.random_range(0..ID_CHARSET.len())] as char)
        .collect()
}

pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Derives a Linux login name from a chat display name.
pub fn login_name(display_name: &str) -> String {
    let mut name: String = display_name
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            '-' | '.' => Some('_'),
            _ => None,
        })
        .take(24)
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_') {
        name.insert(0, 'u');
    }
    if name == "u" || name == "root" {
        "vpsuser".to_string()
    } else {
        name
    }
}
