//! Opaque capability path tokens.

/// Generate a fresh caps object path: a hyphenated random UUID with the
/// last four characters stripped, leaving a 32-character opaque token.
pub fn random_caps_token() -> String {
    let mut token = uuid::Uuid::new_v4().to_string();
    token.truncate(token.len() - 4);
    token
}
