use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};

/// Bytes of entropy behind every verification token.
const TOKEN_BYTES: usize = 32;

/// Random URL-safe single-use token for email verification.
pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    Base64UrlUnpadded::encode_string(&buf)
}

pub fn verification_link(public_base_url: &str, token: &str) -> String {
    format!("{}/verify/{}", public_base_url.trim_end_matches('/'), token)
}

pub fn verification_email(username: &str, link: &str) -> (String, String) {
    let subject = "Verify your TalaLink account".to_string();
    let body = format!(
        "Hello {username},\n\
        \n\
        Welcome to TalaLink! Please confirm your email address by opening the link below:\n\
        \n\
        {link}\n\
        \n\
        If you did not create an account, you can ignore this message.\n\
        \n\
        The TalaLink Team"
    );
    (subject, body)
}
