//! Short code generation
//!
//! Codes are derived from the URL itself, the same URL always gets the same code

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::Digest;
use sha2::Sha256;

/// Length of every generated code
pub const CODE_LENGTH: usize = 8;

/// Generate the short code for a URL
///
/// The leading 8 bytes of the SHA-256 digest are read as a number, its decimal text is base64
/// encoded and cut to [`CODE_LENGTH`]. Base64 of decimal digits only uses `[A-Za-z0-9]`.
///
/// Not injective: different URLs can end up with the same code.
pub fn generate(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());

    let mut leading = [0_u8; 8];
    leading.copy_from_slice(&digest[..8]);
    let number = u64::from_be_bytes(leading);

    // 6 digits encode to 8 characters
    let mut code = STANDARD.encode(format!("{number:06}"));
    code.truncate(CODE_LENGTH);

    code
}
