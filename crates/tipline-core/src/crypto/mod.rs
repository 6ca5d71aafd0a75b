//! Cryptographic operations for Tipline.
//!
//! - **scrypt**: memory-hard derivation of source identity material
//! - **otp**: HOTP/TOTP two-factor validation for journalist logins
//!
//! ## Security Model
//!
//! - A source's identity is a pure function of their passphrase and two
//!   deployment-fixed peppers; no plaintext passphrase is ever stored.
//! - scrypt is memory-hard, bounding offline brute-force throughput.
//! - OTP secrets and derived key material are zeroized on drop.

pub mod otp;
pub mod scrypt;

pub use otp::{random_base32, Hotp, Totp, HOTP_SECRET_HEX_LENGTH};
pub use scrypt::ScryptManager;
