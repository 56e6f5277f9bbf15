//! Address-privacy port.
//!
//! The core persists only the opaque form and never interprets its internal
//! structure.

use crate::error::Result;

pub trait AddressCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    fn decrypt(&self, opaque: &str) -> Result<String>;
}
