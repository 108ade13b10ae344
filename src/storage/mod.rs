pub mod crypto;
pub mod key_store;
pub mod photo_store;

pub use crypto::MasterKey;
pub use key_store::{FileKeyStore, KeyStore, StaticKeyStore};
pub use photo_store::{validate_identity, PhotoStore};
