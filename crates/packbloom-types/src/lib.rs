pub mod digest;
pub mod error;

pub use digest::{Digest, DIGEST_LEN};
