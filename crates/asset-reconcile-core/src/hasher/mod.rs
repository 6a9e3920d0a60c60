pub mod digest;

pub use digest::{content_digest, digest_bytes};
