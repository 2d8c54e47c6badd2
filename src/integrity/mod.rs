pub mod chain;

pub use chain::{compute_root, verify_root, IntegrityRoot, RootParseError, ROOT_LEN};
