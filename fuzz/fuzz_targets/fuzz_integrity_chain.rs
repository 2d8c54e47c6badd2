#![no_main]
use chat_vault::crypto::IntegrityKey;
use chat_vault::integrity::{compute_root, verify_root, IntegrityRoot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = IntegrityKey::from_bytes([0x17; 32]);

    // Treat each chunk as an opaque token
    let tokens: Vec<&[u8]> = data.chunks(37).collect();
    let root = compute_root(&tokens, &key);
    assert!(verify_root(&tokens, &root, &key), "Root must verify against its own collection");

    if tokens.is_empty() {
        assert_eq!(root, IntegrityRoot::EMPTY);
        return;
    }

    // Dropping the tail must change the root
    let shorter = &tokens[..tokens.len() - 1];
    assert!(!verify_root(shorter, &root, &key), "Truncated collection verified");
});
