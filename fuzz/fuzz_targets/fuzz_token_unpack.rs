#![no_main]
use chat_vault::crypto::ConversationKey;
use chat_vault::protocol::{peek_header, unpack, MessageToken};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = ConversationKey::from_bytes([0x42; 32]);

    // Raw bytes: structural parse and decrypt must never panic
    if let Ok(token) = MessageToken::from_bytes(data.to_vec()) {
        let _ = peek_header(&token);
        let _ = unpack(&token, &key, None);
    }

    // Storage form
    if let Ok(encoded) = std::str::from_utf8(data) {
        if let Ok(token) = MessageToken::decode(encoded) {
            let _ = unpack(&token, &key, Some(0));
        }
    }
});
