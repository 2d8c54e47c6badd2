#![no_main]
use arbitrary::Arbitrary;
use chat_vault::crypto::ConversationKey;
use chat_vault::protocol::{pack, unpack, Role};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    key: [u8; 32],
    role: u8,
    sequence: u32,
    timestamp: u32,
    content: String,
}

fuzz_target!(|input: Input| {
    let key = ConversationKey::from_bytes(input.key);
    let role = Role::from_u8(input.role % 3 + 1).unwrap_or(Role::User);

    // pack then unpack must round-trip whenever pack accepts the content
    if let Ok(token) = pack(&input.content, role, input.sequence, &key, Some(input.timestamp)) {
        let msg = unpack(&token, &key, Some(input.sequence))
            .expect("Unpack of a freshly packed token must succeed");
        assert_eq!(msg.content, input.content, "Content mismatch");
        assert_eq!(msg.role, role);
        assert_eq!(msg.sequence, input.sequence);
        assert_eq!(msg.timestamp, input.timestamp);
    }
});
