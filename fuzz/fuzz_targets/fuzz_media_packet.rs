#![no_main]
use chat_vault::crypto::ConversationKey;
use chat_vault::media::{decrypt_media, encrypt_media, MediaType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = ConversationKey::from_bytes([0x5C; 32]);

    // Arbitrary packets must be rejected cleanly
    let _ = decrypt_media(data, &key);

    if data.is_empty() {
        return;
    }

    // First byte picks the media type, the rest is the payload
    let media_type = MediaType::from_u8(data[0]).unwrap_or(MediaType::Other);
    let payload = &data[1..];
    if let Ok(enc) = encrypt_media(payload, media_type.mime(), &key) {
        let dec = decrypt_media(&enc.packet, &key)
            .expect("Decryption of a valid packet must succeed");
        assert_eq!(dec.data, payload, "Media round-trip mismatch");
        assert_eq!(dec.media_type, media_type);
    }
});
