/// Message token: the immutable, self-contained unit of stored history.
///
/// Token wire format:
/// ```text
/// [header: 10][ct_len: 2 BE][ciphertext + tag: ct_len][nonce: 24]
/// ```
///
/// In memory a token is a plain byte buffer. URL-safe base64 (no padding)
/// is applied only at the storage boundary via [`MessageToken::encode`] and
/// [`MessageToken::decode`].
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::crypto::encryption::{NONCE_LEN, TAG_LEN};
use crate::protocol::header::{MessageHeader, FORMAT_VERSION, HEADER_LEN};
use crate::protocol::message::{CodecError, Result};

/// Size of the ciphertext length field.
pub const LENGTH_FIELD_LEN: usize = 2;
/// Largest ciphertext (including tag) the length field can describe.
pub const MAX_CIPHERTEXT_LEN: usize = u16::MAX as usize;
/// Smallest structurally valid token.
pub const MIN_TOKEN_LEN: usize = HEADER_LEN + LENGTH_FIELD_LEN + TAG_LEN + NONCE_LEN;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageToken(Vec<u8>);

/// Borrowed view of a structurally valid token.
#[derive(Debug, Clone, Copy)]
pub struct TokenParts<'a> {
    pub header: MessageHeader,
    /// Header bytes exactly as stored; used as associated data.
    pub header_bytes: &'a [u8],
    /// Ciphertext with the Poly1305 tag appended.
    pub ciphertext: &'a [u8],
    pub nonce: &'a [u8; NONCE_LEN],
}

impl MessageToken {
    /// Assemble a token from its fields.
    pub fn assemble(header: &MessageHeader, ciphertext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Self> {
        if ciphertext.len() > MAX_CIPHERTEXT_LEN {
            return Err(CodecError::CiphertextTooLarge {
                size: ciphertext.len(),
                max: MAX_CIPHERTEXT_LEN,
            });
        }
        let mut buf =
            Vec::with_capacity(HEADER_LEN + LENGTH_FIELD_LEN + ciphertext.len() + NONCE_LEN);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        buf.extend_from_slice(ciphertext);
        buf.extend_from_slice(nonce);
        Ok(Self(buf))
    }

    /// Wrap raw bytes after checking structure (version, role, lengths).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let token = Self(bytes);
        token.parts()?;
        Ok(token)
    }

    /// Decode the storage form.
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| CodecError::InvalidEncoding)?;
        Self::from_bytes(bytes)
    }

    /// Storage form: URL-safe base64 without padding.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Header only; never looks at the ciphertext.
    pub fn header(&self) -> Option<MessageHeader> {
        MessageHeader::parse(&self.0)
    }

    /// Split into fields, validating every structural bound.
    pub fn parts(&self) -> Result<TokenParts<'_>> {
        let bytes = self.0.as_slice();
        if bytes.len() < MIN_TOKEN_LEN {
            return Err(CodecError::Truncated {
                len: bytes.len(),
                min: MIN_TOKEN_LEN,
            });
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion(bytes[0]));
        }
        let header = MessageHeader::parse(bytes).ok_or(CodecError::UnknownRole(bytes[1]))?;

        let ct_len = u16::from_be_bytes([bytes[HEADER_LEN], bytes[HEADER_LEN + 1]]) as usize;
        let ct_start = HEADER_LEN + LENGTH_FIELD_LEN;
        let expected = ct_start + ct_len + NONCE_LEN;
        if ct_len < TAG_LEN || bytes.len() != expected {
            return Err(CodecError::LengthMismatch {
                declared: ct_len,
                actual: bytes.len().saturating_sub(ct_start + NONCE_LEN),
            });
        }

        let nonce: &[u8; NONCE_LEN] = bytes[ct_start + ct_len..]
            .try_into()
            .map_err(|_| CodecError::LengthMismatch {
                declared: ct_len,
                actual: bytes.len().saturating_sub(ct_start + NONCE_LEN),
            })?;

        Ok(TokenParts {
            header,
            header_bytes: &bytes[..HEADER_LEN],
            ciphertext: &bytes[ct_start..ct_start + ct_len],
            nonce,
        })
    }
}

impl AsRef<[u8]> for MessageToken {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Decode a stored collection, reporting the index of the first bad entry.
pub fn decode_collection<S: AsRef<str>>(encoded: &[S]) -> std::result::Result<Vec<MessageToken>, (usize, CodecError)> {
    encoded
        .iter()
        .enumerate()
        .map(|(i, s)| MessageToken::decode(s.as_ref()).map_err(|e| (i, e)))
        .collect()
}

/// Encode a collection for storage.
pub fn encode_collection(tokens: &[MessageToken]) -> Vec<String> {
    tokens.iter().map(MessageToken::encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::Role;

    fn sample() -> MessageToken {
        let header = MessageHeader::new(Role::User, 3, 1_700_000_000);
        MessageToken::assemble(&header, &[0xAA; 40], &[0x11; NONCE_LEN]).unwrap()
    }

    #[test]
    fn test_assemble_layout() {
        let token = sample();
        assert_eq!(token.len(), HEADER_LEN + 2 + 40 + NONCE_LEN);
        assert_eq!(&token.as_bytes()[10..12], &[0x00, 40]);

        let parts = token.parts().unwrap();
        assert_eq!(parts.header.sequence, 3);
        assert_eq!(parts.ciphertext, &[0xAA; 40][..]);
        assert_eq!(parts.nonce, &[0x11; NONCE_LEN]);
    }

    #[test]
    fn test_encode_is_url_safe() {
        let token = sample();
        let encoded = token.encode();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(MessageToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn test_structural_rejections() {
        let bytes = sample().into_bytes();

        assert!(matches!(
            MessageToken::from_bytes(bytes[..20].to_vec()),
            Err(CodecError::Truncated { .. })
        ));

        let mut bad_version = bytes.clone();
        bad_version[0] = 0x7F;
        assert!(matches!(
            MessageToken::from_bytes(bad_version),
            Err(CodecError::UnsupportedVersion(0x7F))
        ));

        let mut extra = bytes.clone();
        extra.push(0);
        assert!(matches!(
            MessageToken::from_bytes(extra),
            Err(CodecError::LengthMismatch { .. })
        ));

        let mut bad_len = bytes;
        bad_len[11] = 39;
        assert!(matches!(
            MessageToken::from_bytes(bad_len),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_non_base64() {
        assert!(matches!(
            MessageToken::decode("not/valid+base64!"),
            Err(CodecError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_collection_helpers() {
        let tokens = vec![sample(), sample()];
        let encoded = encode_collection(&tokens);
        assert_eq!(decode_collection(&encoded).unwrap(), tokens);

        let broken = vec![encoded[0].clone(), "AAAA".to_string()];
        let (index, _) = decode_collection(&broken).unwrap_err();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_ciphertext_bound() {
        let header = MessageHeader::new(Role::User, 0, 0);
        let huge = vec![0u8; MAX_CIPHERTEXT_LEN + 1];
        assert!(matches!(
            MessageToken::assemble(&header, &huge, &[0; NONCE_LEN]),
            Err(CodecError::CiphertextTooLarge { .. })
        ));
    }
}
