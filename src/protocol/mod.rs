pub mod header;
pub mod message;
pub mod token;

pub use header::{MessageHeader, Role, FORMAT_VERSION, HEADER_LEN};
pub use message::{
    pack, peek_header, unpack, validate_sequence, CodecError, MessageCodec, UnpackedMessage,
};
pub use token::{decode_collection, encode_collection, MessageToken, TokenParts};
