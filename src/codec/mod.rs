//! Wire codec: item framing, transaction envelopes and router calldata.

pub mod abi;
pub mod rlp;
pub mod transaction;

pub use transaction::{
    decode, decode_at, decode_batch, decode_shared, encode, encode_bundle, encode_into,
    encoded_len, envelope,
};
