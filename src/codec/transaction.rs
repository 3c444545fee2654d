//! Legacy transaction envelope: `[nonce, gasPrice, gasLimit, to, value, data, ...]`.
//!
//! Signature items after `data` are validated structurally and skipped.

use bytes::Bytes;
use ethers::types::Address;
use std::time::{SystemTime, UNIX_EPOCH};

use super::rlp::{self, Item};
use crate::error::DecodeError;
use crate::types::Transaction;

const ADDRESS_LEN: usize = 20;

pub(crate) fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Decodes a copy of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Transaction, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    decode_shared(&Bytes::copy_from_slice(bytes))
}

/// Decodes without copying: `input` and `raw` share `buf`'s allocation.
pub fn decode_shared(buf: &Bytes) -> Result<Transaction, DecodeError> {
    decode_at(buf, now_us())
}

pub fn decode_at(buf: &Bytes, timestamp_us: u64) -> Result<Transaction, DecodeError> {
    let data: &[u8] = buf.as_ref();
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut cursor = data;
    let outer = rlp::next_item(&mut cursor, "transaction")?;
    if !outer.list {
        return Err(DecodeError::UnexpectedString);
    }
    if !cursor.is_empty() {
        return Err(DecodeError::TrailingBytes(cursor.len()));
    }

    let mut fields = outer.payload;
    let nonce = rlp::read_u64(string(&mut fields, "nonce")?, "nonce")?;
    let gas_price = rlp::read_amount(string(&mut fields, "gasPrice")?, "gasPrice")?;
    let gas_limit = rlp::read_u64(string(&mut fields, "gasLimit")?, "gasLimit")?;
    let to = address(string(&mut fields, "to")?)?;
    let value = rlp::read_amount(string(&mut fields, "value")?, "value")?;
    let input = string(&mut fields, "data")?;
    while !fields.is_empty() {
        rlp::next_item(&mut fields, "signature")?;
    }

    Ok(Transaction {
        from: Address::zero(),
        to,
        value,
        gas_price,
        gas_limit,
        nonce,
        input: buf.slice_ref(input),
        timestamp_us,
        raw: buf.clone(),
    })
}

/// Batch form of [`decode_shared`]; results keep input order.
pub fn decode_batch(inputs: &[Bytes]) -> Vec<Result<Transaction, DecodeError>> {
    inputs.iter().map(decode_shared).collect()
}

fn string<'a>(fields: &mut &'a [u8], field: &'static str) -> Result<&'a [u8], DecodeError> {
    let Item { list, payload, .. } = rlp::next_item(fields, field)?;
    if list {
        return Err(DecodeError::UnexpectedList { field });
    }
    Ok(payload)
}

fn address(payload: &[u8]) -> Result<Address, DecodeError> {
    if payload.len() != ADDRESS_LEN {
        return Err(DecodeError::FieldLength {
            field: "to",
            expected: ADDRESS_LEN,
            got: payload.len(),
        });
    }
    Ok(Address::from_slice(payload))
}

fn payload_len(tx: &Transaction) -> usize {
    rlp::u64_len(tx.nonce)
        + rlp::amount_len(&tx.gas_price)
        + rlp::u64_len(tx.gas_limit)
        + 1
        + ADDRESS_LEN
        + rlp::amount_len(&tx.value)
        + rlp::bytes_len(&tx.input)
}

/// Exact size of [`encode`]'s output.
pub fn encoded_len(tx: &Transaction) -> usize {
    let p = payload_len(tx);
    rlp::header_len(p) + p
}

/// Appends the field encoding of `tx`. Size is computed first so the
/// buffer grows at most once.
pub fn encode_into(tx: &Transaction, out: &mut Vec<u8>) {
    let p = payload_len(tx);
    out.reserve(rlp::header_len(p) + p);
    rlp::write_header(out, p, true);
    rlp::write_u64(out, tx.nonce);
    rlp::write_amount(out, &tx.gas_price);
    rlp::write_u64(out, tx.gas_limit);
    rlp::write_bytes(out, tx.to.as_bytes());
    rlp::write_amount(out, &tx.value);
    rlp::write_bytes(out, &tx.input);
}

pub fn encode(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(tx));
    encode_into(tx, &mut out);
    out
}

/// Wire bytes of `tx`: the original envelope when we have it.
pub fn envelope(tx: &Transaction) -> std::borrow::Cow<'_, [u8]> {
    if tx.is_derived() {
        std::borrow::Cow::Owned(encode(tx))
    } else {
        std::borrow::Cow::Borrowed(tx.raw.as_ref())
    }
}

/// Encodes an ordered bundle as a list of envelopes. Decoded
/// transactions pass through byte-for-byte.
pub fn encode_bundle(txs: &[Transaction]) -> Vec<u8> {
    let envelopes: Vec<_> = txs.iter().map(envelope).collect();
    let payload: usize = envelopes.iter().map(|e| e.len()).sum();
    let mut out = Vec::with_capacity(rlp::header_len(payload) + payload);
    rlp::write_header(&mut out, payload, true);
    for e in &envelopes {
        out.extend_from_slice(e);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use proptest::prelude::*;

    fn sample(input: Vec<u8>) -> Transaction {
        Transaction {
            from: Address::zero(),
            to: Address::repeat_byte(0x7a),
            value: U256::from(10_000_000_000_000_000_000u128),
            gas_price: U256::from(30_000_000_000u128),
            gas_limit: 210_000,
            nonce: 42,
            input: Bytes::from(input),
            timestamp_us: 0,
            raw: Bytes::new(),
        }
    }

    #[test]
    fn test_decode_fields_and_shared_views() {
        let tx = sample(vec![0x7f, 0xf3, 0x6a, 0xb5, 0, 0, 0, 1]);
        let raw = Bytes::from(encode(&tx));
        let decoded = decode_at(&raw, 7).unwrap();
        assert_eq!(decoded.nonce, 42);
        assert_eq!(decoded.gas_limit, 210_000);
        assert_eq!(decoded.to, tx.to);
        assert_eq!(decoded.value, tx.value);
        assert_eq!(decoded.input, tx.input);
        assert_eq!(decoded.timestamp_us, 7);
        assert_eq!(decoded.raw, raw);
        // input is a view into the envelope
        let base = raw.as_ptr() as usize;
        let at = decoded.input.as_ptr() as usize;
        assert!(at >= base && at < base + raw.len());
    }

    #[test]
    fn test_signature_items_skipped() {
        let tx = sample(vec![1, 2, 3]);
        let body = encode(&tx);
        // re-wrap the fields plus v, r, s
        let mut cursor = body.as_slice();
        let fields = rlp::next_item(&mut cursor, "t").unwrap().payload.to_vec();
        let mut extra = Vec::new();
        rlp::write_u64(&mut extra, 27);
        rlp::write_bytes(&mut extra, &[0x11; 32]);
        rlp::write_bytes(&mut extra, &[0x22; 32]);
        let mut signed = Vec::new();
        rlp::write_header(&mut signed, fields.len() + extra.len(), true);
        signed.extend_from_slice(&fields);
        signed.extend_from_slice(&extra);
        let decoded = decode(&signed).unwrap();
        assert_eq!(decoded.nonce, tx.nonce);
        assert_eq!(decoded.raw.as_ref(), signed.as_slice());
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
        assert_eq!(decode(&[0x82, 0x01, 0x02]), Err(DecodeError::UnexpectedString));

        let tx = sample(vec![]);
        let mut raw = encode(&tx);
        raw.push(0x00);
        assert_eq!(decode(&raw), Err(DecodeError::TrailingBytes(1)));

        let raw = encode(&tx);
        let err = decode(&raw[..raw.len() - 3]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn test_short_recipient_rejected() {
        let mut out = Vec::new();
        let mut fields = Vec::new();
        rlp::write_u64(&mut fields, 1);
        rlp::write_u64(&mut fields, 1);
        rlp::write_u64(&mut fields, 21_000);
        rlp::write_bytes(&mut fields, &[0xab; 19]);
        rlp::write_u64(&mut fields, 0);
        rlp::write_bytes(&mut fields, &[]);
        rlp::write_header(&mut out, fields.len(), true);
        out.extend_from_slice(&fields);
        assert_eq!(
            decode(&out),
            Err(DecodeError::FieldLength {
                field: "to",
                expected: 20,
                got: 19
            })
        );
    }

    #[test]
    fn test_bundle_passes_victim_through() {
        let victim = decode(&encode(&sample(vec![9; 70]))).unwrap();
        let derived = sample(vec![1]);
        let bundle = encode_bundle(&[derived.clone(), victim.clone(), derived.clone()]);
        let items = rlp::split_list(&bundle).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], victim.raw.as_ref());
        assert_eq!(items[0], encode(&derived).as_slice());
    }

    proptest! {
        #[test]
        fn prop_encode_decode_preserves_fields(
            nonce in any::<u64>(),
            gas_limit in any::<u64>(),
            gas_price in any::<u128>(),
            value in proptest::array::uniform4(any::<u64>()),
            to in proptest::array::uniform20(any::<u8>()),
            input in proptest::collection::vec(any::<u8>(), 0..300),
        ) {
            let tx = Transaction {
                from: Address::zero(),
                to: Address::from(to),
                value: U256(value),
                gas_price: U256::from(gas_price),
                gas_limit,
                nonce,
                input: Bytes::from(input),
                timestamp_us: 0,
                raw: Bytes::new(),
            };
            let bytes = encode(&tx);
            prop_assert_eq!(bytes.len(), encoded_len(&tx));
            let back = decode_at(&Bytes::from(bytes.clone()), 0).unwrap();
            prop_assert_eq!(back.raw.as_ref(), bytes.as_slice());
            let back = Transaction { raw: Bytes::new(), ..back };
            prop_assert_eq!(back, tx);
        }
    }
}
