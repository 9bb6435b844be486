//! Minimal Solidity ABI encoding and decoding.
//!
//! Covers exactly the value kinds the engine carries as
//! [`ArgValue`](crate::ArgValue): `address`, `uint<N>`, `bool`, `bytes<N>`,
//! dynamic `bytes`, and `string`. Arrays and tuples are out of scope; an
//! artifact using them for a constructor or call the engine must encode is
//! rejected with [`AbiError::UnsupportedType`].

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use thiserror::Error;

use crate::artifacts::AbiParam;
use crate::chain::RawLog;
use crate::module::ArgValue;

/// Mismatches between an ABI description and the values supplied for it.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("unsupported ABI type '{0}'")]
    UnsupportedType(String),

    #[error("parameter '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: &'static str,
    },

    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("data too short while decoding {0}")]
    Truncated(String),

    #[error("invalid data while decoding {0}")]
    InvalidData(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolType {
    Address,
    Uint(usize),
    Bool,
    FixedBytes(usize),
    Bytes,
    String,
}

impl SolType {
    fn parse(ty: &str) -> Result<Self, AbiError> {
        match ty {
            "address" => Ok(Self::Address),
            "bool" => Ok(Self::Bool),
            "bytes" => Ok(Self::Bytes),
            "string" => Ok(Self::String),
            "uint" => Ok(Self::Uint(256)),
            _ => {
                if let Some(bits) = ty.strip_prefix("uint") {
                    let bits: usize = bits
                        .parse()
                        .map_err(|_| AbiError::UnsupportedType(ty.to_string()))?;
                    if bits == 0 || bits > 256 || bits % 8 != 0 {
                        return Err(AbiError::UnsupportedType(ty.to_string()));
                    }
                    return Ok(Self::Uint(bits));
                }
                if let Some(len) = ty.strip_prefix("bytes") {
                    let len: usize = len
                        .parse()
                        .map_err(|_| AbiError::UnsupportedType(ty.to_string()))?;
                    if len == 0 || len > 32 {
                        return Err(AbiError::UnsupportedType(ty.to_string()));
                    }
                    return Ok(Self::FixedBytes(len));
                }
                Err(AbiError::UnsupportedType(ty.to_string()))
            }
        }
    }

    fn canonical(&self) -> String {
        match self {
            Self::Address => "address".to_string(),
            Self::Uint(bits) => format!("uint{bits}"),
            Self::Bool => "bool".to_string(),
            Self::FixedBytes(len) => format!("bytes{len}"),
            Self::Bytes => "bytes".to_string(),
            Self::String => "string".to_string(),
        }
    }

    fn is_dynamic(&self) -> bool {
        matches!(self, Self::Bytes | Self::String)
    }
}

fn parse_types(params: &[AbiParam]) -> Result<Vec<SolType>, AbiError> {
    params.iter().map(|p| SolType::parse(&p.ty)).collect()
}

/// Canonical signature, e.g. `transfer(address,uint256)`.
pub fn signature(name: &str, params: &[AbiParam]) -> Result<String, AbiError> {
    let types = parse_types(params)?;
    let joined: Vec<String> = types.iter().map(SolType::canonical).collect();
    Ok(format!("{name}({})", joined.join(",")))
}

/// Four-byte function selector.
pub fn function_selector(name: &str, params: &[AbiParam]) -> Result<[u8; 4], AbiError> {
    let hash = keccak256(signature(name, params)?.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    Ok(selector)
}

/// `topics[0]` value identifying an event.
pub fn event_topic(name: &str, params: &[AbiParam]) -> Result<B256, AbiError> {
    Ok(keccak256(signature(name, params)?.as_bytes()))
}

/// Head/tail-encode `values` against `params`.
pub fn encode_arguments(params: &[AbiParam], values: &[ArgValue]) -> Result<Vec<u8>, AbiError> {
    if params.len() != values.len() {
        return Err(AbiError::ArgumentCount {
            expected: params.len(),
            actual: values.len(),
        });
    }
    let types = parse_types(params)?;

    let head_size = 32 * types.len();
    let mut heads: Vec<u8> = Vec::with_capacity(head_size);
    let mut tail: Vec<u8> = Vec::new();

    for ((param, ty), value) in params.iter().zip(&types).zip(values) {
        if ty.is_dynamic() {
            let offset = U256::from(head_size + tail.len());
            heads.extend_from_slice(&offset.to_be_bytes::<32>());
            tail.extend_from_slice(&encode_dynamic(param, ty, value)?);
        } else {
            heads.extend_from_slice(static_word(param, ty, value)?.as_slice());
        }
    }

    heads.extend_from_slice(&tail);
    Ok(heads)
}

/// Selector-prefixed calldata for a function call.
pub fn encode_call(
    name: &str,
    params: &[AbiParam],
    values: &[ArgValue],
) -> Result<Bytes, AbiError> {
    let mut out = function_selector(name, params)?.to_vec();
    out.extend_from_slice(&encode_arguments(params, values)?);
    Ok(Bytes::from(out))
}

fn mismatch(param: &AbiParam, ty: &SolType, value: &ArgValue) -> AbiError {
    AbiError::TypeMismatch {
        name: param.name.clone(),
        expected: ty.canonical(),
        actual: value.kind(),
    }
}

fn static_word(param: &AbiParam, ty: &SolType, value: &ArgValue) -> Result<B256, AbiError> {
    match (ty, value) {
        (SolType::Address, ArgValue::Address(address)) => Ok(address.into_word()),
        (SolType::Uint(bits), ArgValue::Uint(uint)) => {
            if uint.bit_len() > *bits {
                return Err(mismatch(param, ty, value));
            }
            Ok(B256::from(uint.to_be_bytes::<32>()))
        }
        (SolType::Bool, ArgValue::Bool(flag)) => {
            let mut word = B256::ZERO;
            word[31] = u8::from(*flag);
            Ok(word)
        }
        (SolType::FixedBytes(len), ArgValue::Bytes(bytes)) => {
            if bytes.len() != *len {
                return Err(mismatch(param, ty, value));
            }
            let mut word = B256::ZERO;
            word[..*len].copy_from_slice(bytes);
            Ok(word)
        }
        _ => Err(mismatch(param, ty, value)),
    }
}

fn encode_dynamic(param: &AbiParam, ty: &SolType, value: &ArgValue) -> Result<Vec<u8>, AbiError> {
    let payload: &[u8] = match (ty, value) {
        (SolType::Bytes, ArgValue::Bytes(bytes)) => bytes,
        (SolType::String, ArgValue::String(string)) => string.as_bytes(),
        _ => return Err(mismatch(param, ty, value)),
    };
    let mut out = U256::from(payload.len()).to_be_bytes::<32>().to_vec();
    out.extend_from_slice(payload);
    let padding = payload.len().div_ceil(32) * 32 - payload.len();
    out.extend(std::iter::repeat_n(0u8, padding));
    Ok(out)
}

/// Decode an argument tuple previously encoded against `params`.
pub fn decode_arguments(params: &[AbiParam], data: &[u8]) -> Result<Vec<ArgValue>, AbiError> {
    let types = parse_types(params)?;
    let mut values = Vec::with_capacity(types.len());

    for (slot, (param, ty)) in params.iter().zip(&types).enumerate() {
        let word = read_word(data, slot * 32, &param.name)?;
        if ty.is_dynamic() {
            let offset = word_to_usize(&word, &param.name)?;
            let len_word = read_word(data, offset, &param.name)?;
            let len = word_to_usize(&len_word, &param.name)?;
            let payload = data
                .get(offset + 32..offset + 32 + len)
                .ok_or_else(|| AbiError::Truncated(param.name.clone()))?;
            values.push(match ty {
                SolType::Bytes => ArgValue::Bytes(Bytes::copy_from_slice(payload)),
                SolType::String => ArgValue::String(
                    String::from_utf8(payload.to_vec())
                        .map_err(|_| AbiError::InvalidData(param.name.clone()))?,
                ),
                _ => unreachable!("only bytes and string are dynamic"),
            });
        } else {
            values.push(value_from_word(ty, &word));
        }
    }

    Ok(values)
}

/// Decode an event log into `(name, value)` pairs in declaration order.
///
/// Indexed parameters come from `topics[1..]`; dynamic indexed values are
/// stored on-chain as their keccak hash and surface as 32 raw bytes.
pub fn decode_event(inputs: &[AbiParam], log: &RawLog) -> Result<Vec<(String, ArgValue)>, AbiError> {
    let indexed: Vec<&AbiParam> = inputs.iter().filter(|p| p.indexed).collect();
    let plain: Vec<AbiParam> = inputs.iter().filter(|p| !p.indexed).cloned().collect();

    if log.topics.len() < indexed.len() + 1 {
        return Err(AbiError::Truncated("event topics".to_string()));
    }

    let mut by_name: Vec<(String, ArgValue)> = Vec::with_capacity(inputs.len());

    for (param, topic) in indexed.iter().zip(log.topics.iter().skip(1)) {
        let ty = SolType::parse(&param.ty)?;
        let value = if ty.is_dynamic() {
            ArgValue::Bytes(Bytes::copy_from_slice(topic.as_slice()))
        } else {
            value_from_word(&ty, topic)
        };
        by_name.push((param.name.clone(), value));
    }

    let plain_values = decode_arguments(&plain, &log.data)?;
    for (param, value) in plain.iter().zip(plain_values) {
        by_name.push((param.name.clone(), value));
    }

    Ok(by_name)
}

fn read_word(data: &[u8], offset: usize, name: &str) -> Result<B256, AbiError> {
    let slice = data
        .get(offset..offset + 32)
        .ok_or_else(|| AbiError::Truncated(name.to_string()))?;
    Ok(B256::from_slice(slice))
}

fn word_to_usize(word: &B256, name: &str) -> Result<usize, AbiError> {
    usize::try_from(U256::from_be_bytes(word.0))
        .map_err(|_| AbiError::InvalidData(name.to_string()))
}

fn value_from_word(ty: &SolType, word: &B256) -> ArgValue {
    match ty {
        SolType::Address => ArgValue::Address(Address::from_word(*word)),
        SolType::Uint(_) => ArgValue::Uint(U256::from_be_bytes(word.0)),
        SolType::Bool => ArgValue::Bool(word[31] != 0),
        SolType::FixedBytes(len) => ArgValue::Bytes(Bytes::copy_from_slice(&word[..*len])),
        SolType::Bytes | SolType::String => {
            unreachable!("dynamic types are not decoded from a single word")
        }
    }
}
