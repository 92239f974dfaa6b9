//! Address to ElectrumX scripthash encoding.
//!
//! ElectrumX indexes history by the SHA-256 of an output's locking script,
//! hex encoded in reversed byte order. We rebuild the canonical locking script
//! for each supported address family and hash it.

use crate::error::{Result, ScanError};
use bech32::{FromBase32, Variant};
use sha2::{Digest, Sha256};

const P2PKH_VERSION: u8 = 0x00;
const P2SH_VERSION: u8 = 0x05;
const SEGWIT_HRP: &str = "bc";

const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::P2pkh => "p2pkh",
            AddressKind::P2sh => "p2sh",
            AddressKind::P2wpkh => "p2wpkh",
            AddressKind::P2wsh => "p2wsh",
            AddressKind::P2tr => "p2tr",
        }
    }
}

/// Decode `address` and build its locking script.
pub fn locking_script(address: &str) -> Result<(AddressKind, Vec<u8>)> {
    let address = address.trim();

    if address.starts_with('1') {
        let hash = decode_base58_hash(address, P2PKH_VERSION)?;
        let mut script = vec![OP_DUP, OP_HASH160, 0x14];
        script.extend_from_slice(&hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        return Ok((AddressKind::P2pkh, script));
    }

    if address.starts_with('3') {
        let hash = decode_base58_hash(address, P2SH_VERSION)?;
        let mut script = vec![OP_HASH160, 0x14];
        script.extend_from_slice(&hash);
        script.push(OP_EQUAL);
        return Ok((AddressKind::P2sh, script));
    }

    if address.to_ascii_lowercase().starts_with("bc1") {
        return segwit_script(address);
    }

    Err(ScanError::invalid_address(address, "unsupported address type"))
}

/// Compute the ElectrumX scripthash for `address`.
pub fn address_to_scripthash(address: &str) -> Result<String> {
    let (_, script) = locking_script(address)?;
    Ok(scripthash(&script))
}

/// Byte-reversed hex SHA-256 of a raw locking script.
pub fn scripthash(script: &[u8]) -> String {
    let mut digest = Sha256::digest(script).to_vec();
    digest.reverse();
    hex::encode(digest)
}

fn decode_base58_hash(address: &str, expected_version: u8) -> Result<Vec<u8>> {
    let payload = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| ScanError::invalid_address(address, format!("base58check: {}", e)))?;

    if payload.len() != 21 {
        return Err(ScanError::invalid_address(
            address,
            format!("unexpected payload length {}", payload.len()),
        ));
    }
    if payload[0] != expected_version {
        return Err(ScanError::invalid_address(
            address,
            format!("unexpected version byte {:#04x}", payload[0]),
        ));
    }

    Ok(payload[1..].to_vec())
}

fn segwit_script(address: &str) -> Result<(AddressKind, Vec<u8>)> {
    let (hrp, data, variant) = bech32::decode(address)
        .map_err(|e| ScanError::invalid_address(address, format!("bech32: {}", e)))?;

    if hrp != SEGWIT_HRP {
        return Err(ScanError::invalid_address(
            address,
            format!("unexpected human readable part '{}'", hrp),
        ));
    }

    let Some((version, program)) = data.split_first() else {
        return Err(ScanError::invalid_address(address, "empty witness data"));
    };
    let version = version.to_u8();
    let program = Vec::<u8>::from_base32(program)
        .map_err(|e| ScanError::invalid_address(address, format!("witness program: {}", e)))?;

    let (kind, prefix, expected_variant) = match (version, program.len()) {
        (0, 20) => (AddressKind::P2wpkh, [OP_0, 0x14], Variant::Bech32),
        (0, 32) => (AddressKind::P2wsh, [OP_0, 0x20], Variant::Bech32),
        (1, 32) => (AddressKind::P2tr, [OP_1, 0x20], Variant::Bech32m),
        (v, len) => {
            return Err(ScanError::invalid_address(
                address,
                format!("unsupported witness version {} with {}-byte program", v, len),
            ));
        }
    };

    if variant != expected_variant {
        return Err(ScanError::invalid_address(
            address,
            format!("witness version {} uses the wrong checksum variant", version),
        ));
    }

    let mut script = prefix.to_vec();
    script.extend_from_slice(&program);
    Ok((kind, script))
}
