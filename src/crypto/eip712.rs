//! EIP-712 typed data hashing
//!
//! Only the one struct the gateway verifies is supported: the EIP-3009
//! `TransferWithAuthorization` message used by USDC-style tokens.

use ethereum_types::{Address, H256, U256};

/// EIP-712 domain separator inputs
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const TRANSFER_TYPE: &[u8] = b"TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

/// Digest a `TransferWithAuthorization` message for signing or recovery
pub fn transfer_with_authorization_digest(
    domain: &Domain,
    from: Address,
    to: Address,
    value: U256,
    valid_after: U256,
    valid_before: U256,
    nonce: H256,
) -> H256 {
    let mut encoded = Vec::with_capacity(7 * 32);
    encoded.extend_from_slice(&keccak256(TRANSFER_TYPE));
    encoded.extend_from_slice(&encode_address(from));
    encoded.extend_from_slice(&encode_address(to));
    encoded.extend_from_slice(&encode_u256(value));
    encoded.extend_from_slice(&encode_u256(valid_after));
    encoded.extend_from_slice(&encode_u256(valid_before));
    encoded.extend_from_slice(nonce.as_bytes());
    let struct_hash = keccak256(&encoded);

    let separator = domain_separator(domain);

    // EIP-712: keccak(0x1901 || domainSeparator || structHash)
    let mut data = Vec::with_capacity(2 + 32 + 32);
    data.extend_from_slice(&[0x19, 0x01]);
    data.extend_from_slice(separator.as_bytes());
    data.extend_from_slice(&struct_hash);
    H256::from_slice(&keccak256(&data))
}

/// Hash the domain separator
pub fn domain_separator(domain: &Domain) -> H256 {
    let mut encoded = Vec::with_capacity(5 * 32);
    encoded.extend_from_slice(&keccak256(DOMAIN_TYPE));
    encoded.extend_from_slice(&keccak256(domain.name.as_bytes()));
    encoded.extend_from_slice(&keccak256(domain.version.as_bytes()));
    encoded.extend_from_slice(&encode_u256(U256::from(domain.chain_id)));
    encoded.extend_from_slice(&encode_address(domain.verifying_contract));
    H256::from_slice(&keccak256(&encoded))
}

/// ABI-encode an address into a 32-byte word
pub fn encode_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// ABI-encode a uint256 into a 32-byte word
pub fn encode_u256(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// Keccak-256 hash function
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    Keccak256::digest(data).into()
}
