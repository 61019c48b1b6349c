//! Signature utilities
//!
//! Recovery-based verification of EIP-712 signatures, raw signing with the
//! gateway's key, and the legacy-transaction encoding used to broadcast
//! `transferWithAuthorization` settlements.

use super::eip712::{self, keccak256};
use crate::types::{assets, chains, ExactEvmPayload};
use crate::{GatewayError, Result};
use ethereum_types::{Address, H256, U256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use secp256k1::{Message, Secp256k1, SecretKey};
use std::str::FromStr;

/// Split a 65-byte hex signature into (r, s, recovery id)
fn split_signature(signature: &str) -> Result<([u8; 64], u8)> {
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| GatewayError::invalid_signature("Invalid hex signature"))?;
    if sig_bytes.len() != 65 {
        return Err(GatewayError::invalid_signature("Signature must be 65 bytes"));
    }
    let mut compact = [0u8; 64];
    compact.copy_from_slice(&sig_bytes[..64]);
    // Wallets emit v as 27/28; recovery wants 0/1.
    let v = sig_bytes[64];
    let rec_id = if v >= 27 { v - 27 } else { v };
    Ok((compact, rec_id))
}

/// Verify an EIP-712 signature against an expected signer address
pub fn verify_eip712_signature(
    signature: &str,
    digest: H256,
    expected_address: Address,
) -> Result<bool> {
    let (compact, rec_id) = split_signature(signature)?;
    let recovery_id = RecoveryId::try_from(rec_id)
        .map_err(|_| GatewayError::invalid_signature("Invalid recovery ID"))?;
    let k256_sig = K256Signature::try_from(&compact[..])
        .map_err(|_| GatewayError::invalid_signature("Invalid signature format"))?;
    let verifying_key =
        VerifyingKey::recover_from_prehash(digest.as_bytes(), &k256_sig, recovery_id)
            .map_err(|_| GatewayError::invalid_signature("Failed to recover public key"))?;
    let recovered = ethereum_address_from_pubkey(&verifying_key)?;
    Ok(recovered == expected_address)
}

/// Sign a 32-byte digest, returning a 65-byte 0x-prefixed hex signature
pub fn sign_digest(digest: H256, private_key: &str) -> Result<String> {
    let secret_key = parse_private_key(private_key)?;
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest.as_bytes())
        .map_err(|_| GatewayError::invalid_signature("Invalid message digest"))?;
    let signature = secp.sign_ecdsa_recoverable(&message, &secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut sig_bytes = [0u8; 65];
    sig_bytes[..64].copy_from_slice(&compact);
    sig_bytes[64] = recovery_id.to_i32() as u8 + 27;
    Ok(format!("0x{}", hex::encode(sig_bytes)))
}

/// Parse a 0x-prefixed hex private key
pub fn parse_private_key(private_key: &str) -> Result<SecretKey> {
    let bytes = hex::decode(private_key.trim_start_matches("0x"))
        .map_err(|_| GatewayError::invalid_signature("Invalid hex private key"))?;
    SecretKey::from_slice(&bytes)
        .map_err(|_| GatewayError::invalid_signature("Invalid private key"))
}

/// Address controlled by a private key
pub fn address_of_private_key(private_key: &str) -> Result<Address> {
    let secret_key = parse_private_key(private_key)?;
    let secp = Secp256k1::new();
    let public_key = secret_key.public_key(&secp);
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Convert a recovered public key to an Ethereum address
fn ethereum_address_from_pubkey(pubkey: &VerifyingKey) -> Result<Address> {
    let pubkey_bytes = pubkey.to_encoded_point(false);
    let pubkey_bytes = pubkey_bytes.as_bytes();
    if pubkey_bytes.len() != 65 {
        return Err(GatewayError::invalid_signature("Invalid public key length"));
    }
    let hash = keccak256(&pubkey_bytes[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Ok(Address::from(address))
}

/// Verify the EIP-712 signature of an EIP-3009 payment payload
pub fn verify_payment_payload(payload: &ExactEvmPayload, chain: &str) -> Result<bool> {
    let auth = &payload.authorization;
    let from = Address::from_str(&auth.from)
        .map_err(|_| GatewayError::invalid_signature("Invalid from address"))?;
    let to = Address::from_str(&auth.to)
        .map_err(|_| GatewayError::invalid_signature("Invalid to address"))?;
    let chain_id = chains::evm_chain_id(chain)
        .ok_or_else(|| GatewayError::chain_not_supported(chain))?;
    let contract = assets::usdc_address(chain)
        .ok_or_else(|| GatewayError::chain_not_supported(chain))?;

    let digest = eip712::transfer_with_authorization_digest(
        &eip712::Domain {
            name: "USD Coin".to_string(),
            version: "2".to_string(),
            chain_id,
            verifying_contract: Address::from_str(contract)
                .map_err(|_| GatewayError::invalid_signature("Invalid verifying contract"))?,
        },
        from,
        to,
        parse_u256(&auth.value, "value")?,
        parse_u256(&auth.valid_after, "validAfter")?,
        parse_u256(&auth.valid_before, "validBefore")?,
        H256::from_str(auth.nonce.trim_start_matches("0x"))
            .map_err(|_| GatewayError::invalid_signature("Invalid nonce"))?,
    );

    verify_eip712_signature(&payload.signature, digest, from)
}

fn parse_u256(value: &str, field: &str) -> Result<U256> {
    U256::from_dec_str(value)
        .map_err(|_| GatewayError::invalid_signature(format!("Invalid {}", field)))
}

/// ABI-encode a `transferWithAuthorization` call from a signed payload
pub fn encode_transfer_with_authorization(payload: &ExactEvmPayload) -> Result<Vec<u8>> {
    let auth = &payload.authorization;
    let from = Address::from_str(&auth.from)
        .map_err(|_| GatewayError::invalid_authorization("Invalid from address"))?;
    let to = Address::from_str(&auth.to)
        .map_err(|_| GatewayError::invalid_authorization("Invalid to address"))?;
    let nonce = H256::from_str(auth.nonce.trim_start_matches("0x"))
        .map_err(|_| GatewayError::invalid_authorization("Invalid nonce"))?;
    let (compact, rec_id) = split_signature(&payload.signature)?;

    let selector = &keccak256(
        b"transferWithAuthorization(address,address,uint256,uint256,uint256,bytes32,uint8,bytes32,bytes32)",
    )[..4];

    let mut data = Vec::with_capacity(4 + 9 * 32);
    data.extend_from_slice(selector);
    data.extend_from_slice(&eip712::encode_address(from));
    data.extend_from_slice(&eip712::encode_address(to));
    data.extend_from_slice(&eip712::encode_u256(parse_u256(&auth.value, "value")?));
    data.extend_from_slice(&eip712::encode_u256(parse_u256(
        &auth.valid_after,
        "validAfter",
    )?));
    data.extend_from_slice(&eip712::encode_u256(parse_u256(
        &auth.valid_before,
        "validBefore",
    )?));
    data.extend_from_slice(nonce.as_bytes());
    data.extend_from_slice(&eip712::encode_u256(U256::from(rec_id + 27)));
    data.extend_from_slice(&compact[..32]);
    data.extend_from_slice(&compact[32..]);
    Ok(data)
}

/// An unsigned legacy (pre-EIP-1559) transaction
#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// Sign the transaction (EIP-155) and return the raw 0x-prefixed hex bytes
    pub fn sign(&self, private_key: &str) -> Result<String> {
        let secret_key = parse_private_key(private_key)?;
        let secp = Secp256k1::new();

        let mut stream = rlp::RlpStream::new_list(9);
        self.append_common(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        let digest = keccak256(&stream.out());

        let message = Message::from_digest_slice(&digest)
            .map_err(|_| GatewayError::invalid_signature("Invalid transaction digest"))?;
        let signature = secp.sign_ecdsa_recoverable(&message, &secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let v = self.chain_id * 2 + 35 + recovery_id.to_i32() as u64;
        let r = U256::from_big_endian(&compact[..32]);
        let s = U256::from_big_endian(&compact[32..]);

        let mut signed = rlp::RlpStream::new_list(9);
        self.append_common(&mut signed);
        signed.append(&v);
        signed.append(&r);
        signed.append(&s);
        Ok(format!("0x{}", hex::encode(signed.out())))
    }

    fn append_common(&self, stream: &mut rlp::RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to);
        stream.append(&self.value);
        stream.append(&self.data);
    }
}
