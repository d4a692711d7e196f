use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::{GachaponError, Result};
use crate::types::ShippingAddress;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Decrypt `base64(iv):base64(tag):base64(ciphertext)` into a shipping
/// address. Every failure mode, from malformed framing to a bad auth tag,
/// returns the same generic error.
pub fn decrypt_shipping_data(key: &[u8; 32], payload: &str) -> Result<ShippingAddress> {
    let plaintext = decrypt_payload(key, payload)?;
    serde_json::from_slice(&plaintext).map_err(|_| GachaponError::Decryption)
}

fn decrypt_payload(key: &[u8; 32], payload: &str) -> Result<Vec<u8>> {
    let mut parts = payload.split(':');
    let (iv_b64, tag_b64, ct_b64) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(iv), Some(tag), Some(ct), None) => (iv, tag, ct),
        _ => return Err(GachaponError::Decryption),
    };

    let iv = general_purpose::STANDARD
        .decode(iv_b64)
        .map_err(|_| GachaponError::Decryption)?;
    let tag = general_purpose::STANDARD
        .decode(tag_b64)
        .map_err(|_| GachaponError::Decryption)?;
    let ciphertext = general_purpose::STANDARD
        .decode(ct_b64)
        .map_err(|_| GachaponError::Decryption)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(GachaponError::Decryption);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| GachaponError::Decryption)?;

    // The AEAD wants the tag appended to the ciphertext
    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
        .map_err(|_| GachaponError::Decryption)
}

/// Produce the wire format from a shipping address. Clients encrypt before
/// transmission in production; this backs tests and offline tooling.
pub fn encrypt_shipping_data(key: &[u8; 32], address: &ShippingAddress) -> Result<String> {
    let plaintext = serde_json::to_vec(address)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| GachaponError::internal("Shipping data key rejected by cipher"))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_ref())
        .map_err(|_| GachaponError::internal("Shipping data encryption failed"))?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(format!(
        "{}:{}:{}",
        general_purpose::STANDARD.encode(iv),
        general_purpose::STANDARD.encode(tag),
        general_purpose::STANDARD.encode(sealed)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [9u8; 32];

    fn sample_address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_string(),
            line1: "12 Analytical Way".to_string(),
            line2: Some("Unit 7".to_string()),
            city: "London".to_string(),
            state: "LDN".to_string(),
            postal_code: "EC1A 1AA".to_string(),
            country: "GB".to_string(),
            phone: None,
        }
    }

    #[test]
    fn wire_format_round_trips() {
        let encrypted = encrypt_shipping_data(&KEY, &sample_address()).unwrap();
        assert_eq!(encrypted.split(':').count(), 3);

        let decrypted = decrypt_shipping_data(&KEY, &encrypted).unwrap();
        assert_eq!(decrypted.name, "Ada Lovelace");
        assert_eq!(decrypted.line2.as_deref(), Some("Unit 7"));
        assert_eq!(decrypted.postal_code, "EC1A 1AA");
    }

    #[test]
    fn tampered_ciphertext_fails_generically() {
        let encrypted = encrypt_shipping_data(&KEY, &sample_address()).unwrap();
        let mut parts: Vec<String> = encrypted.split(':').map(String::from).collect();
        let mut ct = general_purpose::STANDARD.decode(&parts[2]).unwrap();
        ct[0] ^= 0x01;
        parts[2] = general_purpose::STANDARD.encode(&ct);

        let err = decrypt_shipping_data(&KEY, &parts.join(":")).unwrap_err();
        assert!(matches!(err, GachaponError::Decryption));
    }

    #[test]
    fn wrong_key_fails_generically() {
        let encrypted = encrypt_shipping_data(&KEY, &sample_address()).unwrap();
        let err = decrypt_shipping_data(&[10u8; 32], &encrypted).unwrap_err();
        assert!(matches!(err, GachaponError::Decryption));
    }

    #[test]
    fn malformed_framing_fails_generically() {
        for payload in [
            "",
            "onlyonepart",
            "two:parts",
            "a:b:c:d",
            "!!!:???:***",
            "AAAA:BBBB:CCCC",
        ] {
            let err = decrypt_shipping_data(&KEY, payload).unwrap_err();
            assert!(matches!(err, GachaponError::Decryption), "{:?}", payload);
        }
    }

    #[test]
    fn wrong_nonce_length_fails_generically() {
        let encrypted = encrypt_shipping_data(&KEY, &sample_address()).unwrap();
        let mut parts: Vec<String> = encrypted.split(':').map(String::from).collect();
        parts[0] = general_purpose::STANDARD.encode([0u8; 8]);

        let err = decrypt_shipping_data(&KEY, &parts.join(":")).unwrap_err();
        assert!(matches!(err, GachaponError::Decryption));
    }

    #[test]
    fn valid_seal_around_non_json_fails_generically() {
        let cipher = Aes256Gcm::new_from_slice(&KEY).unwrap();
        let iv = [3u8; IV_LEN];
        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&iv), b"not json at all".as_ref())
            .unwrap();
        let tag = sealed.split_off(sealed.len() - TAG_LEN);
        let payload = format!(
            "{}:{}:{}",
            general_purpose::STANDARD.encode(iv),
            general_purpose::STANDARD.encode(tag),
            general_purpose::STANDARD.encode(sealed)
        );

        let err = decrypt_shipping_data(&KEY, &payload).unwrap_err();
        assert!(matches!(err, GachaponError::Decryption));
    }
}
