use k256::{PublicKey, SecretKey, ecdh, elliptic_curve::sec1::ToEncodedPoint};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::key::{CryptoError, SharedKey};

/// Ephemeral secp256k1 key pair for one Diffie-Hellman exchange.
pub struct EphemeralKey {
    secret: SecretKey,
}

impl EphemeralKey {
    pub fn generate() -> Self {
        Self::generate_with_rng(&mut rand::rng())
    }

    pub fn generate_with_rng<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let mut scalar = Zeroizing::new([0u8; 32]);
            rng.fill(&mut *scalar);
            // Zero or >= the group order: draw again.
            if let Ok(secret) = SecretKey::from_slice(scalar.as_slice()) {
                return Self { secret };
            }
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Uncompressed SEC1 point without the leading `04` byte, hex encoded.
    pub fn public_hex(&self) -> String {
        let point = self.public_key().to_encoded_point(false);
        hex::encode(&point.as_bytes()[1..])
    }

    /// Derives the session key from the peer's `public_hex` style key.
    pub fn complete(&self, peer_public_hex: &str) -> Result<SharedKey, CryptoError> {
        let peer_public_hex = peer_public_hex.trim();
        if peer_public_hex.is_empty() {
            return Err(CryptoError::InvalidPeerKey);
        }

        let encoded =
            hex::decode(format!("04{peer_public_hex}")).map_err(|_| CryptoError::InvalidPeerKey)?;
        let peer = PublicKey::from_sec1_bytes(&encoded).map_err(|_| CryptoError::InvalidPeerKey)?;

        Ok(derive_shared_key(&self.secret, &peer))
    }
}

/// x coordinate of the ECDH point, i.e. bytes 1..33 of its compressed encoding.
pub fn derive_shared_key(secret: &SecretKey, peer: &PublicKey) -> SharedKey {
    let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(shared.raw_secret_bytes().as_slice());
    SharedKey::from_bytes(*key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn both_sides_derive_the_same_key() {
        let host = EphemeralKey::generate();
        let device = EphemeralKey::generate();

        let host_key = host.complete(&device.public_hex()).unwrap();
        let device_key = device.complete(&host.public_hex()).unwrap();
        assert_eq!(host_key, device_key);

        let stranger = EphemeralKey::generate();
        assert_ne!(host.complete(&stranger.public_hex()).unwrap(), host_key);
    }

    #[test]
    fn key_is_compressed_point_without_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        let host = EphemeralKey::generate_with_rng(&mut rng);
        let device = EphemeralKey::generate_with_rng(&mut rng);

        let point = (device.public_key().to_projective() * *host.secret.to_nonzero_scalar())
            .to_affine()
            .to_encoded_point(true);
        let expected = &point.as_bytes()[1..33];

        let key = host.complete(&device.public_hex()).unwrap();
        assert_eq!(key.as_bytes().as_slice(), expected);
    }

    #[test]
    fn public_hex_is_uncompressed_without_prefix() {
        let key = EphemeralKey::generate();
        let public_hex = key.public_hex();
        assert_eq!(public_hex.len(), 128);

        let full = hex::decode(format!("04{public_hex}")).unwrap();
        assert_eq!(PublicKey::from_sec1_bytes(&full).unwrap(), key.public_key());
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let a = EphemeralKey::generate_with_rng(&mut StdRng::seed_from_u64(1));
        let b = EphemeralKey::generate_with_rng(&mut StdRng::seed_from_u64(1));
        assert_eq!(a.public_hex(), b.public_hex());
    }

    #[test]
    fn rejects_malformed_peer_keys() {
        let host = EphemeralKey::generate();
        let valid = EphemeralKey::generate().public_hex();

        assert_eq!(host.complete("").err(), Some(CryptoError::InvalidPeerKey));
        assert_eq!(host.complete("  ").err(), Some(CryptoError::InvalidPeerKey));
        assert_eq!(host.complete("xyz").err(), Some(CryptoError::InvalidPeerKey));
        assert_eq!(
            host.complete(&valid[..64]).err(),
            Some(CryptoError::InvalidPeerKey)
        );
        // Right length, but not a point on the curve.
        assert_eq!(
            host.complete(&"00".repeat(64)).err(),
            Some(CryptoError::InvalidPeerKey)
        );
    }
}
