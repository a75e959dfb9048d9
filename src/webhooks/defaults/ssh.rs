//! SSH key material for VMs and AKS nodes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, PrivateKey};

use crate::webhooks::error::{AdmissionError, Result};

/// Generate a fresh Ed25519 key pair and return the base64-encoded OpenSSH
/// public line. The private half is discarded.
pub fn generate_public_key() -> Result<String> {
    let private = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|e| AdmissionError::KeyGeneration(e.to_string()))?;
    let line = private
        .public_key()
        .to_openssh()
        .map_err(|e| AdmissionError::KeyGeneration(e.to_string()))?;
    Ok(STANDARD.encode(line))
}
