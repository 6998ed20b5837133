//! Detached Ed25519 signature verification for fetched artifacts.
//!
//! The signature covers the raw artifact bytes. It is either given inline as
//! hex or fetched from a URL; a fetched signature may be raw (64 bytes) or
//! hex text.

use ring::signature::{ED25519, UnparsedPublicKey};
use tracing::{debug, info};

use crate::config::SignatureConfig;
use crate::execute::types::ExecuteError;

const SIGNATURE_LEN: usize = 64;
const PUBLIC_KEY_LEN: usize = 32;

/// Verify `artifact` (downloaded from `url`) against the configured signature.
pub async fn verify_signature(url: &str, artifact: &[u8], signature: &SignatureConfig) -> Result<(), ExecuteError> {
  let invalid = |message: String| ExecuteError::SignatureInvalid {
    url: url.to_string(),
    message,
  };

  let public_key = hex::decode(signature.public_key.trim()).map_err(|e| invalid(format!("public key: {e}")))?;
  if public_key.len() != PUBLIC_KEY_LEN {
    return Err(invalid(format!(
      "public key is {} bytes, expected {PUBLIC_KEY_LEN}",
      public_key.len()
    )));
  }

  let sig = match (&signature.value, &signature.url) {
    (Some(value), _) => hex::decode(value.trim()).map_err(|e| invalid(format!("signature: {e}")))?,
    (None, Some(sig_url)) => fetch_signature(sig_url).await?,
    (None, None) => return Err(invalid("no signature source configured".to_string())),
  };
  if sig.len() != SIGNATURE_LEN {
    return Err(invalid(format!("signature is {} bytes, expected {SIGNATURE_LEN}", sig.len())));
  }

  UnparsedPublicKey::new(&ED25519, &public_key)
    .verify(artifact, &sig)
    .map_err(|_| invalid("signature does not match pinned public key".to_string()))?;

  info!(url = %url, "signature verified");
  Ok(())
}

async fn fetch_signature(url: &str) -> Result<Vec<u8>, ExecuteError> {
  debug!(url = %url, "fetching signature");
  let failed = |message: String| ExecuteError::FetchFailed {
    url: url.to_string(),
    message,
  };

  let response = reqwest::get(url).await.map_err(|e| failed(e.to_string()))?;
  if !response.status().is_success() {
    return Err(failed(format!("HTTP {}", response.status())));
  }
  let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

  if bytes.len() == SIGNATURE_LEN {
    return Ok(bytes.to_vec());
  }
  let text = String::from_utf8_lossy(&bytes);
  hex::decode(text.trim()).map_err(|e| ExecuteError::SignatureInvalid {
    url: url.to_string(),
    message: format!("signature file is neither raw nor hex: {e}"),
  })
}
