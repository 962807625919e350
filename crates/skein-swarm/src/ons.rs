//! Name resolution.
//!
//! A name resolves only when every queried node returns a value that decrypts
//! to the same account id. Each value is decrypted locally under a key derived
//! from the name, so a node can refuse to answer but cannot substitute a
//! different id without every other validator doing the same.

use crate::client::SwarmClient;
use crate::error::{SwarmError, SwarmResult};
use crate::retry::{Attempt, run_with_retry};
use futures::future::join_all;
use serde_json::Value;
use skein_core::{AccountId, AccountPrefix, SubRequest};
use skein_crypto::aead::{AeadKey, Nonce};
use skein_crypto::hash::{ons_name_hash, ons_value_key};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Decrypt one node's answer for `name`.
///
/// # Errors
///
/// [`SwarmError::OnsResolution`] for malformed hex, a failed decryption or a
/// plaintext that is not a standard account id.
pub fn decrypt_ons_value(name: &str, encrypted_hex: &str, nonce_hex: &str) -> SwarmResult<AccountId> {
    let fail = |what: &str| SwarmError::OnsResolution(format!("{name}: {what}").into());

    let ciphertext = hex::decode(encrypted_hex).map_err(|_| fail("encrypted value is not hex"))?;
    let nonce = hex::decode(nonce_hex).map_err(|_| fail("nonce is not hex"))?;
    let nonce = Nonce::from_slice(&nonce).map_err(|_| fail("bad nonce length"))?;

    let name_hash = ons_name_hash(name);
    let key = ons_value_key(name, &name_hash).map_err(|_| fail("key derivation failed"))?;
    let plaintext = AeadKey::new(key)
        .decrypt(&nonce, &ciphertext, b"")
        .map_err(|_| fail("value does not decrypt"))?;

    let bytes: [u8; 33] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| fail("decrypted value is not 33 bytes"))?;
    if bytes[0] != AccountPrefix::Standard as u8 {
        return Err(fail("decrypted value is not a standard account id"));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes[1..]);
    Ok(AccountId::new(AccountPrefix::Standard, key))
}

fn read_answer(body: &Value) -> SwarmResult<(&str, &str)> {
    let result = body.get("result").unwrap_or(body);
    let encrypted = result.get("encrypted_value").and_then(Value::as_str);
    let nonce = result.get("nonce").and_then(Value::as_str);
    match (encrypted, nonce) {
        (Some(encrypted), Some(nonce)) => Ok((encrypted, nonce)),
        _ => Err(SwarmError::OnsResolution("name not registered".into())),
    }
}

impl SwarmClient {
    /// Resolve `name` to an account id, requiring all validators to agree.
    ///
    /// # Errors
    ///
    /// - [`SwarmError::OnsResolution`] on testnet, for an unknown name, any
    ///   decryption failure or any disagreement
    /// - [`SwarmError::NoNodes`] if the pool cannot supply enough validators
    /// - the last transport error once retries are spent
    pub async fn resolve_ons(&self, name: &str, cancel: &CancellationToken) -> SwarmResult<AccountId> {
        if self.config().network.testnet {
            return Err(SwarmError::OnsResolution("name resolution is disabled on testnet".into()));
        }
        let name = name.to_lowercase();
        let name = name.as_str();
        let request = SubRequest::ons_resolve(name)?;
        let request = &request;
        let validators = self.config().ons.validators;

        run_with_retry(self.retry_policy(), cancel, move |_| async move {
            let outcome = async {
                let nodes = self.pool().random_snodes(validators).await?;
                if nodes.len() < validators {
                    return Err(SwarmError::NoNodes(
                        format!("need {validators} validators, pool offered {}", nodes.len()).into(),
                    ));
                }
                let answers = join_all(
                    nodes
                        .iter()
                        .map(|node| self.single(node, request.clone(), self.config().timeouts.ons(), cancel)),
                )
                .await;

                let mut resolved: Option<AccountId> = None;
                for answer in answers {
                    let answer = answer?;
                    let (encrypted, nonce) = read_answer(&answer.body)?;
                    let id = decrypt_ons_value(name, encrypted, nonce)?;
                    match resolved {
                        None => resolved = Some(id),
                        Some(previous) if previous == id => {}
                        Some(previous) => {
                            warn!(name, %previous, %id, "validators disagree");
                            return Err(SwarmError::OnsResolution(format!("{name}: validators disagree").into()));
                        }
                    }
                }
                let id = resolved.ok_or_else(|| SwarmError::OnsResolution("no validator answered".into()))?;
                debug!(name, validators, "validators agree");
                Ok::<_, SwarmError>(id)
            };
            Attempt::from(outcome.await)
        })
        .await
        .inspect(|id| info!(name, %id, "resolved name"))
    }
}
