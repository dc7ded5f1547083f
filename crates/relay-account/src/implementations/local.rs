//! Local Ed25519 account.
//!
//! The key comes from exactly one of:
//!
//! * `private_key` - 32-byte secret as hex, with or without `0x`
//! * `keystore_entry` - base64 of a scheme flag byte followed by the secret,
//!   the format used by the ledger CLI keystore
//! * `keystore_path` - JSON array of keystore entries; `address` selects one,
//!   otherwise the first entry is used

use crate::{AccountError, AccountInterface};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use blake2::{digest::consts::U32, Blake2b, Digest};
use ed25519_dalek::{Signer, SigningKey};
use relay_types::{
	with_0x_prefix, without_0x_prefix, Address, ConfigSchema, Field, FieldType, Schema,
	SecretString, Signature, ValidationError,
};
use std::path::Path;

type Blake2b256 = Blake2b<U32>;

/// Signature scheme flag for Ed25519 keys and signatures.
const ED25519_FLAG: u8 = 0x00;

/// Intent prefix for transaction data: scope, version, app id.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// Account backed by an in-memory Ed25519 signing key.
pub struct LocalAccount {
	key: SigningKey,
	address: Address,
}

impl LocalAccount {
	/// Builds an account from a hex-encoded 32-byte secret.
	pub fn from_hex(private_key: &SecretString) -> Result<Self, AccountError> {
		let bytes = private_key
			.with_exposed(|key| hex::decode(without_0x_prefix(key.trim())))
			.map_err(|e| AccountError::InvalidKey(format!("Private key is not hex: {}", e)))?;
		Self::from_secret_bytes(&bytes)
	}

	/// Builds an account from a base64 keystore entry (`flag || secret`).
	pub fn from_keystore_entry(entry: &SecretString) -> Result<Self, AccountError> {
		let bytes = entry
			.with_exposed(|e| BASE64.decode(e.trim()))
			.map_err(|e| AccountError::InvalidKey(format!("Keystore entry is not base64: {}", e)))?;

		match bytes.split_first() {
			Some((&ED25519_FLAG, secret)) => Self::from_secret_bytes(secret),
			Some((flag, _)) => Err(AccountError::InvalidKey(format!(
				"Unsupported key scheme flag {:#04x}",
				flag
			))),
			None => Err(AccountError::InvalidKey("Keystore entry is empty".into())),
		}
	}

	/// Loads a keystore file and picks the entry for `address`, or the
	/// first entry when no address is given.
	pub fn from_keystore_file(path: &Path, address: Option<&str>) -> Result<Self, AccountError> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			AccountError::Keystore(format!("Cannot read {}: {}", path.display(), e))
		})?;
		let entries: Vec<String> = serde_json::from_str(&content).map_err(|e| {
			AccountError::Keystore(format!("{} is not a keystore: {}", path.display(), e))
		})?;

		let wanted = address.map(|a| with_0x_prefix(a).to_lowercase());
		for entry in entries {
			let account = Self::from_keystore_entry(&SecretString::from(entry))?;
			match &wanted {
				Some(wanted) if &account.address.0 != wanted => continue,
				_ => return Ok(account),
			}
		}

		Err(AccountError::Keystore(match wanted {
			Some(wanted) => format!("No key for {} in {}", wanted, path.display()),
			None => format!("{} holds no keys", path.display()),
		}))
	}

	fn from_secret_bytes(bytes: &[u8]) -> Result<Self, AccountError> {
		let secret: [u8; 32] = bytes.try_into().map_err(|_| {
			AccountError::InvalidKey(format!("Expected 32 secret bytes, got {}", bytes.len()))
		})?;
		let key = SigningKey::from_bytes(&secret);
		let address = derive_address(&key.verifying_key().to_bytes());
		Ok(Self { key, address })
	}

	/// Raw Ed25519 public key.
	pub fn public_key(&self) -> [u8; 32] {
		self.key.verifying_key().to_bytes()
	}
}

/// Address of an Ed25519 public key: `0x` + hex(blake2b256(flag || pubkey)).
fn derive_address(public_key: &[u8; 32]) -> Address {
	let mut hasher = Blake2b256::new();
	hasher.update([ED25519_FLAG]);
	hasher.update(public_key);
	Address(with_0x_prefix(&hex::encode(hasher.finalize())))
}

/// Configuration schema for the local account.
pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("private_key", FieldType::String),
				Field::new("keystore_entry", FieldType::String),
				Field::new("keystore_path", FieldType::String),
				Field::new("address", FieldType::String),
			],
		);
		schema.validate(config)?;

		let sources = ["private_key", "keystore_entry", "keystore_path"]
			.iter()
			.filter(|key| config.get(**key).is_some())
			.count();
		if sources != 1 {
			return Err(ValidationError::InvalidValue {
				field: "private_key".to_string(),
				message: "exactly one of private_key, keystore_entry or keystore_path must be set"
					.to_string(),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.address.clone())
	}

	async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<Signature, AccountError> {
		let mut hasher = Blake2b256::new();
		hasher.update(TRANSACTION_INTENT);
		hasher.update(tx_bytes);
		let digest = hasher.finalize();

		let signature = self
			.key
			.try_sign(&digest)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;

		let mut serialized = Vec::with_capacity(1 + 64 + 32);
		serialized.push(ED25519_FLAG);
		serialized.extend_from_slice(&signature.to_bytes());
		serialized.extend_from_slice(&self.public_key());
		Ok(Signature(BASE64.encode(serialized)))
	}
}

/// Factory function to create a local account from configuration.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidConfig(e.to_string()))?;

	let get = |key: &str| config.get(key).and_then(|v| v.as_str());

	let account = if let Some(key) = get("private_key") {
		LocalAccount::from_hex(&SecretString::from(key))?
	} else if let Some(entry) = get("keystore_entry") {
		LocalAccount::from_keystore_entry(&SecretString::from(entry))?
	} else if let Some(path) = get("keystore_path") {
		LocalAccount::from_keystore_file(Path::new(path), get("address"))?
	} else {
		return Err(AccountError::InvalidConfig("No key source configured".into()));
	};

	tracing::debug!(address = %account.address, "Loaded local account");
	Ok(Box::new(account))
}

/// Registry for the local account implementation.
pub struct Registry;

impl relay_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}
