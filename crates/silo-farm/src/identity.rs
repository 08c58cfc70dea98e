use crate::FarmError;
use blst::min_pk::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;
use silo_core_primitives::{PublicKey, Signature};
use std::fs;
use std::path::Path;
use tracing::info;

const SECRET_KEY_LENGTH: usize = 32;

/// Farmer identity: a BLS keypair persisted next to the plots it encodes.
#[derive(Clone)]
pub struct Identity {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Open an existing identity file in `base_directory` or create a new
    /// one.
    pub fn open_or_create<B: AsRef<Path>>(base_directory: B) -> Result<Identity, FarmError> {
        let identity_file = base_directory.as_ref().join("identity.bin");
        let secret_key = if identity_file.exists() {
            info!("Opening existing identity");
            SecretKey::from_bytes(&fs::read(&identity_file)?)
                .map_err(|error| FarmError::Identity(format!("{error:?}")))?
        } else {
            info!("Generating new identity");
            let mut ikm = [0u8; SECRET_KEY_LENGTH];
            OsRng.fill_bytes(&mut ikm);
            let secret_key = SecretKey::key_gen(&ikm, &[])
                .map_err(|error| FarmError::Identity(format!("{error:?}")))?;
            fs::write(&identity_file, secret_key.to_bytes())?;
            secret_key
        };
        let public_key = PublicKey::from(secret_key.sk_to_pk().to_bytes());

        Ok(Identity {
            secret_key,
            public_key,
        })
    }

    /// Ephemeral identity that is never persisted; used by tests and tooling.
    pub fn generate() -> Identity {
        let mut ikm = [0u8; SECRET_KEY_LENGTH];
        OsRng.fill_bytes(&mut ikm);
        let secret_key =
            SecretKey::key_gen(&ikm, &[]).expect("32 bytes of entropy are sufficient ikm; qed");
        let public_key = PublicKey::from(secret_key.sk_to_pk().to_bytes());

        Identity {
            secret_key,
            public_key,
        }
    }

    /// Public side of the keypair.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Sign `data` under a domain separation `context`.
    pub fn sign(&self, data: &[u8], context: &[u8]) -> Signature {
        Signature::from(self.secret_key.sign(data, context, &[]).to_bytes())
    }
}
