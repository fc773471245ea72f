use std::collections::HashMap;

use vercre_didhcs::key::{self, Ed25519Signer};
use vercre_didhcs::provider::Signer;

/// Named Ed25519 signing keys, each with a pre-generated next key for
/// rotation.
#[derive(Clone, Debug)]
pub struct Keyring {
    keys: HashMap<String, Ed25519Signer>,
    next_keys: HashMap<String, Ed25519Signer>,
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring {
    /// Create a new keyring and add an owner key.
    #[must_use]
    pub fn new() -> Self {
        let mut kr = Self {
            keys: HashMap::new(),
            next_keys: HashMap::new(),
        };
        kr.add_key("owner");
        kr
    }

    /// Add a newly generated key to the keyring and corresponding next key.
    pub fn add_key(&mut self, id: impl ToString) {
        self.keys.insert(id.to_string(), Ed25519Signer::generate());
        self.next_keys.insert(id.to_string(), Ed25519Signer::generate());
    }

    /// Get the signer for a key, generating the key if it does not exist.
    pub fn signer(&mut self, id: impl ToString) -> Ed25519Signer {
        let id = id.to_string();
        if !self.keys.contains_key(&id) {
            self.add_key(&id);
        }
        self.keys[&id].clone()
    }

    /// Get the signer for the key that will replace `id` on rotation.
    #[must_use]
    pub fn next_signer(&self, id: impl ToString) -> Option<Ed25519Signer> {
        self.next_keys.get(&id.to_string()).cloned()
    }

    /// Get a public multibase key for a key in the keyring.
    pub fn multibase(&mut self, id: impl ToString) -> String {
        key::to_multibase(&self.signer(id).verifying_key())
    }

    /// Promote next keys to current keys and generate new next keys.
    pub fn rotate(&mut self) {
        for (id, next) in self.next_keys.drain() {
            self.keys.insert(id, next);
        }
        for id in self.keys.keys() {
            self.next_keys.insert(id.clone(), Ed25519Signer::generate());
        }
    }
}
