//! Password hashing and hash-algorithm negotiation.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

/// Hash algorithms the client may pick to combine the pre-hashed password
/// with the server's salt. Order here is the negotiation preference order,
/// strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha512,
    Sha384,
    Sha256,
    Sha1,
}

const PREFERENCE_ORDER: [HashAlgo; 4] = [
    HashAlgo::Sha512,
    HashAlgo::Sha384,
    HashAlgo::Sha256,
    HashAlgo::Sha1,
];

impl HashAlgo {
    /// The name as it appears on the wire, both in the server's
    /// `supported_hashes` list and in the `{NAME}` marker of the
    /// authentication response line.
    pub fn mapi_name(self) -> &'static str {
        match self {
            HashAlgo::Sha512 => "SHA512",
            HashAlgo::Sha384 => "SHA384",
            HashAlgo::Sha256 => "SHA256",
            HashAlgo::Sha1 => "SHA1",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA512" => Some(HashAlgo::Sha512),
            "SHA384" => Some(HashAlgo::Sha384),
            "SHA256" => Some(HashAlgo::Sha256),
            "SHA1" => Some(HashAlgo::Sha1),
            _ => None,
        }
    }

    pub fn digest_hex(self, data: &[u8]) -> String {
        hex::encode(digest_bytes(self, data))
    }
}

fn digest_bytes(algo: HashAlgo, data: &[u8]) -> Vec<u8> {
    match algo {
        HashAlgo::Sha512 => Sha512::digest(data).to_vec(),
        HashAlgo::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgo::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgo::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(data);
            hasher.finalize().to_vec()
        }
    }
}

/// Hashes `data` with the named algorithm (used for the server's
/// `password_hash_algo`, which may not be one the client would itself pick
/// for the outer hash). Returns hex-encoded lowercase digest bytes as the
/// raw bytes, matching `HashAlgo::digest_hex`'s hex output when the caller
/// re-encodes; kept separate because the pre-hash step needs the raw bytes
/// concatenated with the salt, not the hex string.
pub fn digest_by_name(name: &str, data: &[u8]) -> MapiResult<Vec<u8>> {
    let algo = HashAlgo::from_name(name)
        .ok_or_else(|| MapiError::Auth(format!("unsupported password hash algorithm {}", name)))?;
    Ok(digest_bytes(algo, data))
}

/// Intersects the server's offered hash names with the user's configured
/// subset (if any), then picks the strongest available per
/// `PREFERENCE_ORDER`. An empty user subset means "no restriction".
pub fn choose_hash_algo(
    server_supported: &[String],
    user_allowed: Option<&[String]>,
) -> MapiResult<HashAlgo> {
    let server_set: Vec<HashAlgo> = server_supported
        .iter()
        .filter_map(|name| HashAlgo::from_name(name))
        .collect();

    let allowed: Option<Vec<HashAlgo>> =
        user_allowed.map(|names| names.iter().filter_map(|n| HashAlgo::from_name(n)).collect());

    for candidate in PREFERENCE_ORDER {
        if !server_set.contains(&candidate) {
            continue;
        }
        if let Some(allowed) = &allowed {
            if !allowed.contains(&candidate) {
                continue;
            }
        }
        return Ok(candidate);
    }

    Err(MapiError::Auth(
        "no hash algorithm in common with the server".into(),
    ))
}

/// Computes the final authentication response hash: `H_chosen(pre || salt)`
/// where `pre = hex(H_passwd(utf8(password)))`.
pub fn compute_response_hash(
    password: &str,
    password_hash_algo: &str,
    chosen: HashAlgo,
    salt: &str,
) -> MapiResult<String> {
    let pre = hex::encode(digest_by_name(password_hash_algo, password.as_bytes())?);
    let mut combined = pre.into_bytes();
    combined.extend_from_slice(salt.as_bytes());
    Ok(chosen.digest_hex(&combined))
}
