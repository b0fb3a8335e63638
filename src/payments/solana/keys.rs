//! Public keys, keypairs and program-derived addresses

use base64::{engine::general_purpose::STANDARD, Engine as _};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signer, SigningKey};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::config::{AppConfig, PaymentsSection};
use crate::payments::PaymentError;

/// 32-byte account address, base58 on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the bytes decode to a point on the ed25519 curve
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Address for `seeds` plus a bump byte, rejected when it lands on the curve
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<Pubkey> {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.as_bytes());
        hasher.update(b"ProgramDerivedAddress");
        let candidate = Pubkey(hasher.finalize().into());
        (!candidate.is_on_curve()).then_some(candidate)
    }

    /// First off-curve address searching bumps from 255 down to 1
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
        for bump in bump_seeds() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            if let Some(address) = Self::create_program_address(&with_bump, program_id) {
                return Some((address, bump));
            }
        }
        None
    }
}

/// Bump bytes in search order; 0 is never a valid bump on chain
fn bump_seeds() -> impl Iterator<Item = u8> {
    (1..=u8::MAX).rev()
}

impl FromStr for Pubkey {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| PaymentError::InvalidPubkey(format!("{s}: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PaymentError::InvalidPubkey(format!("{s}: expected 32 bytes")))?;
        Ok(Pubkey(bytes))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({self})")
    }
}

fn known(address: &str) -> Pubkey {
    Pubkey::from_str(address).unwrap_or_default()
}

pub static SYSTEM_PROGRAM_ID: Lazy<Pubkey> = Lazy::new(|| Pubkey([0u8; 32]));
pub static TOKEN_PROGRAM_ID: Lazy<Pubkey> =
    Lazy::new(|| known("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"));
pub static ASSOCIATED_TOKEN_PROGRAM_ID: Lazy<Pubkey> =
    Lazy::new(|| known("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"));

/// Associated token account of `owner` for `mint`
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Option<Pubkey> {
    Pubkey::find_program_address(
        &[owner.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _)| address)
}

/// ed25519 keypair in the 64-byte secret+public layout
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Build from the 64-byte layout; the public half must match the secret
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PaymentError> {
        let bytes: &[u8; 64] = bytes
            .try_into()
            .map_err(|_| PaymentError::Keypair(format!("expected 64 bytes, got {}", bytes.len())))?;
        let signing = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| PaymentError::Keypair(e.to_string()))?;
        Ok(Self { signing })
    }

    /// Parse a JSON array of 64 numbers
    pub fn from_json(json: &str) -> Result<Self, PaymentError> {
        let bytes: Vec<u8> = serde_json::from_str(json)
            .map_err(|e| PaymentError::Keypair(format!("invalid keypair JSON: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing.to_keypair_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// Load the treasury keypair: JSON env var, then base64 env var, then file
pub fn load_treasury_keypair(payments: &PaymentsSection) -> Result<Keypair, PaymentError> {
    if let Some(json) = AppConfig::env_optional(&payments.keypair_json_env) {
        debug!(source = %payments.keypair_json_env, "Loading treasury keypair");
        return Keypair::from_json(&json);
    }

    if let Some(b64) = AppConfig::env_optional(&payments.keypair_b64_env) {
        debug!(source = %payments.keypair_b64_env, "Loading treasury keypair");
        let raw = STANDARD
            .decode(b64.trim())
            .map_err(|e| PaymentError::Keypair(format!("invalid base64: {e}")))?;
        let json = String::from_utf8(raw)
            .map_err(|e| PaymentError::Keypair(format!("invalid UTF-8: {e}")))?;
        return Keypair::from_json(&json);
    }

    load_keypair_file(&payments.keypair_path)
}

/// Read a keypair file; relative paths resolve against the working directory
pub fn load_keypair_file(path: &Path) -> Result<Keypair, PaymentError> {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| PaymentError::Keypair(e.to_string()))?
            .join(path)
    };
    let raw = std::fs::read_to_string(&absolute).map_err(|e| {
        PaymentError::Keypair(format!("cannot read {}: {e}", absolute.display()))
    })?;
    Keypair::from_json(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn keypair_json(keypair: &Keypair) -> String {
        serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_system_program_is_all_ones() {
        assert_eq!(SYSTEM_PROGRAM_ID.to_string(), "11111111111111111111111111111111");
        let parsed = Pubkey::from_str("11111111111111111111111111111111").unwrap();
        assert_eq!(parsed, *SYSTEM_PROGRAM_ID);
    }

    #[test]
    fn test_program_ids_parse() {
        assert_ne!(*TOKEN_PROGRAM_ID, Pubkey::default());
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
            "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        );
    }

    #[test]
    fn test_invalid_pubkeys() {
        assert!(Pubkey::from_str("not-base58-0OIl").is_err());
        assert!(Pubkey::from_str("abc").is_err());
    }

    #[test]
    fn test_keypair_pubkey_is_on_curve() {
        let keypair = Keypair::from_secret(&[7u8; 32]);
        assert!(keypair.pubkey().is_on_curve());
    }

    #[test]
    fn test_associated_token_address_is_off_curve_and_stable() {
        let owner = Keypair::from_secret(&[1u8; 32]).pubkey();
        let mint = Pubkey::from_str("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU").unwrap();

        let first = associated_token_address(&owner, &mint).unwrap();
        let second = associated_token_address(&owner, &mint).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_on_curve());

        let other_owner = Keypair::from_secret(&[2u8; 32]).pubkey();
        assert_ne!(associated_token_address(&other_owner, &mint).unwrap(), first);
    }

    #[test]
    fn test_bump_search_stops_at_one() {
        let bumps: Vec<u8> = bump_seeds().collect();
        assert_eq!(bumps.len(), 255);
        assert_eq!(bumps.first(), Some(&255));
        assert_eq!(bumps.last(), Some(&1));

        let seed: &[u8] = b"agenx";
        let (address, bump) = Pubkey::find_program_address(&[seed], &SYSTEM_PROGRAM_ID).unwrap();
        assert!(bump >= 1);
        let bump_seed = [bump];
        assert_eq!(
            Pubkey::create_program_address(&[seed, &bump_seed], &SYSTEM_PROGRAM_ID),
            Some(address)
        );
    }

    #[test]
    fn test_keypair_json_and_mismatch() {
        let keypair = Keypair::from_secret(&[9u8; 32]);
        let restored = Keypair::from_json(&keypair_json(&keypair)).unwrap();
        assert_eq!(restored.pubkey(), keypair.pubkey());

        let mut bytes = keypair.to_bytes();
        bytes[40] ^= 0xff;
        assert!(Keypair::from_bytes(&bytes).is_err());
        assert!(Keypair::from_bytes(&bytes[..32]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let keypair = Keypair::from_secret(&[3u8; 32]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(keypair_json(&keypair).as_bytes()).unwrap();

        let payments = PaymentsSection {
            keypair_json_env: "AGENX_TEST_UNSET_KP_JSON".to_string(),
            keypair_b64_env: "AGENX_TEST_UNSET_KP_B64".to_string(),
            keypair_path: file.path().to_path_buf(),
            ..Default::default()
        };
        let loaded = load_treasury_keypair(&payments).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let payments = PaymentsSection {
            keypair_json_env: "AGENX_TEST_UNSET_KP_JSON".to_string(),
            keypair_b64_env: "AGENX_TEST_UNSET_KP_B64".to_string(),
            keypair_path: PathBuf::from("definitely/missing/wallet.json"),
            ..Default::default()
        };
        let err = load_treasury_keypair(&payments).unwrap_err();
        assert!(err.to_string().contains("wallet.json"));
    }
}
