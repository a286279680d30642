//! MAC algorithm catalog and the per-packet computation engine.

use digest::OutputSizeUser;
use md5::Md5;
use secrecy::{ExposeSecret, SecretBox};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use strum::{AsRefStr, EnumIter, EnumString};

use crate::{Error, Result};

mod umac;
use umac::UmacKeys;

/// Upper bound on the staging buffer a transport must provide for a tag.
pub const DIGEST_LEN_MAX: usize = 64;

/// The computation family backing a MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// A keyed-hash construction over one of the digest algorithms.
    Hmac,

    /// The 64-bit universal-hashing construction.
    Umac64,

    /// The 128-bit universal-hashing construction.
    Umac128,
}

/// SSH MAC algorithms.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Alg {
    /// HMAC with sha-1 digest.
    HmacSha1,

    /// HMAC with sha-1 digest, truncated to 96 bits.
    #[strum(serialize = "hmac-sha1-96")]
    HmacSha196,

    /// HMAC with sha-2-256 digest.
    #[strum(serialize = "hmac-sha2-256")]
    HmacSha256,

    /// HMAC with sha-2-512 digest.
    #[strum(serialize = "hmac-sha2-512")]
    HmacSha512,

    /// HMAC with md5 digest.
    HmacMd5,

    /// HMAC with md5 digest, truncated to 96 bits.
    #[strum(serialize = "hmac-md5-96")]
    HmacMd596,

    /// UMAC with a 64-bit tag.
    #[strum(serialize = "umac-64@openssh.com")]
    Umac64,

    /// UMAC with a 128-bit tag.
    #[strum(serialize = "umac-128@openssh.com")]
    Umac128,

    /// HMAC with sha-1 digest on encrypted message.
    #[strum(serialize = "hmac-sha1-etm@openssh.com")]
    HmacSha1ETM,

    /// HMAC with sha-1 digest, truncated to 96 bits, on encrypted message.
    #[strum(serialize = "hmac-sha1-96-etm@openssh.com")]
    HmacSha196ETM,

    /// HMAC with sha-2-256 digest on encrypted message.
    #[strum(serialize = "hmac-sha2-256-etm@openssh.com")]
    HmacSha256ETM,

    /// HMAC with sha-2-512 digest on encrypted message.
    #[strum(serialize = "hmac-sha2-512-etm@openssh.com")]
    HmacSha512ETM,

    /// HMAC with md5 digest on encrypted message.
    #[strum(serialize = "hmac-md5-etm@openssh.com")]
    HmacMd5ETM,

    /// HMAC with md5 digest, truncated to 96 bits, on encrypted message.
    #[strum(serialize = "hmac-md5-96-etm@openssh.com")]
    HmacMd596ETM,

    /// UMAC with a 64-bit tag on encrypted message.
    #[strum(serialize = "umac-64-etm@openssh.com")]
    Umac64ETM,

    /// UMAC with a 128-bit tag on encrypted message.
    #[strum(serialize = "umac-128-etm@openssh.com")]
    Umac128ETM,
}

impl Alg {
    /// Resolve an algorithm name from the catalog.
    pub fn lookup(name: &str) -> Result<Self> {
        name.parse().map_err(|_| Error::UnknownMac(name.into()))
    }

    /// Check that every name in a comma-separated list is in the catalog.
    pub fn valid_namelist(names: &str) -> bool {
        !names.is_empty() && names.split(',').all(|name| Self::lookup(name).is_ok())
    }

    /// The computation family of the algorithm.
    pub fn family(&self) -> Family {
        match self {
            Self::Umac64 | Self::Umac64ETM => Family::Umac64,
            Self::Umac128 | Self::Umac128ETM => Family::Umac128,
            _ => Family::Hmac,
        }
    }

    /// Key length, in bits.
    pub fn key_bits(&self) -> u32 {
        match self.family() {
            Family::Umac64 | Family::Umac128 => 128,
            Family::Hmac => self.out_bits(),
        }
    }

    /// Natural output length, in bits, before truncation.
    pub fn out_bits(&self) -> u32 {
        match self {
            Self::HmacSha1 | Self::HmacSha196 | Self::HmacSha1ETM | Self::HmacSha196ETM => {
                8 * Sha1::output_size() as u32
            }
            Self::HmacSha256 | Self::HmacSha256ETM => 8 * Sha256::output_size() as u32,
            Self::HmacSha512 | Self::HmacSha512ETM => 8 * Sha512::output_size() as u32,
            Self::HmacMd5 | Self::HmacMd596 | Self::HmacMd5ETM | Self::HmacMd596ETM => {
                8 * Md5::output_size() as u32
            }
            Self::Umac64 | Self::Umac64ETM => 64,
            Self::Umac128 | Self::Umac128ETM => 128,
        }
    }

    /// Truncation applied to the output, in bits, `0` meaning none.
    pub fn truncate_bits(&self) -> u32 {
        match self {
            Self::HmacSha196 | Self::HmacSha196ETM | Self::HmacMd596 | Self::HmacMd596ETM => 96,
            _ => 0,
        }
    }

    /// Whether the tag is computed over the encrypted packet.
    pub fn etm(&self) -> bool {
        matches!(
            self,
            Self::HmacSha1ETM
                | Self::HmacSha196ETM
                | Self::HmacSha256ETM
                | Self::HmacSha512ETM
                | Self::HmacMd5ETM
                | Self::HmacMd596ETM
                | Self::Umac64ETM
                | Self::Umac128ETM
        )
    }

    /// Key length, in bytes.
    pub fn key_len(&self) -> usize {
        self.key_bits() as usize / 8
    }

    /// Effective tag length, in bytes, truncation applied.
    pub fn mac_len(&self) -> usize {
        match self.truncate_bits() {
            0 => self.out_bits() as usize / 8,
            bits => bits as usize / 8,
        }
    }
}

/// A keyed MAC for one direction of a session.
///
/// Dropping the engine zeroizes the key material and the derived subkeys.
pub struct MacEngine {
    alg: Alg,
    key: SecretBox<Vec<u8>>,
    umac: Option<UmacKeys>,
}

impl std::fmt::Debug for MacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacEngine").field("alg", &self.alg).finish()
    }
}

impl MacEngine {
    /// Bind a key to an algorithm of the catalog.
    pub fn new(alg: Alg, key: &[u8]) -> Result<Self> {
        if alg.mac_len() > DIGEST_LEN_MAX {
            return Err(Error::Internal("tag length over the staging bound"));
        }
        if key.len() < alg.key_len() {
            return Err(Error::InvalidMacKey);
        }

        let key = key[..alg.key_len()].to_vec();
        let umac = match alg.family() {
            Family::Hmac => None,
            Family::Umac64 => Some(UmacKeys::derive(&key, 2)),
            Family::Umac128 => Some(UmacKeys::derive(&key, 4)),
        };

        Ok(Self {
            alg,
            key: SecretBox::new(Box::new(key)),
            umac,
        })
    }

    /// The algorithm the key is bound to.
    pub fn alg(&self) -> Alg {
        self.alg
    }

    /// Effective tag length, in bytes.
    pub fn mac_len(&self) -> usize {
        self.alg.mac_len()
    }

    /// Compute the tag protecting `data` at position `seqno` of the stream.
    pub fn compute(&self, seqno: u32, data: &[u8]) -> Vec<u8> {
        fn sign<D: digest::Mac + digest::KeyInit>(seqno: u32, data: &[u8], key: &[u8]) -> Vec<u8> {
            <D as digest::Mac>::new_from_slice(key)
                .expect("Key derivation failed horribly")
                .chain_update(seqno.to_be_bytes())
                .chain_update(data)
                .finalize()
                .into_bytes()
                .to_vec()
        }

        let key = self.key.expose_secret();
        let mut tag = match self.alg {
            Alg::HmacSha1 | Alg::HmacSha196 | Alg::HmacSha1ETM | Alg::HmacSha196ETM => {
                sign::<hmac::Hmac<Sha1>>(seqno, data, key)
            }
            Alg::HmacSha256 | Alg::HmacSha256ETM => sign::<hmac::Hmac<Sha256>>(seqno, data, key),
            Alg::HmacSha512 | Alg::HmacSha512ETM => sign::<hmac::Hmac<Sha512>>(seqno, data, key),
            Alg::HmacMd5 | Alg::HmacMd596 | Alg::HmacMd5ETM | Alg::HmacMd596ETM => {
                sign::<hmac::Hmac<Md5>>(seqno, data, key)
            }
            Alg::Umac64 | Alg::Umac64ETM | Alg::Umac128 | Alg::Umac128ETM => {
                let mut nonce = [0u8; 8];
                nonce.copy_from_slice(&u64::from(seqno).to_be_bytes());

                self.umac
                    .as_ref()
                    .expect("subkeys are derived at construction")
                    .tag(data, nonce)
            }
        };

        tag.truncate(self.alg.mac_len());
        tag
    }

    /// Verify a received tag against the one expected for `data` at `seqno`.
    pub fn verify(&self, seqno: u32, data: &[u8], tag: &[u8]) -> Result<(), digest::MacError> {
        let expected = self.compute(seqno, data);

        if expected.len() != tag.len() {
            return Err(digest::MacError);
        }

        let diff = expected
            .iter()
            .zip(tag)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if diff == 0 {
            Ok(())
        } else {
            Err(digest::MacError)
        }
    }
}
