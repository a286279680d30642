//! The UMAC universal-hashing MAC, in its 64-bit and 128-bit tag variants.
//!
//! The construction stretches a 128-bit key with AES into the layer keys,
//! hashes the message through an NH layer, a polynomial layer over
//! 2^64 - 59 and an inner-product layer over 2^36 - 5, then masks the
//! result with an AES pad derived from the per-packet nonce.
//!
//! Only the 64-bit polynomial ramp is implemented, which bounds messages
//! to well under 2^24 bytes; transports cap packets far below that.

use aes::Aes128;
use cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bytes of message hashed by one NH pass.
const L1_KEY_LEN: usize = 1024;

/// Key bytes separating two NH streams.
const L1_KEY_SHIFT: usize = 16;

/// NH inputs are zero-padded to a multiple of this.
const L1_PAD_BOUNDARY: usize = 32;

/// 2^36 - 5.
const P36: u64 = 0x0000_000F_FFFF_FFFB;

/// 2^64 - 59.
const P64: u64 = 0xFFFF_FFFF_FFFF_FFC5;

/// Mask keeping polynomial keys in range.
const POLY_KEY_MASK: u64 = 0x01FF_FFFF_01FF_FFFF;

/// Low 36 bits.
const M36: u64 = 0x0000_000F_FFFF_FFFF;

fn be32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be64(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// The AES key-derivation, each index yielding an independent byte stream.
fn kdf(cipher: &Aes128, index: u8, nbytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(nbytes + 16);
    let mut counter = 1u64;

    while out.len() < nbytes {
        let mut block = [0u8; 16];
        block[7] = index;
        block[8..].copy_from_slice(&counter.to_be_bytes());

        let mut block = GenericArray::from(block);
        cipher.encrypt_block(&mut block);

        out.extend_from_slice(&block);
        counter += 1;
    }

    out.truncate(nbytes);
    out
}

fn poly64(accum: u64, key: u64, word: u64) -> u64 {
    ((u128::from(accum) * u128::from(key) + u128::from(word)) % u128::from(P64)) as u64
}

/// One polynomial step; words at the top of the range are split in two so
/// every processed value stays below 2^64 - 2^32.
fn poly_step(accum: u64, key: u64, word: u64) -> u64 {
    if word >> 32 == 0xFFFF_FFFF {
        let accum = poly64(accum, key, P64 - 1);
        poly64(accum, key, word.wrapping_sub(59))
    } else {
        poly64(accum, key, word)
    }
}

fn ip_reduce(t: u64) -> u32 {
    let mut r = (t & M36) + 5 * (t >> 36);
    if r >= P36 {
        r -= P36;
    }

    r as u32
}

/// The derived subkeys of a UMAC instance, 2 hash streams for 64-bit tags
/// and 4 for 128-bit ones.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(super) struct UmacKeys {
    streams: usize,
    nh_key: Vec<u32>,
    poly_key: Vec<u64>,
    ip_key: Vec<u64>,
    ip_trans: Vec<u32>,
    pdf_key: [u8; 16],
}

impl UmacKeys {
    /// Stretch a 16-byte key into the layer subkeys.
    pub fn derive(key: &[u8], streams: usize) -> Self {
        let cipher = Aes128::new(GenericArray::from_slice(key));

        let mut nh_bytes = kdf(&cipher, 1, L1_KEY_LEN + L1_KEY_SHIFT * (streams - 1));
        let nh_key = nh_bytes.chunks_exact(4).map(be32).collect();

        let mut poly_bytes = kdf(&cipher, 2, 24 * streams);
        let poly_key = (0..streams)
            .map(|stream| be64(&poly_bytes[24 * stream..]) & POLY_KEY_MASK)
            .collect();

        let mut ip_bytes = kdf(&cipher, 3, 8 * 4 * streams);
        let ip_key = ip_bytes.chunks_exact(8).map(|word| be64(word) % P36).collect();

        let mut trans_bytes = kdf(&cipher, 4, 4 * streams);
        let ip_trans = trans_bytes.chunks_exact(4).map(be32).collect();

        let mut pdf_key = [0u8; 16];
        pdf_key.copy_from_slice(&kdf(&cipher, 0, 16));

        nh_bytes.zeroize();
        poly_bytes.zeroize();
        ip_bytes.zeroize();
        trans_bytes.zeroize();

        Self {
            streams,
            nh_key,
            poly_key,
            ip_key,
            ip_trans,
            pdf_key,
        }
    }

    /// Tag `data` under the per-packet `nonce`, yielding 4 bytes per stream.
    pub fn tag(&self, data: &[u8], nonce: [u8; 8]) -> Vec<u8> {
        let mut tag = self.uhash(data);

        for (byte, pad) in tag.iter_mut().zip(self.pdf(nonce)) {
            *byte ^= pad;
        }

        tag
    }

    fn uhash(&self, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; self.streams * 4];
        let mut nh = vec![0u64; self.streams];

        if data.len() <= L1_KEY_LEN {
            self.nh(data, &mut nh);

            for (stream, value) in nh.iter().enumerate() {
                let hashed = self.ip(stream, *value);
                out[stream * 4..][..4].copy_from_slice(&hashed.to_be_bytes());
            }
        } else {
            let mut poly = vec![1u64; self.streams];

            for chunk in data.chunks(L1_KEY_LEN) {
                self.nh(chunk, &mut nh);

                for (accum, (key, value)) in
                    poly.iter_mut().zip(self.poly_key.iter().zip(&nh))
                {
                    *accum = poly_step(*accum, *key, *value);
                }
            }

            for (stream, value) in poly.iter().enumerate() {
                let hashed = self.ip(stream, *value);
                out[stream * 4..][..4].copy_from_slice(&hashed.to_be_bytes());
            }
        }

        out
    }

    /// The NH pass over a single chunk, little-endian message words combined
    /// with the stream-shifted key words, plus the chunk bit length.
    fn nh(&self, chunk: &[u8], out: &mut [u64]) {
        let padded = chunk.len().max(1).next_multiple_of(L1_PAD_BOUNDARY);
        let mut words = vec![0u32; padded / 4];

        for (index, byte) in chunk.iter().enumerate() {
            words[index / 4] |= u32::from(*byte) << (8 * (index % 4));
        }

        let bits = 8 * chunk.len() as u64;

        for (stream, out) in out.iter_mut().enumerate() {
            let key = &self.nh_key[stream * (L1_KEY_SHIFT / 4)..];
            let mut accum = 0u64;

            for group in (0..words.len()).step_by(8) {
                for lane in 0..4 {
                    accum = accum.wrapping_add(
                        u64::from(words[group + lane].wrapping_add(key[group + lane]))
                            * u64::from(
                                words[group + lane + 4].wrapping_add(key[group + lane + 4]),
                            ),
                    );
                }
            }

            *out = accum.wrapping_add(bits);
        }

        words.zeroize();
    }

    /// The inner-product pass, folding a 64-bit value down to 32 bits.
    fn ip(&self, stream: usize, value: u64) -> u32 {
        let key = &self.ip_key[stream * 4..][..4];

        let t = key[0] * u64::from((value >> 48) as u16)
            + key[1] * u64::from((value >> 32) as u16)
            + key[2] * u64::from((value >> 16) as u16)
            + key[3] * u64::from(value as u16);

        ip_reduce(t) ^ self.ip_trans[stream]
    }

    /// The pad derivation; 64-bit tags use the low nonce bit to select a
    /// half of the AES block, 128-bit tags consume the whole block.
    fn pdf(&self, mut nonce: [u8; 8]) -> Vec<u8> {
        let cipher = Aes128::new(GenericArray::from_slice(&self.pdf_key));
        let taglen = self.streams * 4;

        let index = if taglen == 8 {
            let index = usize::from(nonce[7] & 1);
            nonce[7] &= !1;

            index
        } else {
            0
        };

        let mut block = [0u8; 16];
        block[..8].copy_from_slice(&nonce);

        let mut block = GenericArray::from(block);
        cipher.encrypt_block(&mut block);

        block[index * taglen..][..taglen].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const KEY: &[u8; 16] = b"abcdefghijklmnop";
    const NONCE: [u8; 8] = *b"bcdefghi";

    #[rstest]
    #[case::umac64(2, 8)]
    #[case::umac128(4, 16)]
    fn tags_have_the_stream_length(#[case] streams: usize, #[case] len: usize) {
        let keys = UmacKeys::derive(KEY, streams);

        for size in [0, 1, 31, 32, 33, 1023, 1024, 1025, 4096, 5000] {
            assert_eq!(keys.tag(&vec![0xa5; size], NONCE).len(), len);
        }
    }

    #[test]
    fn tags_are_deterministic() {
        let keys = UmacKeys::derive(KEY, 2);
        let message = b"'a' * 64";

        assert_eq!(keys.tag(message, NONCE), keys.tag(message, NONCE));
    }

    #[test]
    fn tags_differ_across_nonces() {
        let keys = UmacKeys::derive(KEY, 2);

        assert_ne!(keys.tag(b"message", NONCE), keys.tag(b"message", *b"bcdefghj"));
    }

    #[test]
    fn tags_differ_across_keys() {
        let keys = UmacKeys::derive(KEY, 2);
        let other = UmacKeys::derive(b"ponmlkjihgfedcba", 2);

        assert_ne!(keys.tag(b"message", NONCE), other.tag(b"message", NONCE));
    }

    #[test]
    fn tags_differ_across_messages_crossing_the_nh_boundary() {
        let keys = UmacKeys::derive(KEY, 4);

        let short = vec![0u8; L1_KEY_LEN];
        let long = vec![0u8; L1_KEY_LEN + 1];

        assert_ne!(keys.tag(&short, NONCE), keys.tag(&long, NONCE));
    }

    #[test]
    fn zero_padding_is_not_confused_with_explicit_zeroes() {
        let keys = UmacKeys::derive(KEY, 2);

        assert_ne!(keys.tag(&[0u8; 3], NONCE), keys.tag(&[0u8; 4], NONCE));
    }
}
