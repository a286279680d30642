use bastion::mac::{Alg, Family, MacEngine};

use hmac::Mac as _;
use rstest::rstest;
use sha2::Sha256;

fn key_for(alg: Alg) -> Vec<u8> {
    (0..alg.key_len() as u8).collect()
}

#[rstest]
#[case::sha1(Alg::HmacSha1, 20, false)]
#[case::sha1_96(Alg::HmacSha196, 12, false)]
#[case::sha2_256(Alg::HmacSha256, 32, false)]
#[case::sha2_512(Alg::HmacSha512, 64, false)]
#[case::md5(Alg::HmacMd5, 16, false)]
#[case::md5_96(Alg::HmacMd596, 12, false)]
#[case::umac_64(Alg::Umac64, 8, false)]
#[case::umac_128(Alg::Umac128, 16, false)]
#[case::sha1_etm(Alg::HmacSha1ETM, 20, true)]
#[case::sha1_96_etm(Alg::HmacSha196ETM, 12, true)]
#[case::sha2_256_etm(Alg::HmacSha256ETM, 32, true)]
#[case::sha2_512_etm(Alg::HmacSha512ETM, 64, true)]
#[case::md5_etm(Alg::HmacMd5ETM, 16, true)]
#[case::md5_96_etm(Alg::HmacMd596ETM, 12, true)]
#[case::umac_64_etm(Alg::Umac64ETM, 8, true)]
#[case::umac_128_etm(Alg::Umac128ETM, 16, true)]
fn tags_match_the_catalog(#[case] alg: Alg, #[case] len: usize, #[case] etm: bool) {
    let engine = MacEngine::new(alg, &key_for(alg)).expect("keyable algorithm");

    assert_eq!(alg.mac_len(), len);
    assert_eq!(alg.etm(), etm);
    assert_eq!(engine.compute(0x01020304, b"payload").len(), len);
}

#[test]
fn hmac_covers_the_sequence_number_then_the_data() {
    let key = key_for(Alg::HmacSha256);
    let engine = MacEngine::new(Alg::HmacSha256, &key).expect("keyable algorithm");

    let expected = hmac::Hmac::<Sha256>::new_from_slice(&key)
        .expect("any key size fits")
        .chain_update(0x01020304u32.to_be_bytes())
        .chain_update(b"")
        .finalize()
        .into_bytes();

    assert_eq!(engine.compute(0x01020304, b""), expected.to_vec());
}

#[test]
fn truncation_is_prefix_based() {
    let key = key_for(Alg::HmacSha1);

    let full = MacEngine::new(Alg::HmacSha1, &key).expect("keyable algorithm");
    let truncated = MacEngine::new(Alg::HmacSha196, &key).expect("keyable algorithm");

    assert_eq!(
        truncated.compute(7, b"data"),
        full.compute(7, b"data")[..12].to_vec(),
    );
}

#[rstest]
#[case::hmac(Alg::HmacSha512)]
#[case::hmac_truncated(Alg::HmacMd596)]
#[case::umac_64(Alg::Umac64)]
#[case::umac_128(Alg::Umac128)]
fn verification_roundtrips_and_catches_corruption(#[case] alg: Alg) {
    let engine = MacEngine::new(alg, &key_for(alg)).expect("keyable algorithm");

    let mut tag = engine.compute(42, b"some payload");
    assert!(engine.verify(42, b"some payload", &tag).is_ok());

    assert!(engine.verify(43, b"some payload", &tag).is_err());
    assert!(engine.verify(42, b"some payloae", &tag).is_err());

    tag[0] ^= 0x80;
    assert!(engine.verify(42, b"some payload", &tag).is_err());

    assert!(engine.verify(42, b"some payload", &tag[1..]).is_err());
}

#[test]
fn umac_nonce_tracks_the_sequence_number() {
    let engine = MacEngine::new(Alg::Umac64, &key_for(Alg::Umac64)).expect("keyable algorithm");

    assert_ne!(engine.compute(0, b"payload"), engine.compute(1, b"payload"));
    assert_eq!(engine.compute(5, b"payload"), engine.compute(5, b"payload"));
}

#[test]
fn families_partition_the_catalog() {
    assert_eq!(Alg::HmacSha256.family(), Family::Hmac);
    assert_eq!(Alg::Umac64ETM.family(), Family::Umac64);
    assert_eq!(Alg::Umac128.family(), Family::Umac128);
}
