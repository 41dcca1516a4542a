use crate::conversion::{
    BinaryValue, read_f64_le, read_i64_le, read_u32_le, read_u64_le, to_key_frames,
};
use crate::error::YakDbError;

#[test]
fn test_u32_packs_to_four_little_endian_bytes() {
    assert_eq!(
        BinaryValue::U32(0xDEADBEEF).to_bytes(),
        vec![0xEF, 0xBE, 0xAD, 0xDE]
    );
    assert_eq!(BinaryValue::U32(1).to_bytes(), vec![1, 0, 0, 0]);
}

#[test]
fn test_u32_round_trip() {
    for value in [0u32, 1, 0x1234, u32::MAX] {
        let bytes = BinaryValue::U32(value).to_bytes();
        assert_eq!(read_u32_le(&bytes).unwrap(), value);
    }
}

#[test]
fn test_i64_round_trip() {
    for value in [0i64, 1, -1, i64::MIN, i64::MAX] {
        let bytes = BinaryValue::I64(value).to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(read_i64_le(&bytes).unwrap(), value);
    }
}

#[test]
fn test_f64_round_trip() {
    for value in [0.0f64, 1.5, -2.25, f64::MAX] {
        let bytes = BinaryValue::F64(value).to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(read_f64_le(&bytes).unwrap(), value);
    }
}

#[test]
fn test_text_is_utf8_encoded() {
    assert_eq!(
        BinaryValue::from("grüße").to_bytes(),
        "grüße".as_bytes().to_vec()
    );
}

#[test]
fn test_bytes_pass_through_unchanged() {
    let raw = vec![0x00, 0xFF, 0x1E, 0x31];
    assert_eq!(BinaryValue::Bytes(raw.clone()).to_bytes(), raw);
}

#[test]
fn test_empty_key_material_is_rejected() {
    assert!(matches!(
        BinaryValue::from("").to_key_bytes(),
        Err(YakDbError::Parameter(_))
    ));
    assert!(matches!(
        BinaryValue::Bytes(Vec::new()).to_key_bytes(),
        Err(YakDbError::Parameter(_))
    ));
    // non-empty keys are fine
    assert_eq!(BinaryValue::from("a").to_key_bytes().unwrap(), b"a".to_vec());
}

#[test]
fn test_key_frame_conversion_propagates_rejection() {
    let keys = vec![BinaryValue::from("a"), BinaryValue::from("")];
    assert!(matches!(
        to_key_frames(&keys),
        Err(YakDbError::Parameter(_))
    ));
    let keys = vec![BinaryValue::from("a"), BinaryValue::U32(7)];
    assert_eq!(
        to_key_frames(&keys).unwrap(),
        vec![b"a".to_vec(), vec![7, 0, 0, 0]]
    );
}

#[test]
fn test_integer_frames_reject_wrong_length() {
    assert!(matches!(
        read_u64_le(&[1, 2, 3]),
        Err(YakDbError::Protocol(_))
    ));
    assert!(matches!(
        read_u32_le(&[1, 2, 3, 4, 5]),
        Err(YakDbError::Protocol(_))
    ));
    assert!(matches!(read_i64_le(&[]), Err(YakDbError::Protocol(_))));
}
