use crate::utils::{increment_key, make_unique};

#[test]
fn test_increment_key_increments_last_byte() {
    assert_eq!(increment_key(b"node:abc"), b"node:abd".to_vec());
    assert_eq!(increment_key(b"node:"), b"node;".to_vec());
    assert_eq!(increment_key(b"node;"), b"node<".to_vec());
    assert_eq!(increment_key(b"x"), b"y".to_vec());
}

#[test]
fn test_increment_key_skips_trailing_0xff() {
    assert_eq!(increment_key(b"node\xFF;"), b"node\xFF<".to_vec());
    assert_eq!(increment_key(b"x\xFF"), b"y\xFF".to_vec());
}

#[test]
fn test_increment_key_extends_all_0xff_keys() {
    assert_eq!(increment_key(b"\xFF\xFF"), b"\xFF\xFF\x00".to_vec());
    assert_eq!(increment_key(b"\xFF"), b"\xFF\x00".to_vec());
}

#[test]
fn test_increment_key_bounds_the_prefix_range() {
    let keys: [&[u8]; 6] = [b"a", b"az", b"a\xFF", b"\x00", b"node:abc", b"\xFE\xFF"];
    for key in keys {
        let successor = increment_key(key);
        assert!(
            successor.as_slice() > key,
            "successor of {key:?} not greater"
        );
        // every string with the original prefix sorts strictly below
        // the successor, so [key, successor) is exactly the prefix
        // range
        let mut extended = key.to_vec();
        extended.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert!(
            extended.as_slice() < successor.as_slice(),
            "extension of {key:?} escapes the range"
        );
    }
}

#[test]
fn test_make_unique_keeps_first_occurrence_order() {
    let input = vec![
        b"b".to_vec(),
        b"a".to_vec(),
        b"b".to_vec(),
        b"c".to_vec(),
        b"a".to_vec(),
    ];
    assert_eq!(
        make_unique(input),
        vec![b"b".to_vec(), b"a".to_vec(), b"c".to_vec()]
    );
}
