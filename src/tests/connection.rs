use std::rc::Rc;

use crate::connection::{Connection, ScanOptions, TableOpenOptions};
use crate::conversion::BinaryValue;
use crate::enums::{CompressionMode, MergeOperator, RequestType, SocketRole};
use crate::error::YakDbError;
use crate::tests::harness::{MockContext, ack, connected, header, queue_reply, sent_messages};

fn keys(names: &[&str]) -> Vec<BinaryValue> {
    names.iter().map(|name| BinaryValue::from(*name)).collect()
}

#[test]
fn test_connect_materializes_request_reply_role() {
    let (conn, state) = connected();
    assert_eq!(conn.role(), Some(SocketRole::RequestReply));
    assert_eq!(conn.endpoint_count(), 1);
    assert_eq!(state.borrow().endpoints, vec![crate::DEFAULT_ENDPOINT]);
}

#[test]
fn test_unconnected_connection_refuses_requests() {
    let context = MockContext::default();
    let state = Rc::clone(&context.state);
    let mut conn = Connection::new(context);
    let result = conn.read(1, &keys(&["a"]));
    assert!(matches!(result, Err(YakDbError::ConnectionState(_))));
    assert!(state.borrow().sent.is_empty());
}

#[test]
fn test_reply_verbs_require_a_single_peer() {
    let (mut conn, state) = connected();
    conn.connect("tcp://localhost:7102").unwrap();
    let result = conn.read(1, &keys(&["a"]));
    assert!(matches!(result, Err(YakDbError::ConnectionState(_))));
    // the precondition fired before anything hit the socket
    assert!(state.borrow().sent.is_empty());
}

#[test]
fn test_push_role_rejects_request_reply_verbs() {
    let context = MockContext::default();
    let state = Rc::clone(&context.state);
    let mut conn = Connection::new(context);
    conn.use_push_mode().unwrap();
    conn.connect(crate::DEFAULT_PUSH_ENDPOINT).unwrap();
    let result = conn.scan(1, &ScanOptions::default());
    assert!(matches!(result, Err(YakDbError::ConnectionState(_))));
    assert!(state.borrow().sent.is_empty());
}

#[test]
fn test_read_framing_and_absent_keys() {
    let (mut conn, state) = connected();
    // scenario: table 1 holds a=1, b=2; c is absent and comes back as
    // an empty frame
    queue_reply(
        &state,
        vec![
            header(RequestType::Read, 0x00),
            b"1".to_vec(),
            b"2".to_vec(),
            Vec::new(),
        ],
    );
    let values = conn.read(1, &keys(&["a", "b", "c"])).unwrap();
    assert_eq!(
        values,
        vec![b"1".to_vec(), b"2".to_vec(), Vec::new()]
    );
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x10, 0x00],
            vec![1, 0, 0, 0],
            b"a".to_vec(),
            b"b".to_vec(),
            b"c".to_vec(),
        ]
    );
}

#[test]
fn test_read_map_keys_values_by_input_key() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![header(RequestType::Read, 0x00), b"1".to_vec(), Vec::new()],
    );
    let map = conn.read_map(1, &keys(&["a", "b"])).unwrap();
    assert_eq!(map.get(b"a".as_slice()), Some(&b"1".to_vec()));
    assert_eq!(map.get(b"b".as_slice()), Some(&Vec::new()));
}

#[test]
fn test_put_framing_with_write_flags() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::Put));
    conn.put(
        1,
        &[
            (BinaryValue::from("a"), BinaryValue::from("1")),
            (BinaryValue::from("b"), BinaryValue::from("2")),
        ],
        true,
        true,
    )
    .unwrap();
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x20, 0x03],
            vec![1, 0, 0, 0],
            b"a".to_vec(),
            b"1".to_vec(),
            b"b".to_vec(),
            b"2".to_vec(),
        ]
    );
}

#[test]
fn test_put_with_empty_input_is_a_no_op() {
    let (mut conn, state) = connected();
    conn.put(1, &[], false, false).unwrap();
    assert!(state.borrow().sent.is_empty());
    assert!(state.borrow().replies.is_empty());
}

#[test]
fn test_put_rejects_empty_keys_before_sending() {
    let (mut conn, state) = connected();
    let result = conn.put(
        1,
        &[(BinaryValue::from(""), BinaryValue::from("v"))],
        false,
        false,
    );
    assert!(matches!(result, Err(YakDbError::Parameter(_))));
    assert!(state.borrow().sent.is_empty());
}

#[test]
fn test_put_on_push_socket_consumes_no_reply() {
    let context = MockContext::default();
    let state = Rc::clone(&context.state);
    let mut conn = Connection::new(context);
    conn.use_push_mode().unwrap();
    conn.connect(crate::DEFAULT_PUSH_ENDPOINT).unwrap();
    // no reply scripted; a recv attempt would fail the test
    conn.put(
        1,
        &[(BinaryValue::from("a"), BinaryValue::from("1"))],
        false,
        false,
    )
    .unwrap();
    assert_eq!(state.borrow().sent.len(), 1);
}

#[test]
fn test_scan_framing_and_result_order() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::Scan, 0x00),
            b"a".to_vec(),
            b"1".to_vec(),
            b"b".to_vec(),
            b"2".to_vec(),
        ],
    );
    let options = ScanOptions {
        start_key: Some(BinaryValue::from("a")),
        end_key: Some(BinaryValue::from("c")),
        limit: Some(10),
        key_filter: Some(b"a".to_vec()),
        value_filter: None,
        skip: 2,
        invert: false,
    };
    let records = conn.scan(1, &options).unwrap();
    assert_eq!(
        records,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ]
    );
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x13, 0x00],
            vec![1, 0, 0, 0],
            vec![10, 0, 0, 0, 0, 0, 0, 0],
            b"a".to_vec(),
            b"c".to_vec(),
            b"a".to_vec(),
            Vec::new(),
            vec![2, 0, 0, 0, 0, 0, 0, 0],
        ]
    );
}

#[test]
fn test_inverted_scan_sets_the_direction_flag() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::Scan, 0x00),
            b"b".to_vec(),
            b"2".to_vec(),
            b"a".to_vec(),
            b"1".to_vec(),
        ],
    );
    let options = ScanOptions {
        invert: true,
        ..Default::default()
    };
    let records = conn.scan(1, &options).unwrap();
    // reverse order is preserved exactly as the server sent it
    assert_eq!(records[0].0, b"b".to_vec());
    assert_eq!(records[1].0, b"a".to_vec());
    assert_eq!(sent_messages(&state)[0][0], vec![0x31, 0x01, 0x13, 0x01]);
}

#[test]
fn test_scan_map_collects_records() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::Scan, 0x00),
            b"a".to_vec(),
            b"1".to_vec(),
        ],
    );
    let map = conn.scan_map(1, &ScanOptions::default()).unwrap();
    assert_eq!(map.get(b"a".as_slice()), Some(&b"1".to_vec()));
}

#[test]
fn test_list_returns_keys_only() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::List, 0x00),
            b"a".to_vec(),
            b"b".to_vec(),
        ],
    );
    let listed = conn.list(1, &ScanOptions::default()).unwrap();
    assert_eq!(listed, vec![b"a".to_vec(), b"b".to_vec()]);
    assert_eq!(sent_messages(&state)[0][0], vec![0x31, 0x01, 0x14, 0x00]);
}

#[test]
fn test_count_decodes_the_64_bit_reply() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::Count, 0x00),
            vec![2, 0, 0, 0, 0, 0, 0, 0],
        ],
    );
    let count = conn.count(1, None, None).unwrap();
    assert_eq!(count, 2);
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x11, 0x00],
            vec![1, 0, 0, 0],
            Vec::new(),
            Vec::new(),
        ]
    );
}

#[test]
fn test_exists_maps_reply_bytes_to_bools() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::Exists, 0x00),
            vec![0x01],
            vec![0x00],
            vec![0x42],
        ],
    );
    let flags = conn.exists(1, &keys(&["a", "b", "c"])).unwrap();
    assert_eq!(flags, vec![true, false, true]);
}

#[test]
fn test_delete_framing() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::Delete));
    conn.delete(1, &keys(&["a", "b"]), true, false).unwrap();
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x21, 0x01],
            vec![1, 0, 0, 0],
            b"a".to_vec(),
            b"b".to_vec(),
        ]
    );
}

#[test]
fn test_delete_range_framing_includes_the_limit_frame() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::DeleteRange));
    conn.delete_range(
        1,
        Some(&BinaryValue::from("a")),
        None,
        Some(5),
    )
    .unwrap();
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x22, 0x00],
            vec![1, 0, 0, 0],
            b"a".to_vec(),
            Vec::new(),
            vec![5, 0, 0, 0, 0, 0, 0, 0],
        ]
    );
}

#[test]
fn test_open_table_sends_the_named_parameter_stream() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::OpenTable));
    let options = TableOpenOptions {
        lru_cache_size: Some(1048576),
        bloom_filter_bits_per_key: Some(10),
        merge_operator: MergeOperator::NulAppend,
        compression: CompressionMode::None,
        ..Default::default()
    };
    conn.open_table(4, &options).unwrap();
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x01, 0x00],
            vec![4, 0, 0, 0],
            b"LRUCacheSize".to_vec(),
            b"1048576".to_vec(),
            b"BloomFilterBitsPerKey".to_vec(),
            b"10".to_vec(),
            b"MergeOperator".to_vec(),
            b"NULAPPEND".to_vec(),
            b"CompressionMode".to_vec(),
            b"NONE".to_vec(),
        ]
    );
}

#[test]
fn test_server_info_returns_the_version_frame() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![header(RequestType::ServerInfo, 0x00), b"YakDB 0.4".to_vec()],
    );
    assert_eq!(conn.server_info().unwrap(), b"YakDB 0.4".to_vec());
    assert_eq!(sent_messages(&state)[0], vec![vec![0x31, 0x01, 0x00, 0x00]]);
}

#[test]
fn test_table_info_maps_reply_pairs() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::TableInfo, 0x00),
            b"DiskUsage".to_vec(),
            b"4096".to_vec(),
        ],
    );
    let info = conn.table_info(1).unwrap();
    assert_eq!(info.get(b"DiskUsage".as_slice()), Some(&b"4096".to_vec()));
}

#[test]
fn test_close_table_rejects_unexpected_body_frames() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::CloseTable));
    conn.close_table(1).unwrap();
    queue_reply(
        &state,
        vec![header(RequestType::CloseTable, 0x00), b"junk".to_vec()],
    );
    assert!(matches!(
        conn.close_table(1),
        Err(YakDbError::Protocol(_))
    ));
}

#[test]
fn test_truncate_and_compact_ack() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::TruncateTable));
    conn.truncate(1).unwrap();
    queue_reply(&state, ack(RequestType::CompactRange));
    conn.compact_range(1, None, None).unwrap();
    let sent = sent_messages(&state);
    assert_eq!(sent[0][0], vec![0x31, 0x01, 0x04, 0x00]);
    assert_eq!(
        sent[1],
        vec![
            vec![0x31, 0x01, 0x03, 0x00],
            vec![1, 0, 0, 0],
            Vec::new(),
            Vec::new(),
        ]
    );
}

#[test]
fn test_stop_server_on_push_socket_sends_without_reply() {
    let context = MockContext::default();
    let state = Rc::clone(&context.state);
    let mut conn = Connection::new(context);
    conn.use_push_mode().unwrap();
    conn.connect(crate::DEFAULT_PUSH_ENDPOINT).unwrap();
    conn.stop_server().unwrap();
    assert_eq!(
        sent_messages(&state)[0],
        vec![vec![0x31, 0x01, 0x05, 0x00]]
    );
}

#[test]
fn test_passive_job_lifecycle() {
    let (mut conn, state) = connected();
    queue_reply(
        &state,
        vec![
            header(RequestType::InitializePassiveJob, 0x00),
            vec![42, 0, 0, 0, 0, 0, 0, 0],
        ],
    );
    // first chunk partial, second chunk signals no-data with an empty
    // body
    queue_reply(
        &state,
        vec![
            header(RequestType::RequestJobChunk, 0x01),
            b"a".to_vec(),
            b"1".to_vec(),
        ],
    );
    queue_reply(&state, vec![header(RequestType::RequestJobChunk, 0x02)]);
    let mut job = conn
        .initialize_passive_job(1, Some(1000), None, None, None)
        .unwrap();
    assert_eq!(job.apid(), 42);
    let chunk = job.request_chunk().unwrap();
    assert_eq!(chunk, vec![(b"a".to_vec(), b"1".to_vec())]);
    let done = job.request_chunk().unwrap();
    assert!(done.is_empty());
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            vec![0x31, 0x01, 0x42, 0x00],
            vec![1, 0, 0, 0],
            vec![0xE8, 0x03, 0, 0],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ]
    );
    assert_eq!(
        sent[1],
        vec![
            vec![0x31, 0x01, 0x50, 0x00],
            vec![42, 0, 0, 0, 0, 0, 0, 0],
        ]
    );
}

#[test]
fn test_job_init_without_apid_frame_is_a_protocol_error() {
    let (mut conn, state) = connected();
    queue_reply(&state, ack(RequestType::InitializePassiveJob));
    let result = conn.initialize_passive_job(1, None, None, None, None);
    assert!(matches!(result.err(), Some(YakDbError::Protocol(_))));
}
