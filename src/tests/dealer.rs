use std::rc::Rc;

use crate::conversion::BinaryValue;
use crate::dealer::{AsyncReply, DealerConnection};
use crate::enums::{RequestType, SocketRole};
use crate::error::YakDbError;
use crate::tests::harness::{MockContext, MockState, header, sent_messages};

use std::cell::RefCell;

fn dealer() -> (DealerConnection<MockContext>, Rc<RefCell<MockState>>) {
    let context = MockContext::default();
    let state = Rc::clone(&context.state);
    let mut conn = DealerConnection::new(context).expect("dealer setup");
    conn.connect(crate::DEFAULT_ENDPOINT).expect("mock connect");
    (conn, state)
}

/// Reply header carrying an echoed request id
fn header_with_id(request_type: RequestType, status: u8, request_id: u32) -> Vec<u8> {
    let mut frame = header(request_type, status);
    frame.extend_from_slice(&request_id.to_le_bytes());
    frame
}

#[test]
fn test_dealer_sets_role_and_random_identity() {
    let (_conn, state) = dealer();
    assert_eq!(state.borrow().role, Some(SocketRole::Dealer));
    assert_eq!(state.borrow().identity.as_ref().map(Vec::len), Some(8));
}

#[test]
fn test_request_carries_delimiter_and_request_id() {
    let (mut conn, state) = dealer();
    let handle = conn.read(1, &[BinaryValue::from("a")]).unwrap();
    assert_eq!(handle.request_id(), 1);
    let sent = sent_messages(&state);
    assert_eq!(
        sent[0],
        vec![
            Vec::new(),
            vec![0x31, 0x01, 0x10, 0x00, 1, 0, 0, 0],
            vec![1, 0, 0, 0],
            b"a".to_vec(),
        ]
    );
}

#[test]
fn test_out_of_order_replies_are_correlated_by_request_id() {
    let (mut conn, _state) = dealer();
    let mut first = conn.read(1, &[BinaryValue::from("a")]).unwrap();
    let mut second = conn.read(1, &[BinaryValue::from("b")]).unwrap();
    assert_eq!(conn.pending_requests(), 2);
    // the second reply arrives first
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Read, 0x00, second.request_id()),
        b"2".to_vec(),
    ])
    .unwrap();
    assert!(first.try_recv().is_none());
    assert_eq!(
        second.try_recv().unwrap().unwrap(),
        AsyncReply::Values(vec![b"2".to_vec()])
    );
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Read, 0x00, first.request_id()),
        b"1".to_vec(),
    ])
    .unwrap();
    assert_eq!(
        first.try_recv().unwrap().unwrap(),
        AsyncReply::Values(vec![b"1".to_vec()])
    );
    assert_eq!(conn.pending_requests(), 0);
}

#[test]
fn test_scan_reply_is_shaped_into_tuples() {
    let (mut conn, _state) = dealer();
    let mut handle = conn.scan(1, &Default::default()).unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Scan, 0x00, handle.request_id()),
        b"a".to_vec(),
        b"1".to_vec(),
    ])
    .unwrap();
    assert_eq!(
        handle.try_recv().unwrap().unwrap(),
        AsyncReply::Records(vec![(b"a".to_vec(), b"1".to_vec())])
    );
}

#[test]
fn test_read_map_reply_is_keyed_by_input_keys() {
    let (mut conn, _state) = dealer();
    let mut handle = conn.read_map(1, &[BinaryValue::from("a")]).unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Read, 0x00, handle.request_id()),
        b"1".to_vec(),
    ])
    .unwrap();
    let AsyncReply::ValueMap(map) = handle.try_recv().unwrap().unwrap() else {
        panic!("expected a value map");
    };
    assert_eq!(map.get(b"a".as_slice()), Some(&b"1".to_vec()));
}

#[test]
fn test_count_and_job_replies_decode_integers() {
    let (mut conn, _state) = dealer();
    let mut count_handle = conn.count(1, None, None).unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Count, 0x00, count_handle.request_id()),
        vec![7, 0, 0, 0, 0, 0, 0, 0],
    ])
    .unwrap();
    assert_eq!(
        count_handle.try_recv().unwrap().unwrap(),
        AsyncReply::Count(7)
    );
    let mut job_handle = conn
        .initialize_passive_job(1, None, None, None, None)
        .unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(
            RequestType::InitializePassiveJob,
            0x00,
            job_handle.request_id(),
        ),
        vec![9, 0, 0, 0, 0, 0, 0, 0],
    ])
    .unwrap();
    assert_eq!(job_handle.try_recv().unwrap().unwrap(), AsyncReply::Apid(9));
}

#[test]
fn test_chunk_statuses_resolve_to_chunks() {
    let (mut conn, _state) = dealer();
    let mut handle = conn.request_job_chunk(9).unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::RequestJobChunk, 0x02, handle.request_id()),
    ])
    .unwrap();
    assert_eq!(
        handle.try_recv().unwrap().unwrap(),
        AsyncReply::Chunk(Vec::new())
    );
}

#[test]
fn test_put_reply_is_an_ack_and_empty_put_resolves_immediately() {
    let (mut conn, state) = dealer();
    let mut empty = conn.put(1, &[], false, false).unwrap();
    assert_eq!(empty.try_recv().unwrap().unwrap(), AsyncReply::Ack);
    assert!(state.borrow().sent.is_empty());
    let mut handle = conn
        .put(
            1,
            &[(BinaryValue::from("a"), BinaryValue::from("1"))],
            false,
            false,
        )
        .unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Put, 0x00, handle.request_id()),
    ])
    .unwrap();
    assert_eq!(handle.try_recv().unwrap().unwrap(), AsyncReply::Ack);
}

#[test]
fn test_unknown_request_ids_are_discarded_silently() {
    let (mut conn, _state) = dealer();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Read, 0x00, 777),
    ])
    .unwrap();
    assert_eq!(conn.pending_requests(), 0);
}

#[test]
fn test_forgotten_requests_drop_their_reply() {
    let (mut conn, _state) = dealer();
    let handle = conn.read(1, &[BinaryValue::from("a")]).unwrap();
    assert!(conn.forget(handle.request_id()));
    assert!(!conn.forget(handle.request_id()));
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Read, 0x00, handle.request_id()),
        b"1".to_vec(),
    ])
    .unwrap();
    assert_eq!(conn.pending_requests(), 0);
}

#[test]
fn test_missing_delimiter_is_a_protocol_error() {
    let (mut conn, _state) = dealer();
    let result = conn.dispatch(vec![header_with_id(RequestType::Read, 0x00, 1)]);
    assert!(matches!(result, Err(YakDbError::Protocol(_))));
}

#[test]
fn test_server_errors_reach_the_waiting_handle() {
    let (mut conn, _state) = dealer();
    let mut handle = conn.read(1, &[BinaryValue::from("a")]).unwrap();
    conn.dispatch(vec![
        Vec::new(),
        header_with_id(RequestType::Read, 0x01, handle.request_id()),
        b"table is locked".to_vec(),
    ])
    .unwrap();
    let error = handle.try_recv().unwrap().unwrap_err();
    assert!(format!("{error}").contains("table is locked"));
}

#[test]
fn test_unconnected_dealer_refuses_requests() {
    let context = MockContext::default();
    let mut conn = DealerConnection::new(context).unwrap();
    assert!(matches!(
        conn.read(1, &[BinaryValue::from("a")]),
        Err(YakDbError::ConnectionState(_))
    ));
}
