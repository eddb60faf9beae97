use std::mem::size_of;

use pretty_assertions::assert_eq;
use zerocopy::FromBytes;

use crate::constant::{ColumnFlags, ColumnType};
use crate::error::Error;
use crate::protocol::command::*;
use crate::protocol::packet::Packet;
use crate::protocol::primitive::*;

fn column(name: &str, size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_bytes_lenenc(&mut out, b"def");
    write_bytes_lenenc(&mut out, b"shop");
    write_bytes_lenenc(&mut out, b"p");
    write_bytes_lenenc(&mut out, b"people");
    write_bytes_lenenc(&mut out, name.as_bytes());
    write_bytes_lenenc(&mut out, name.as_bytes());
    write_int_lenenc(&mut out, 0x0c);
    write_int_2(&mut out, 33);
    write_int_4(&mut out, size);
    write_int_1(&mut out, ColumnType::MYSQL_TYPE_VAR_STRING as u8);
    write_int_2(&mut out, ColumnFlags::NOT_NULL_FLAG.bits());
    write_int_1(&mut out, 0);
    write_int_2(&mut out, 0);
    out
}

fn row(values: &[Option<&str>]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Some(value) => write_bytes_lenenc(&mut out, value.as_bytes()),
            None => write_int_1(&mut out, LENENC_NULL),
        }
    }
    out
}

const EOF: [u8; 5] = [0xFE, 0x00, 0x00, 0x02, 0x00];

fn packets(payloads: Vec<Vec<u8>>) -> Vec<Packet> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(seq, payload)| Packet::new(seq as u8 + 1, payload))
        .collect()
}

fn people() -> Vec<Packet> {
    packets(vec![
        vec![0x02],
        column("id", 11),
        column("name", 20),
        EOF.to_vec(),
        row(&[Some("1"), Some("Alice")]),
        row(&[Some("2"), Some("Bob")]),
        EOF.to_vec(),
    ])
}

#[test]
fn test_column_definition_tail_size() {
    assert_eq!(size_of::<ColumnDefinitionTail>(), 12);
}

#[test]
fn test_column_definition_tail_parsing() {
    let data: [u8; 12] = [
        0x21, 0x00, // charset = 33
        0xFF, 0x00, 0x00, 0x00, // column_length = 255
        0x01, // TINYINT
        0x21, 0x00, // NOT_NULL_FLAG | UNSIGNED_FLAG
        0x00, // decimals
        0x00, 0x00, // reserved
    ];
    let tail = ColumnDefinitionTail::ref_from_bytes(&data).unwrap();

    assert_eq!(tail.charset(), 33);
    assert_eq!(tail.column_length(), 255);
    assert_eq!(tail.column_type(), Some(ColumnType::MYSQL_TYPE_TINY));
    assert!(tail.flags().contains(ColumnFlags::NOT_NULL_FLAG));
    assert!(tail.flags().contains(ColumnFlags::UNSIGNED_FLAG));
    assert!(!tail.flags().contains(ColumnFlags::AUTO_INCREMENT_FLAG));
    assert_eq!(tail.decimals(), 0);
}

#[test]
fn test_read_column_definition() {
    let mut payload = Vec::new();
    write_bytes_lenenc(&mut payload, b"def");
    write_bytes_lenenc(&mut payload, b"shop");
    write_bytes_lenenc(&mut payload, b"p");
    write_bytes_lenenc(&mut payload, b"people");
    write_bytes_lenenc(&mut payload, b"customer");
    write_bytes_lenenc(&mut payload, b"name");
    payload.extend_from_slice(&[
        0x0c, 0x21, 0x00, 0x50, 0x00, 0x00, 0x00, 0xFD, 0x00, 0x00, 0x00, 0x00, 0x00,
    ]);

    let field = read_column_definition(&payload).unwrap();
    assert_eq!(field.name, "customer");
    assert_eq!(field.org_name, "name");
    assert_eq!(field.size, 80);
    assert_eq!(field.column_type(), Some(ColumnType::MYSQL_TYPE_VAR_STRING));
}

#[test]
fn test_read_column_definition_truncated() {
    let payload = column("id", 11);
    for len in [0, 4, 20, payload.len() - 1] {
        assert!(read_column_definition(&payload[..len]).is_err());
    }
}

#[test]
fn test_read_column_definition_bad_tail_length() {
    let mut payload = column("id", 11);
    let tail_len_at = payload.len() - 13;
    payload[tail_len_at] = 0x0b;
    assert!(matches!(
        read_column_definition(&payload),
        Err(Error::InvalidPacket)
    ));
}

#[test]
fn test_read_column_count() {
    assert_eq!(read_column_count(&[0x02]).unwrap(), 2);
    assert_eq!(read_column_count(&[0xFC, 0x2C, 0x01]).unwrap(), 300);
    assert!(matches!(read_column_count(&[0x00]), Err(Error::InvalidPacket)));
    assert!(matches!(
        read_column_count(&[LENENC_NULL]),
        Err(Error::InvalidPacket)
    ));
}

#[test]
fn test_read_text_row() {
    let row = read_text_row(&row(&[Some("1"), None, Some("")]), 3).unwrap();
    assert_eq!(row.get(0), Some("1"));
    assert!(row.is_null(1));
    assert_eq!(row.get(2), Some(""));
}

#[test]
fn test_read_text_row_count_mismatch() {
    let payload = row(&[Some("1"), Some("2")]);
    assert!(matches!(
        read_text_row(&payload, 1),
        Err(Error::ColumnCountMismatch {
            expected: 1,
            actual: 2
        })
    ));
    assert!(matches!(
        read_text_row(&payload, 3),
        Err(Error::ColumnCountMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn test_read_text_row_truncated_value() {
    // announces 5 bytes, carries 2
    assert!(matches!(
        read_text_row(&[0x05, b'a', b'b'], 1),
        Err(Error::UnexpectedEof)
    ));
}

#[test]
fn test_decode_people() {
    let table = decode_text_resultset(&people()).unwrap();

    assert_eq!(table.num_fields(), 2);
    assert_eq!(table.field_name(0), Some("id"));
    assert_eq!(table.field_name(1), Some("name"));
    assert_eq!(table.num_rows(), 2);
    assert_eq!(table.value(0, 0), Some("1"));
    assert_eq!(table.value(0, 1), Some("Alice"));
    assert_eq!(table.value(1, 0), Some("2"));
    assert_eq!(table.value(1, 1), Some("Bob"));
    assert_eq!(table.field(0).map(|f| f.size), Some(11));
}

#[test]
fn test_decode_row_starting_with_empty_string() {
    let table = decode_text_resultset(&packets(vec![
        vec![0x02],
        column("a", 4),
        column("b", 4),
        EOF.to_vec(),
        // first value is "", so the payload starts with 0x00
        row(&[Some(""), Some("x")]),
        EOF.to_vec(),
    ]))
    .unwrap();

    assert_eq!(table.num_rows(), 1);
    assert_eq!(table.value(0, 0), Some(""));
    assert_eq!(table.value(0, 1), Some("x"));
}

#[test]
fn test_decode_ok_reply() {
    let table = decode_text_resultset(&packets(vec![vec![
        0x00, 0x03, 0x07, 0x02, 0x00, 0x01, 0x00,
    ]]))
    .unwrap();

    assert!(table.is_empty());
    assert_eq!(table.affected_rows(), 3);
    assert_eq!(table.last_insert_id(), 7);
    assert_eq!(table.warnings(), 1);
}

#[test]
fn test_decode_error_reply() {
    let mut err = vec![0xFF, 0x28, 0x04];
    err.extend_from_slice(b"#42000syntax error");

    let result = decode_text_resultset(&packets(vec![err]));
    let Err(Error::ServerError(payload)) = result else {
        panic!("expected a server error, got {result:?}");
    };
    assert_eq!(payload.error_code, 1064);
    assert_eq!(payload.sql_state, "42000");
    assert_eq!(payload.message, "syntax error");
}

#[test]
fn test_decode_error_after_rows() {
    let mut err = vec![0xFF, 0x19, 0x05];
    err.extend_from_slice(b"#HY000Query execution was interrupted");

    let mut stream = people();
    stream.pop();
    stream.push(Packet::new(7, err));

    let result = decode_text_resultset(&stream);
    let Err(Error::ServerError(payload)) = result else {
        panic!("expected a server error, got {result:?}");
    };
    assert_eq!(payload.error_code, 1305);
    assert_eq!(payload.message, "Query execution was interrupted");
}

#[test]
fn test_decode_column_count_mismatch() {
    let result = decode_text_resultset(&packets(vec![
        vec![0x03],
        column("id", 11),
        column("name", 20),
        EOF.to_vec(),
        EOF.to_vec(),
    ]));
    assert!(matches!(
        result,
        Err(Error::ColumnCountMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn test_decode_short_row() {
    let result = decode_text_resultset(&packets(vec![
        vec![0x02],
        column("id", 11),
        column("name", 20),
        EOF.to_vec(),
        row(&[Some("1")]),
        EOF.to_vec(),
    ]));
    assert!(matches!(result, Err(Error::ColumnCountMismatch { .. })));
}

#[test]
fn test_decode_missing_terminator() {
    let mut stream = people();
    stream.pop();
    assert!(matches!(
        decode_text_resultset(&stream),
        Err(Error::UnexpectedEof)
    ));
    assert!(matches!(
        decode_text_resultset(&[]),
        Err(Error::UnexpectedEof)
    ));
}
