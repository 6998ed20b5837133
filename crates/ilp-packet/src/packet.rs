use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::ParseError;
use crate::address::Address;
use crate::oer::{Reader, write_var_octet_string};

/// `YYYYMMDDHHmmssfff`
const TIMESTAMP_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
  Prepare = 12,
  Fulfill = 13,
  Reject = 14,
}

impl TryFrom<u8> for PacketType {
  type Error = ParseError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      12 => Ok(PacketType::Prepare),
      13 => Ok(PacketType::Fulfill),
      14 => Ok(PacketType::Reject),
      other => Err(ParseError::UnknownType(other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
  pub amount: u64,
  /// Expiry as a 17-digit UTC timestamp.
  pub expires_at: String,
  pub execution_condition: [u8; 32],
  pub destination: Address,
  pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfill {
  pub fulfillment: [u8; 32],
  pub data: Bytes,
}

/// Three-character error code such as `F02` or `T04`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub [u8; 3]);

impl ErrorCode {
  pub const F00_BAD_REQUEST: ErrorCode = ErrorCode(*b"F00");
  pub const F02_UNREACHABLE: ErrorCode = ErrorCode(*b"F02");
  pub const T04_INSUFFICIENT_LIQUIDITY: ErrorCode = ErrorCode(*b"T04");
  pub const R00_TRANSFER_TIMED_OUT: ErrorCode = ErrorCode(*b"R00");

  fn parse(bytes: [u8; 3]) -> Result<Self, ParseError> {
    let class_ok = matches!(bytes[0], b'F' | b'T' | b'R');
    if class_ok && bytes[1].is_ascii_digit() && bytes[2].is_ascii_digit() {
      Ok(ErrorCode(bytes))
    } else {
      Err(ParseError::InvalidErrorCode)
    }
  }

  /// `F` errors are final, `T` temporary and `R` relative.
  pub fn class(&self) -> char {
    self.0[0] as char
  }
}

impl fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&String::from_utf8_lossy(&self.0))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reject {
  pub code: ErrorCode,
  /// Empty on the wire when the rejecting node did not identify itself.
  pub triggered_by: Option<Address>,
  pub message: Bytes,
  pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
  Prepare(Prepare),
  Fulfill(Fulfill),
  Reject(Reject),
}

impl Packet {
  pub fn packet_type(&self) -> PacketType {
    match self {
      Packet::Prepare(_) => PacketType::Prepare,
      Packet::Fulfill(_) => PacketType::Fulfill,
      Packet::Reject(_) => PacketType::Reject,
    }
  }

  /// Decode one packet. The input must hold exactly one packet.
  pub fn decode(input: &[u8]) -> Result<Self, ParseError> {
    let mut reader = Reader::new(input);
    let packet_type = PacketType::try_from(reader.read_u8()?)?;
    let body = reader.read_var_octet_string()?;
    if !reader.is_empty() {
      return Err(ParseError::TrailingBytes(reader.remaining()));
    }

    let mut body = Reader::new(body);
    let packet = match packet_type {
      PacketType::Prepare => Packet::Prepare(Prepare {
        amount: body.read_u64()?,
        expires_at: read_timestamp(&mut body)?,
        execution_condition: body.read_array()?,
        destination: Address::from_bytes(body.read_var_octet_string()?)?,
        data: Bytes::copy_from_slice(body.read_var_octet_string()?),
      }),
      PacketType::Fulfill => Packet::Fulfill(Fulfill {
        fulfillment: body.read_array()?,
        data: Bytes::copy_from_slice(body.read_var_octet_string()?),
      }),
      PacketType::Reject => {
        let code = ErrorCode::parse(body.read_array()?)?;
        let triggered_by = match body.read_var_octet_string()? {
          [] => None,
          bytes => Some(Address::from_bytes(bytes)?),
        };
        Packet::Reject(Reject {
          code,
          triggered_by,
          message: Bytes::copy_from_slice(body.read_var_octet_string()?),
          data: Bytes::copy_from_slice(body.read_var_octet_string()?),
        })
      }
    };
    if !body.is_empty() {
      return Err(ParseError::TrailingBytes(body.remaining()));
    }
    Ok(packet)
  }

  pub fn encode(&self) -> BytesMut {
    let mut body = BytesMut::new();
    match self {
      Packet::Prepare(prepare) => {
        body.put_u64(prepare.amount);
        body.put_slice(prepare.expires_at.as_bytes());
        body.put_slice(&prepare.execution_condition);
        write_var_octet_string(&mut body, prepare.destination.as_str().as_bytes());
        write_var_octet_string(&mut body, &prepare.data);
      }
      Packet::Fulfill(fulfill) => {
        body.put_slice(&fulfill.fulfillment);
        write_var_octet_string(&mut body, &fulfill.data);
      }
      Packet::Reject(reject) => {
        body.put_slice(&reject.code.0);
        let triggered_by = reject.triggered_by.as_ref().map(Address::as_str).unwrap_or_default();
        write_var_octet_string(&mut body, triggered_by.as_bytes());
        write_var_octet_string(&mut body, &reject.message);
        write_var_octet_string(&mut body, &reject.data);
      }
    }

    let mut out = BytesMut::with_capacity(body.len() + 4);
    out.put_u8(self.packet_type() as u8);
    write_var_octet_string(&mut out, &body);
    out
  }
}

fn read_timestamp(reader: &mut Reader<'_>) -> Result<String, ParseError> {
  let raw = reader.read_bytes(TIMESTAMP_LEN)?;
  let invalid = || ParseError::InvalidTimestamp(String::from_utf8_lossy(raw).to_string());
  if !raw.iter().all(u8::is_ascii_digit) {
    return Err(invalid());
  }
  let field = |range: std::ops::Range<usize>| {
    raw[range]
      .iter()
      .fold(0u32, |acc, digit| acc * 10 + u32::from(digit - b'0'))
  };
  let in_range = (1..=12).contains(&field(4..6))
    && (1..=31).contains(&field(6..8))
    && field(8..10) < 24
    && field(10..12) < 60
    && field(12..14) < 61;
  if !in_range {
    return Err(invalid());
  }
  Ok(String::from_utf8_lossy(raw).to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn prepare() -> Packet {
    Packet::Prepare(Prepare {
      amount: 107,
      expires_at: "20171223012050123".to_string(),
      execution_condition: [0x11; 32],
      destination: "example.alice".parse().unwrap(),
      data: Bytes::from_static(b"hello"),
    })
  }

  #[test]
  fn prepare_wire_layout() {
    let encoded = prepare().encode();
    assert_eq!(encoded[0], 12);
    // 8 amount + 17 expiry + 32 condition + 14 destination + 6 data
    assert_eq!(encoded[1] as usize, 77);
    assert_eq!(encoded.len(), 79);
    assert_eq!(&encoded[2..10], &107u64.to_be_bytes());
    assert_eq!(&encoded[10..27], b"20171223012050123");
    assert_eq!(Packet::decode(&encoded).unwrap(), prepare());
  }

  #[test]
  fn reject_without_trigger() {
    let reject = Packet::Reject(Reject {
      code: ErrorCode::F02_UNREACHABLE,
      triggered_by: None,
      message: Bytes::from_static(b"no route"),
      data: Bytes::new(),
    });
    let decoded = Packet::decode(&reject.encode()).unwrap();
    assert_eq!(decoded, reject);
    let Packet::Reject(decoded) = decoded else {
      panic!("expected reject");
    };
    assert_eq!(decoded.code.class(), 'F');
    assert_eq!(decoded.code.to_string(), "F02");
  }

  #[test]
  fn fulfill_with_large_data_uses_long_length() {
    let fulfill = Packet::Fulfill(Fulfill {
      fulfillment: [0xab; 32],
      data: Bytes::from(vec![7u8; 300]),
    });
    let encoded = fulfill.encode();
    assert_eq!(encoded[1], 0x82);
    assert_eq!(Packet::decode(&encoded).unwrap(), fulfill);
  }

  #[test]
  fn rejects_malformed_input() {
    assert_eq!(Packet::decode(&[]), Err(ParseError::UnexpectedEof { needed: 1 }));
    assert_eq!(Packet::decode(&[1, 0]), Err(ParseError::UnknownType(1)));

    let mut encoded = prepare().encode().to_vec();
    encoded.push(0);
    assert_eq!(Packet::decode(&encoded), Err(ParseError::TrailingBytes(1)));

    let mut bad_month = prepare().encode().to_vec();
    bad_month[14] = b'1';
    bad_month[15] = b'3';
    assert!(matches!(Packet::decode(&bad_month), Err(ParseError::InvalidTimestamp(_))));

    let mut bad_code = Packet::Reject(Reject {
      code: ErrorCode::T04_INSUFFICIENT_LIQUIDITY,
      triggered_by: Some("g.connector".parse().unwrap()),
      message: Bytes::new(),
      data: Bytes::new(),
    })
    .encode()
    .to_vec();
    bad_code[2] = b'X';
    assert_eq!(Packet::decode(&bad_code), Err(ParseError::InvalidErrorCode));
  }

  #[test]
  fn truncated_body_is_eof() {
    let encoded = prepare().encode();
    let mut truncated = encoded[..40].to_vec();
    truncated[1] = 38;
    assert!(matches!(Packet::decode(&truncated), Err(ParseError::UnexpectedEof { .. })));
  }

  proptest! {
    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
      let _ = Packet::decode(&bytes);
    }

    #[test]
    fn decode_never_panics_on_typed_input(kind in 12u8..=14, body in proptest::collection::vec(any::<u8>(), 0..300)) {
      let mut input = BytesMut::new();
      input.put_u8(kind);
      write_var_octet_string(&mut input, &body);
      let _ = Packet::decode(&input);
    }

    #[test]
    fn prepare_amounts_survive_encoding(amount in any::<u64>()) {
      let Packet::Prepare(mut inner) = prepare() else { unreachable!() };
      inner.amount = amount;
      let packet = Packet::Prepare(inner);
      prop_assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
    }
  }
}
