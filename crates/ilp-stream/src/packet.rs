use bytes::{BufMut, BytesMut};
use ilp_packet::PacketType;
use ilp_packet::oer::{Reader, write_var_uint};

use crate::StreamError;
use crate::frame::Frame;

pub const STREAM_VERSION: u8 = 1;

/// The smallest frame is a type byte and an empty length prefix.
const MIN_FRAME_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPacket {
  /// Type of the ILP packet this STREAM packet travels in.
  pub ilp_packet_type: PacketType,
  pub sequence: u64,
  pub prepare_amount: u64,
  pub frames: Vec<Frame>,
}

impl StreamPacket {
  /// Decode a packet. Unknown frames are dropped; bytes after the last
  /// frame are padding and ignored.
  pub fn decode(input: &[u8]) -> Result<Self, StreamError> {
    let mut reader = Reader::new(input);
    let version = reader.read_u8()?;
    if version != STREAM_VERSION {
      return Err(StreamError::UnsupportedVersion(version));
    }
    let ilp_packet_type = PacketType::try_from(reader.read_u8()?)?;
    let sequence = reader.read_var_uint()?;
    let prepare_amount = reader.read_var_uint()?;

    let declared = reader.read_var_uint()?;
    if declared > (reader.remaining() / MIN_FRAME_LEN) as u64 {
      return Err(StreamError::TooManyFrames { declared });
    }
    let mut frames = Vec::with_capacity(declared as usize);
    for _ in 0..declared {
      if let Some(frame) = Frame::read(&mut reader)? {
        frames.push(frame);
      }
    }

    Ok(Self {
      ilp_packet_type,
      sequence,
      prepare_amount,
      frames,
    })
  }

  pub fn encode(&self) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(STREAM_VERSION);
    buf.put_u8(self.ilp_packet_type as u8);
    write_var_uint(&mut buf, self.sequence);
    write_var_uint(&mut buf, self.prepare_amount);
    write_var_uint(&mut buf, self.frames.len() as u64);
    for frame in &self.frames {
      frame.write(&mut buf);
    }
    buf
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ErrorCode;
  use bytes::Bytes;
  use proptest::prelude::*;

  fn packet() -> StreamPacket {
    StreamPacket {
      ilp_packet_type: PacketType::Prepare,
      sequence: 7,
      prepare_amount: 1000,
      frames: vec![
        Frame::StreamMoney { stream_id: 1, shares: 3 },
        Frame::StreamData {
          stream_id: 1,
          offset: 0,
          data: Bytes::from_static(b"hello"),
        },
        Frame::StreamClose {
          stream_id: 1,
          code: ErrorCode::NO_ERROR,
          message: String::new(),
        },
      ],
    }
  }

  #[test]
  fn decodes_encoded_packet() {
    let encoded = packet().encode();
    assert_eq!(&encoded[..2], &[STREAM_VERSION, 12]);
    assert_eq!(StreamPacket::decode(&encoded).unwrap(), packet());
  }

  #[test]
  fn padding_is_ignored() {
    let mut encoded = packet().encode();
    encoded.put_slice(&[0u8; 16]);
    assert_eq!(StreamPacket::decode(&encoded).unwrap(), packet());
  }

  #[test]
  fn rejects_wrong_version_and_inflated_frame_count() {
    assert_eq!(
      StreamPacket::decode(&[2, 12]).unwrap_err(),
      StreamError::UnsupportedVersion(2)
    );
    // Declares 0xffff frames with nothing after the count.
    let input = [1, 14, 1, 0, 1, 0, 2, 0xff, 0xff];
    assert_eq!(
      StreamPacket::decode(&input).unwrap_err(),
      StreamError::TooManyFrames { declared: 0xffff }
    );
  }

  #[test]
  fn unknown_frames_are_dropped() {
    let mut buf = BytesMut::new();
    buf.put_slice(&[1, 13]);
    write_var_uint(&mut buf, 0);
    write_var_uint(&mut buf, 0);
    write_var_uint(&mut buf, 2);
    buf.put_slice(&[0x33, 0x01, 0x00]);
    Frame::StreamMaxData {
      stream_id: 3,
      max_offset: 4096,
    }
    .write(&mut buf);

    let decoded = StreamPacket::decode(&buf).unwrap();
    assert_eq!(
      decoded.frames,
      vec![Frame::StreamMaxData {
        stream_id: 3,
        max_offset: 4096
      }]
    );
  }

  proptest! {
    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
      let _ = StreamPacket::decode(&bytes);
    }
  }
}
