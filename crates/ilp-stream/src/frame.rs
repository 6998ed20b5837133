use bytes::{BufMut, Bytes, BytesMut};
use ilp_packet::oer::{Reader, write_var_octet_string, write_var_uint};

use crate::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
  ConnectionClose = 0x01,
  StreamClose = 0x10,
  StreamMoney = 0x11,
  StreamMaxData = 0x14,
  StreamData = 0x15,
}

impl FrameType {
  fn from_u8(value: u8) -> Option<Self> {
    match value {
      0x01 => Some(FrameType::ConnectionClose),
      0x10 => Some(FrameType::StreamClose),
      0x11 => Some(FrameType::StreamMoney),
      0x14 => Some(FrameType::StreamMaxData),
      0x15 => Some(FrameType::StreamData),
      _ => None,
    }
  }
}

/// Close reason carried by close frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
  pub const NO_ERROR: ErrorCode = ErrorCode(0x01);
  pub const INTERNAL_ERROR: ErrorCode = ErrorCode(0x02);
  pub const FLOW_CONTROL_ERROR: ErrorCode = ErrorCode(0x04);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
  ConnectionClose { code: ErrorCode, message: String },
  StreamClose { stream_id: u64, code: ErrorCode, message: String },
  StreamMoney { stream_id: u64, shares: u64 },
  StreamMaxData { stream_id: u64, max_offset: u64 },
  StreamData { stream_id: u64, offset: u64, data: Bytes },
}

impl Frame {
  pub fn frame_type(&self) -> FrameType {
    match self {
      Frame::ConnectionClose { .. } => FrameType::ConnectionClose,
      Frame::StreamClose { .. } => FrameType::StreamClose,
      Frame::StreamMoney { .. } => FrameType::StreamMoney,
      Frame::StreamMaxData { .. } => FrameType::StreamMaxData,
      Frame::StreamData { .. } => FrameType::StreamData,
    }
  }

  /// Read one frame. Frames of unknown type are consumed and yield `None`.
  pub(crate) fn read(reader: &mut Reader<'_>) -> Result<Option<Self>, StreamError> {
    let kind = reader.read_u8()?;
    let contents = reader.read_var_octet_string()?;
    let Some(kind) = FrameType::from_u8(kind) else {
      return Ok(None);
    };

    let mut body = Reader::new(contents);
    let frame = match kind {
      FrameType::ConnectionClose => Frame::ConnectionClose {
        code: ErrorCode(body.read_u8()?),
        message: read_message(&mut body)?,
      },
      FrameType::StreamClose => Frame::StreamClose {
        stream_id: body.read_var_uint()?,
        code: ErrorCode(body.read_u8()?),
        message: read_message(&mut body)?,
      },
      FrameType::StreamMoney => Frame::StreamMoney {
        stream_id: body.read_var_uint()?,
        shares: body.read_var_uint()?,
      },
      FrameType::StreamMaxData => Frame::StreamMaxData {
        stream_id: body.read_var_uint()?,
        max_offset: body.read_var_uint()?,
      },
      FrameType::StreamData => Frame::StreamData {
        stream_id: body.read_var_uint()?,
        offset: body.read_var_uint()?,
        data: Bytes::copy_from_slice(body.read_var_octet_string()?),
      },
    };
    Ok(Some(frame))
  }

  pub(crate) fn write(&self, buf: &mut BytesMut) {
    let mut contents = BytesMut::new();
    match self {
      Frame::ConnectionClose { code, message } => {
        contents.put_u8(code.0);
        write_var_octet_string(&mut contents, message.as_bytes());
      }
      Frame::StreamClose {
        stream_id,
        code,
        message,
      } => {
        write_var_uint(&mut contents, *stream_id);
        contents.put_u8(code.0);
        write_var_octet_string(&mut contents, message.as_bytes());
      }
      Frame::StreamMoney { stream_id, shares } => {
        write_var_uint(&mut contents, *stream_id);
        write_var_uint(&mut contents, *shares);
      }
      Frame::StreamMaxData { stream_id, max_offset } => {
        write_var_uint(&mut contents, *stream_id);
        write_var_uint(&mut contents, *max_offset);
      }
      Frame::StreamData {
        stream_id,
        offset,
        data,
      } => {
        write_var_uint(&mut contents, *stream_id);
        write_var_uint(&mut contents, *offset);
        write_var_octet_string(&mut contents, data);
      }
    }
    buf.put_u8(self.frame_type() as u8);
    write_var_octet_string(buf, &contents);
  }
}

fn read_message(reader: &mut Reader<'_>) -> Result<String, StreamError> {
  let bytes = reader.read_var_octet_string()?;
  String::from_utf8(bytes.to_vec()).map_err(|_| StreamError::InvalidMessage)
}
