#![no_main]

use std::collections::BTreeMap;

use ilp_stream::{Frame, StreamAssembler, StreamPacket};
use libfuzzer_sys::fuzz_target;

const WINDOW: u64 = 64 * 1024;

fuzz_target!(|data: &[u8]| {
  let Ok(packet) = StreamPacket::decode(data) else {
    return;
  };

  let mut streams: BTreeMap<u64, StreamAssembler> = BTreeMap::new();
  for frame in packet.frames {
    if let Frame::StreamData {
      stream_id,
      offset,
      data,
    } = frame
    {
      let assembler = streams.entry(stream_id).or_insert_with(|| StreamAssembler::new(WINDOW));
      let before = assembler.read_offset();
      if assembler.push(offset, data).is_ok() {
        let released = assembler.read();
        assert_eq!(assembler.read_offset(), before + released.len() as u64);
      }
      assert!(assembler.buffered() <= WINDOW);
    }
  }
});
