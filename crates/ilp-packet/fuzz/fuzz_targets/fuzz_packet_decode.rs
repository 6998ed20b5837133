#![no_main]

use ilp_packet::Packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
  // Whatever decodes must decode to the same packet after re-encoding.
  if let Ok(packet) = Packet::decode(data) {
    let encoded = packet.encode();
    assert_eq!(Packet::decode(&encoded).as_ref(), Ok(&packet));
  }
});
