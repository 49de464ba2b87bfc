#![no_main]

use libfuzzer_sys::fuzz_target;
use network_session::core::buffer::ByteBuffer;
use network_session::Frame;

fuzz_target!(|data: &[u8]| {
    // Frame parsing must reject, never panic, on arbitrary input
    let _ = Frame::from_bytes_with_limit(data, Some(10240));

    // Walk the same bytes as a message body
    let mut buf = ByteBuffer::from(data);
    let _ = buf.read_u24();
    let _ = buf.read_f32();
    let _ = buf.read_string();
    let _ = buf.read_bytes();
});
