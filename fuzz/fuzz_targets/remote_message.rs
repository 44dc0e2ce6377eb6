#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_remote_channel::{Message, decode_payload};

fuzz_target!(|data: &[u8]| {
    let body = String::from_utf8_lossy(data);
    if let Ok(message) = Message::parse(&body) {
        let _ = decode_payload(message.data);
    }
});
