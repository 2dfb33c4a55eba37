//! Collector fuzz target: decode arbitrary bytes as an IPFIX message stream in
//! auto mode. Every record must decode or fail with an error; nothing may panic.
//! Build with: cargo fuzz run collector_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use ipfixcodec::{Buffer, CodecError, Collector, InfoModel, Session};

    let model = InfoModel::new();
    let mut buf = Buffer::new();
    if buf
        .init_collection(Session::new(&model), Collector::from_bytes(data.to_vec()))
        .is_err()
    {
        return;
    }
    buf.set_auto(true);
    buf.auto_insert();
    // every failure either consumes input or ends the stream
    for _ in 0..4096 {
        match buf.next_record() {
            Ok(_) | Err(CodecError::Malformed(_)) => {}
            Err(_) => break,
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run collector_fuzz");
}
