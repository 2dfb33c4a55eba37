//! Registry fuzz target: feed arbitrary bytes to the element registry parser.
//! The parser must not panic; it should return Ok(elements) or Err(String).
//! Build with: cargo fuzz run registry_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(elements) = ipfixcodec::parse_registry(s) {
        ipfixcodec::InfoModel::empty().add_element_list(elements);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run registry_fuzz");
}
