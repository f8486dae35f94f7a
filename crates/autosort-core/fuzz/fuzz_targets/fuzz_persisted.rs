#![no_main]
use autosort_core::serialize::PersistedFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary text fed to the persisted document parser.
    // Must not panic -- returning Err is fine.
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = PersistedFile::from_json(text);
    }
});
