#![no_main]

use libfuzzer_sys::fuzz_target;
use xlspaceship_client::{decode, encode};

fuzz_target!(|data: &[u8]| {
    let Ok(shot) = std::str::from_utf8(data) else {
        return;
    };

    // Anything that decodes must be on the board and re-encode to the same
    // shot modulo digit case.
    if let Ok(coord) = decode(shot) {
        assert!(coord.x() < 16 && coord.y() < 16);
        let again = encode(i64::from(coord.x()), i64::from(coord.y())).unwrap();
        assert_eq!(again, shot.to_ascii_lowercase());
    }
});
