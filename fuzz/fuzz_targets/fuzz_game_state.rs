#![no_main]

use libfuzzer_sys::fuzz_target;
use xlspaceship_client::protocol::{GameState, SalvoReport, WhoAmIResponse};

fuzz_target!(|data: &[u8]| {
    // Every response body the client decodes must fail cleanly, never panic.
    if let Ok(state) = serde_json::from_slice::<GameState>(data) {
        // Whatever decodes must encode again.
        let _ = serde_json::to_vec(&state).unwrap();
    }
    let _ = serde_json::from_slice::<SalvoReport>(data);
    let _ = serde_json::from_slice::<WhoAmIResponse>(data);
});
