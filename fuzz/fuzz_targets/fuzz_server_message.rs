#![no_main]

use caro_client::protocol::ServerMessage;
use caro_client::{MatchSession, StreamEvent, Symbol};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    // Newline-separated messages folded into one session: whatever the
    // server sends, applying it must never panic.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut session = MatchSession::online();
    session.begin_snapshot();
    if let Ok(snapshot) = serde_json::from_str(r#"{"id":1,"status":"in_progress","board_state":[]}"#) {
        session.load_snapshot(snapshot, Some(Symbol::Black));
    }
    for line in text.lines() {
        let Ok(msg) = serde_json::from_str::<ServerMessage>(line) else {
            continue;
        };
        match StreamEvent::from_server(msg) {
            Some(StreamEvent::StateSync(state)) => {
                let _ = session.apply_state_sync(state);
            }
            Some(StreamEvent::MoveApplied(mv)) => {
                let _ = session.apply_remote_move(mv);
            }
            _ => {}
        }
    }
});
