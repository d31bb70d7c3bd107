#![no_main]

use caro_client::protocol::{MatchSnapshot, UserId};
use caro_client::snapshot::resolve_seat;
use caro_client::MatchSession;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(snapshot) = serde_json::from_slice::<MatchSnapshot>(data) else {
        return;
    };
    let seat = resolve_seat(&snapshot, Some(&UserId::from(1)));
    let mut session = MatchSession::online();
    session.begin_snapshot();
    session.load_snapshot(snapshot, seat);
    let _ = session.is_my_turn();
});
