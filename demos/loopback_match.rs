//! # Loopback Match Example
//!
//! Plays a full offline game against the computer: a seeded random "human"
//! as black and an [`AiOpponent`] as white, sharing one [`MatchSession`].
//! No server is needed.
//!
//! ```sh
//! cargo run --example loopback_match
//! RUST_LOG=debug cargo run --example loopback_match
//! ```

use std::time::Duration;

use caro_client::{
    AiOpponent, Difficulty, MatchSession, MoveStrategy, RandomStrategy, ThreatStrategy,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut session = MatchSession::against_ai();
    let mut human: Box<dyn MoveStrategy> = if std::env::args().any(|a| a == "--smart") {
        Box::new(ThreatStrategy::seeded(11))
    } else {
        Box::new(RandomStrategy::seeded(11))
    };
    let mut ai = AiOpponent::with_difficulty(Difficulty::Medium).with_delay(Duration::from_millis(50));

    while !session.is_over() {
        let Some(seat) = session.seat() else { break };
        let Some(coord) = human.select(session.board(), seat) else { break };
        session.try_local_move(coord)?;
        tracing::info!(%coord, "human played");

        if let Some(reply) = ai.respond(&mut session).await {
            tracing::info!(?reply, "computer played");
        }
    }

    println!("{:?}", session.board());
    match session.winner() {
        Some(symbol) => println!("{symbol} wins along {:?}", session.winning_line()),
        None => println!("draw"),
    }
    Ok(())
}
