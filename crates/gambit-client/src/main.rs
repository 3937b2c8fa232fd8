//! Terminal client for Gambit.
//!
//! Moves are typed in coordinate notation (`e2e4`, `e7e8n`).

use gambit_client::render::{describe, render_board};
use clap::Parser;
use gambit_client::{run_session, Config, Exit, RelayConnection, Update};
use gambit_core::{GameSession, MoveRequest, MoveVerdict, Participant, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::parse();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let room = match config.room() {
        Some(room) => room.to_string(),
        None => {
            println!("Room name:");
            lines.next_line().await?.unwrap_or_default()
        }
    };

    let mut connection = RelayConnection::connect(&config.relay_url).await?;
    let subscription = connection.subscribe()?;
    let mut game = GameSession::new(Participant::new(), connection.handle());
    info!("Participant {}", game.session().participant_id());

    game.join(&room)?;
    println!("{}", describe(&game.view()));

    let (moves_tx, moves_rx) = mpsc::unbounded_channel();
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match MoveRequest::from_coordinates(&line) {
                Ok(request) => {
                    if moves_tx.send(request).is_err() {
                        break;
                    }
                }
                Err(e) => println!("Could not read move: {}", e),
            }
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            print_update(&update);
        }
    });

    let exit = run_session(&mut game, subscription, moves_rx, updates_tx).await;
    let _ = printer.await;

    // Release the session's handles so the final move and leave request flush
    drop(game);
    connection.close().await;

    match exit {
        Exit::Finished(outcome) => println!("Game over: {}", outcome),
        Exit::Broken => println!("Session discarded after a desync."),
        Exit::Abandoned => println!("Game abandoned."),
        Exit::Disconnected => println!("Lost connection to the relay."),
        Exit::InputClosed => println!("Bye."),
    }
    Ok(())
}

fn print_update(update: &Update) {
    let view = match update {
        Update::Event(SessionEvent::Paired { role, message }) => {
            println!("{} (you play {})", message, role.color_name());
            return;
        }
        Update::Event(SessionEvent::OpponentMoved(view)) => view,
        Update::Event(SessionEvent::RelayError(message)) => {
            println!("Relay: {}", message);
            return;
        }
        Update::Event(_) => return,
        Update::Verdict(MoveVerdict::RolledBack { reason, .. }) => {
            println!("Move refused: {}", reason);
            return;
        }
        Update::Verdict(MoveVerdict::Confirmed(view)) => view,
    };
    print!("{}", render_board(&view.position, view.orientation));
    println!("{}", describe(view));
}
