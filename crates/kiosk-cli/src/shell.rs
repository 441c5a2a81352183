//! Line-oriented stand-in for the kiosk touch screen.
//!
//! Screens are printed as the controller navigates; guest actions are typed
//! on stdin. In mock-NFC mode `tap` and `remove` move the demo card.

use crate::{Gate, Kiosk, demo::DemoCard};
use kiosk_controller::{ControllerConfig, IdleTimer, Route};
use kiosk_hardware::{CardConnection, CardTransport};
use std::{
    fmt::Write as _,
    str::{FromStr, SplitWhitespace},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::UnboundedReceiver,
};
use tracing::{debug, warn};

pub const HELP: &str = "\
Commands:
  list              show attractions
  select <ride>     reserve a ride
  confirm <ride>    confirm the reservation and write it to the card
  yes | no          answer the replace prompt
  cancel            end the session
  tap | remove      move the demo card (mock NFC only)
  dump              print every readable block of a Classic card
  help              show this text
  quit              exit";

/// A guest action typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Select(String),
    Confirm(String),
    Replace(bool),
    Cancel,
    Tap,
    Remove,
    Dump,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("'{0}' needs a ride id")]
    MissingRide(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(CommandError::Unknown(String::new()));
        };
        match word.to_ascii_lowercase().as_str() {
            "list" | "ls" => Ok(Command::List),
            "select" => ride_arg("select", &mut words).map(Command::Select),
            "confirm" => ride_arg("confirm", &mut words).map(Command::Confirm),
            "yes" | "y" => Ok(Command::Replace(true)),
            "no" | "n" => Ok(Command::Replace(false)),
            "cancel" => Ok(Command::Cancel),
            "tap" => Ok(Command::Tap),
            "remove" => Ok(Command::Remove),
            "dump" => Ok(Command::Dump),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn ride_arg(command: &'static str, words: &mut SplitWhitespace<'_>) -> Result<String, CommandError> {
    words
        .next()
        .map(str::to_string)
        .ok_or(CommandError::MissingRide(command))
}

/// Text shown for a screen.
pub fn render(route: &Route) -> String {
    match route {
        Route::Welcome => "Welcome! Tap your card to begin.".to_string(),
        Route::Processing => "Reading your card...".to_string(),
        Route::ReplacePrompt { reservation } => format!(
            "You already have a reservation for {} ({} min). Replace it? [yes/no]",
            reservation.ride_name, reservation.wait_time_minutes
        ),
        Route::Select { attractions } => {
            let mut out = String::from("Choose an attraction (select <ride>):");
            for choice in attractions {
                let _ = write!(
                    out,
                    "\n  {:<16} {} ({} min)",
                    choice.attraction.id, choice.attraction.name, choice.attraction.wait_time_minutes
                );
            }
            out
        }
        Route::Success {
            reservation,
            confirmation_id,
            card_written,
        } => {
            let mut out = format!(
                "Reservation confirmed: {}, about {} min.",
                reservation.ride_name, reservation.wait_time_minutes
            );
            if let Some(id) = confirmation_id {
                let _ = write!(out, "\n  Confirmation: {id}");
            }
            if !card_written {
                out.push_str("\n  Your card could not be updated. Please see a team member.");
            }
            out
        }
        Route::Error { message } => format!("Sorry: {message}"),
    }
}

/// Print every screen and keep the idle timer in step with it.
pub async fn show_routes(
    mut routes: UnboundedReceiver<Route>,
    idle: Arc<IdleTimer>,
    config: ControllerConfig,
) {
    while let Some(route) = routes.recv().await {
        match route {
            Route::Welcome => idle.cancel(),
            Route::Success { .. } => idle.reset(config.success_reset),
            _ => idle.reset(config.idle_reset),
        }
        println!("\n{}", render(&route));
    }
}

pub struct Shell {
    controller: Arc<Kiosk>,
    gate: Arc<Gate>,
    idle: Arc<IdleTimer>,
    idle_reset: Duration,
    demo: Option<DemoCard>,
}

impl Shell {
    pub fn new(
        controller: Arc<Kiosk>,
        gate: Arc<Gate>,
        idle: Arc<IdleTimer>,
        idle_reset: Duration,
        demo: Option<DemoCard>,
    ) -> Self {
        Self {
            controller,
            gate,
            idle,
            idle_reset,
            demo,
        }
    }

    /// Read commands until `quit` or end of input.
    pub async fn run(&self) -> anyhow::Result<()> {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    self.idle.reset(self.idle_reset);
                    self.execute(command).await;
                }
                Err(e) => println!("{e}"),
            }
        }
        Ok(())
    }

    async fn execute(&self, command: Command) {
        // Failed guest actions already navigated to the error screen.
        let result = match command {
            Command::List => self.controller.attractions().await.map(|list| {
                println!("\n{}", render(&Route::Select { attractions: list }));
            }),
            Command::Select(ride) => self.controller.make_reservation(&ride).await.map(|r| {
                println!(
                    "Reserved {} at {} ({}); type 'confirm {ride}' to write it to your card.",
                    r.reservation.ride_name,
                    r.reserved_at.format("%H:%M"),
                    r.confirmation_id.as_deref().unwrap_or("no confirmation id")
                );
            }),
            Command::Confirm(ride) => self.controller.confirm_and_write(&ride).await.map(drop),
            Command::Replace(replace) => self.controller.answer_replace_prompt(replace).await,
            Command::Cancel => {
                self.controller.end_session();
                Ok(())
            }
            Command::Tap => {
                self.move_demo_card(true);
                Ok(())
            }
            Command::Remove => {
                self.move_demo_card(false);
                Ok(())
            }
            Command::Dump => {
                self.dump().await;
                Ok(())
            }
            Command::Help | Command::Quit => {
                println!("{HELP}");
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(error = %e, "Guest action failed");
        }
    }

    fn move_demo_card(&self, on: bool) {
        let Some(demo) = &self.demo else {
            println!("No demo card: the kiosk is using a real reader");
            return;
        };
        let moved = if on { demo.tap() } else { demo.remove() };
        if !moved {
            println!("The demo card is already {}", if on { "on the reader" } else { "off the reader" });
        }
    }

    /// Print every block the key opens, with the poller paused.
    async fn dump(&self) {
        let _pause = self.gate.pause();
        let mut transport = self.gate.acquire().await;

        let mut connection = match transport.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                println!("No card to dump: {e}");
                return;
            }
        };

        match connection.as_classic() {
            Some(classic) => match classic.dump_blocks().await {
                Ok(blocks) => {
                    for block in blocks {
                        let hex: Vec<String> = block.data.iter().map(|b| format!("{b:02X}")).collect();
                        println!("  {:02}: {}", block.block, hex.join(" "));
                    }
                }
                Err(e) => println!("Dump failed: {e}"),
            },
            None => println!("Block dump needs a MIFARE Classic card"),
        }

        if let Err(e) = connection.release().await {
            warn!(error = %e, "Releasing card after dump failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_controller::AttractionChoice;
    use kiosk_core::Reservation;
    use kiosk_network::Attraction;
    use rstest::rstest;

    #[rstest]
    #[case("list", Command::List)]
    #[case("  LS ", Command::List)]
    #[case("select mock1", Command::Select("mock1".to_string()))]
    #[case("confirm mock2 extra", Command::Confirm("mock2".to_string()))]
    #[case("yes", Command::Replace(true))]
    #[case("N", Command::Replace(false))]
    #[case("cancel", Command::Cancel)]
    #[case("tap", Command::Tap)]
    #[case("remove", Command::Remove)]
    #[case("dump", Command::Dump)]
    #[case("?", Command::Help)]
    #[case("exit", Command::Quit)]
    fn test_parse(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(line.parse::<Command>().unwrap(), expected);
    }

    #[rstest]
    #[case("select", CommandError::MissingRide("select"))]
    #[case("confirm  ", CommandError::MissingRide("confirm"))]
    #[case("reserve mock1", CommandError::Unknown("reserve".to_string()))]
    fn test_parse_errors(#[case] line: &str, #[case] expected: CommandError) {
        assert_eq!(line.parse::<Command>().unwrap_err(), expected);
    }

    #[test]
    fn test_render_select() {
        let route = Route::Select {
            attractions: vec![AttractionChoice {
                attraction_id: 0,
                attraction: Attraction {
                    id: "mock1".to_string(),
                    name: "Mock Coaster".to_string(),
                    wait_time_minutes: 5,
                    image_url: None,
                },
            }],
        };
        let text = render(&route);
        assert!(text.starts_with("Choose an attraction"));
        assert!(text.contains("mock1"));
        assert!(text.contains("Mock Coaster (5 min)"));
    }

    #[test]
    fn test_render_success_warns_when_card_not_written() {
        let reservation = Reservation::new(1, "Log Flume", 25);
        let written = render(&Route::Success {
            reservation: reservation.clone(),
            confirmation_id: Some("MOCK-RESERVATION-001".to_string()),
            card_written: true,
        });
        assert!(written.contains("Log Flume, about 25 min"));
        assert!(written.contains("MOCK-RESERVATION-001"));
        assert!(!written.contains("could not be updated"));

        let unwritten = render(&Route::Success {
            reservation,
            confirmation_id: None,
            card_written: false,
        });
        assert!(unwritten.contains("could not be updated"));
    }
}
