// Line-oriented console: commands from stdin, plain-text output on stdout.
//
// Keeps its own copy of what the app loop has pushed (items, identity,
// registration) so `list` and `whoami` can answer without a round trip.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use gavel_app::view::{ConnectionStatus, ItemView, UiUpdate, UserCommand};
use gavel_core::model::{ConnectionId, ItemId};
use gavel_core::reconcile::Ownership;
use gavel_core::registration::RegistrationState;

const HELP: &str = "\
commands:
  register <name>   join the auction under <name>
  bid <item-id>     raise the bid on an item by the fixed increment
  list              show all items
  whoami            show connection id and registration
  help              show this text
  quit              exit";

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(UserCommand),
    WhoAmI,
    Help,
    Blank,
    Invalid(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "" => Input::Blank,
        // Blank names go through so the app can reject them.
        "register" => Input::Command(UserCommand::Register(rest.to_string())),
        "bid" => match rest.parse::<u64>() {
            Ok(id) => Input::Command(UserCommand::PlaceBid(ItemId(id))),
            Err(_) => Input::Invalid(format!("usage: bid <item-id> (got {rest:?})")),
        },
        "list" | "ls" => Input::Command(UserCommand::ListItems),
        "whoami" => Input::WhoAmI,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Command(UserCommand::Quit),
        other => Input::Invalid(format!("unknown command {other:?}; try `help`")),
    }
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ViewState {
    pub connection: ConnectionStatus,
    pub identity: Option<ConnectionId>,
    pub registration: RegistrationState,
    pub items: Vec<ItemView>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            connection: ConnectionStatus::Disconnected,
            identity: None,
            registration: RegistrationState::Unregistered,
            items: Vec::new(),
        }
    }
}

impl ViewState {
    /// Fold one update in and return the lines to print.
    pub fn apply(&mut self, update: UiUpdate) -> Vec<String> {
        match update {
            UiUpdate::ConnectionStatus(status) => {
                self.connection = status;
                match status {
                    ConnectionStatus::Connected => vec!["connected".into()],
                    ConnectionStatus::Disconnected => vec!["disconnected, reconnecting...".into()],
                }
            }
            UiUpdate::Identity(identity) => {
                self.identity = identity;
                Vec::new()
            }
            UiUpdate::Registration(registration) => {
                self.registration = registration;
                match self.registration.display_name() {
                    Some(name) => vec![format!("registered as {name}")],
                    None => Vec::new(),
                }
            }
            UiUpdate::Items(items) => {
                self.items = items;
                self.render_items()
            }
            UiUpdate::ItemChanged(view) => {
                let line = render_item(&view);
                match self.items.iter_mut().find(|v| v.item.id == view.item.id) {
                    Some(slot) => *slot = view,
                    None => self.items.push(view),
                }
                vec![line]
            }
            UiUpdate::Countdown {
                item_id,
                display,
                ended,
            } => {
                let Some(view) = self.items.iter_mut().find(|v| v.item.id == item_id) else {
                    return Vec::new();
                };
                view.countdown = display;
                let newly_ended = ended && !view.ended;
                view.ended = ended;
                if newly_ended {
                    vec![format!("#{} {}: auction ENDED", item_id, view.item.title)]
                } else {
                    Vec::new()
                }
            }
            UiUpdate::Flash { item_id, active } => {
                if let Some(view) = self.items.iter_mut().find(|v| v.item.id == item_id) {
                    view.flashing = active;
                }
                Vec::new()
            }
            UiUpdate::Notice(err) => vec![format!("error: {err}")],
        }
    }

    pub fn render_items(&self) -> Vec<String> {
        if self.items.is_empty() {
            return vec!["(no items)".into()];
        }
        self.items.iter().map(render_item).collect()
    }

    pub fn whoami(&self) -> String {
        let identity = self
            .identity
            .as_ref()
            .map_or("(not connected)", ConnectionId::as_str);
        match &self.registration {
            RegistrationState::Registered { display_name, .. } => {
                format!("connection {identity}, registered as {display_name}")
            }
            RegistrationState::Unregistered => format!("connection {identity}, not registered"),
        }
    }
}

pub fn render_item(view: &ItemView) -> String {
    let item = &view.item;
    let bidder = match &item.last_bidder_name {
        Some(name) => format!(" by {name}"),
        None => String::new(),
    };
    let standing = match view.ownership {
        Ownership::Winning => " [winning]",
        Ownership::Outbid => " [outbid]",
        Ownership::NoBids => "",
    };
    let flash = if view.flashing { " *" } else { "" };
    format!(
        "#{} {} | bid {}{}{} | {}{}",
        item.id, item.title, item.current_bid, bidder, standing, view.countdown, flash
    )
}

// ---------------------------------------------------------------------------
// Console loop
// ---------------------------------------------------------------------------

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

/// Run until the user quits, stdin closes, or the app loop goes away.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let mut view = ViewState::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("type `help` for commands");

    loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(update) => print_lines(view.apply(update)),
                    None => {
                        info!("UI channel closed, console exiting");
                        break;
                    }
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    let _ = cmd_tx.send(UserCommand::Quit).await;
                    break;
                };
                match parse_input(&line) {
                    Input::Command(UserCommand::Quit) => {
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        break;
                    }
                    Input::Command(cmd) => {
                        if cmd_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Input::WhoAmI => println!("{}", view.whoami()),
                    Input::Help => println!("{HELP}"),
                    Input::Blank => {}
                    Input::Invalid(message) => println!("{message}"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gavel_core::model::Item;
    use gavel_core::ClientError;

    fn view(id: u64, bid: u64, bidder: Option<&str>) -> ItemView {
        ItemView {
            item: Item {
                id: ItemId(id),
                title: "Lamp".into(),
                current_bid: bid,
                auction_end_time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap(),
                last_bidder: bidder.map(str::to_string),
                last_bidder_name: bidder.map(|_| "bob".to_string()),
            },
            countdown: "0h 5m 0s".into(),
            ended: false,
            flashing: false,
            ownership: if bidder.is_some() {
                Ownership::Outbid
            } else {
                Ownership::NoBids
            },
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_input("register  Alice Smith "),
            Input::Command(UserCommand::Register("Alice Smith".into()))
        );
        assert_eq!(
            parse_input("bid 3"),
            Input::Command(UserCommand::PlaceBid(ItemId(3)))
        );
        assert_eq!(parse_input("LIST"), Input::Command(UserCommand::ListItems));
        assert_eq!(parse_input("whoami"), Input::WhoAmI);
        assert_eq!(parse_input("quit"), Input::Command(UserCommand::Quit));
        assert_eq!(parse_input("   "), Input::Blank);
    }

    #[test]
    fn bare_register_is_passed_through_for_validation() {
        assert_eq!(
            parse_input("register"),
            Input::Command(UserCommand::Register(String::new()))
        );
    }

    #[test]
    fn bad_input_is_invalid() {
        assert!(matches!(parse_input("bid lamp"), Input::Invalid(_)));
        assert!(matches!(parse_input("bid"), Input::Invalid(_)));
        assert!(matches!(parse_input("dance"), Input::Invalid(_)));
    }

    #[test]
    fn renders_item_row() {
        let mut row = view(1, 110, Some("sock-9"));
        row.flashing = true;
        assert_eq!(
            render_item(&row),
            "#1 Lamp | bid 110 by bob [outbid] | 0h 5m 0s *"
        );
        assert_eq!(render_item(&view(2, 40, None)), "#2 Lamp | bid 40 | 0h 5m 0s");
    }

    #[test]
    fn countdown_prints_only_when_ending() {
        let mut state = ViewState::default();
        state.apply(UiUpdate::Items(vec![view(1, 100, None)]));

        let lines = state.apply(UiUpdate::Countdown {
            item_id: ItemId(1),
            display: "0h 4m 59s".into(),
            ended: false,
        });
        assert!(lines.is_empty());
        assert_eq!(state.items[0].countdown, "0h 4m 59s");

        let lines = state.apply(UiUpdate::Countdown {
            item_id: ItemId(1),
            display: "ENDED".into(),
            ended: true,
        });
        assert_eq!(lines, vec!["#1 Lamp: auction ENDED".to_string()]);
    }

    #[test]
    fn item_change_replaces_row() {
        let mut state = ViewState::default();
        state.apply(UiUpdate::Items(vec![view(1, 100, None)]));
        state.apply(UiUpdate::ItemChanged(view(1, 120, Some("sock-9"))));
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].item.current_bid, 120);
    }

    #[test]
    fn whoami_reflects_identity_and_registration() {
        let mut state = ViewState::default();
        assert_eq!(state.whoami(), "connection (not connected), not registered");

        state.apply(UiUpdate::Identity(Some(ConnectionId::new("sock-42"))));
        let lines = state.apply(UiUpdate::Registration(RegistrationState::Registered {
            identity: Some(ConnectionId::new("sock-42")),
            display_name: "alice".into(),
        }));
        assert_eq!(lines, vec!["registered as alice".to_string()]);
        assert_eq!(state.whoami(), "connection sock-42, registered as alice");
    }

    #[test]
    fn notices_are_printed() {
        let mut state = ViewState::default();
        assert_eq!(
            state.apply(UiUpdate::Notice(ClientError::NotRegistered)),
            vec![format!("error: {}", ClientError::NotRegistered)]
        );
    }
}
