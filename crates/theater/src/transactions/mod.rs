//! Transaction handlers, grouped by concern: connection lifecycle, lobby
//! and game browsing, game hosting, and the enter-game/queue flows.

use std::collections::HashMap;

use crate::transactor::HandlerFn;

pub mod connection;
pub mod entry;
pub mod game;
pub mod lobby;

/// The 4-character transaction codes.
pub mod codes {
    pub const CONN: &str = "CONN";
    pub const USER: &str = "USER";
    pub const ECHO: &str = "ECHO";
    pub const PING: &str = "PING";
    pub const LLST: &str = "LLST";
    pub const GLST: &str = "GLST";
    pub const GDAT: &str = "GDAT";
    pub const GDET: &str = "GDET";
    pub const LDAT: &str = "LDAT";
    pub const CGAM: &str = "CGAM";
    pub const UBRA: &str = "UBRA";
    pub const UGAM: &str = "UGAM";
    pub const UGDE: &str = "UGDE";
    pub const EGAM: &str = "EGAM";
    pub const EGRS: &str = "EGRS";
    pub const EGEG: &str = "EGEG";
    pub const EGRQ: &str = "EGRQ";
    pub const PENT: &str = "PENT";
    pub const PLVT: &str = "PLVT";
    pub const ECNL: &str = "ECNL";
    pub const QLEN: &str = "QLEN";
    pub const KICK: &str = "KICK";
}

/// Builds the static code-to-handler table, resolved once at startup.
pub fn handler_table() -> HashMap<&'static str, HandlerFn> {
    let mut table: HashMap<&'static str, HandlerFn> = HashMap::new();
    table.insert(codes::CONN, connection::connect);
    table.insert(codes::USER, connection::login);
    table.insert(codes::ECHO, connection::echo);
    table.insert(codes::PING, connection::ping);
    table.insert(codes::LLST, lobby::lobby_list);
    table.insert(codes::GLST, lobby::game_list);
    table.insert(codes::GDAT, lobby::game_details);
    table.insert(codes::CGAM, game::create_game);
    table.insert(codes::UBRA, game::update_bracket);
    table.insert(codes::UGAM, game::update_game_data);
    table.insert(codes::UGDE, game::update_game_details);
    table.insert(codes::EGAM, entry::enter_game_request);
    table.insert(codes::EGRS, entry::enter_game_host_response);
    table.insert(codes::PENT, entry::player_entered);
    table.insert(codes::PLVT, entry::player_exited);
    table.insert(codes::ECNL, entry::leave_game);
    table
}
