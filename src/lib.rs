// Library root
// -----------
// Client and service for a small personal journal. The binary (`main.rs`)
// wires these modules into an interactive command loop.
//
// Module responsibilities:
// - `api`: single HTTP calls against the gateway plus the retry policy.
// - `classify`: maps a status envelope to one outcome, shared by all commands.
// - `model`: wire payloads and the table of remote operations.
// - `session`: the resolved user id and base URL used by every command.
// - `ui`: console boundary and the command dispatcher loop.
// - `actions`: one client-side handler per command.
// - `server`: request handlers backing each operation, and an in-process
//   gateway that serves them without a network.
// - `db`: SQLite schema and row primitives.
// - `config` / `cli`: INI config file and command line.
pub mod actions;
pub mod api;
pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod model;
pub mod server;
pub mod session;
pub mod ui;
