pub mod collaborators;
pub mod compose;
pub mod compose_utils;
pub mod config;
pub mod error;
pub mod preflight;
pub mod utils;
pub mod utxo;
