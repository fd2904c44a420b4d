// Host account database module
pub mod roster;

pub use roster::Roster;
