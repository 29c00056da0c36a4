mod connection;
mod diagnostics;
mod gateway;
mod query;

pub use connection::*;
pub use diagnostics::*;
pub use gateway::*;
pub use query::*;
