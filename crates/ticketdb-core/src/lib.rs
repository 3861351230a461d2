//! ticketdb Core - data-store abstractions shared by the ticketing data layer
//!
//! This crate defines the downstream side of the connection pool. It provides:
//!
//! - `Connection` - Trait for one physical data-store connection
//! - `Transaction` - Trait for the store's atomic-transaction facility
//! - `PreparedStatement` - Trait for statements prepared on a connection
//! - Common types like `Value`, `Row`, `QueryResult`, `StatementResult`
//!
//! Nothing here interprets SQL. Query text and parameters are passed through
//! to the driver untouched.

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
