//! Blocking client for RESP key-value servers.
//!
//! A [`Connection`] runs one command at a time over a timeout-bounded
//! socket; a [`ConnectionPool`] hands connections out to many threads and
//! evicts the ones that fail at the connection level. [`Connection::lock`]
//! and [`Connection::unlock`] build a distributed mutex on top.
//!
//! ```no_run
//! use kvlink::{ConnectionConfig, ConnectionPool};
//!
//! let pool = ConnectionPool::new(ConnectionConfig::from_url("redis://127.0.0.1:6379/0")?);
//! let mut conn = pool.get()?;
//! conn.set("greeting", "hello")?;
//! assert_eq!(conn.get("greeting")?, "hello");
//! # Ok::<(), kvlink::KvError>(())
//! ```

pub mod command;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod lock;
pub mod resp;
pub mod runtime;

pub use command::Command;
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionPool, PooledConnection};
pub use error::{KvError, Result};
pub use lock::LockId;
pub use resp::RespValue;
