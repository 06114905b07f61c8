pub mod pool;
pub mod tcp;
pub mod transport;

pub use pool::{ConnectionPool, PooledConnection};
pub use tcp::Connection;
pub use transport::Transport;
