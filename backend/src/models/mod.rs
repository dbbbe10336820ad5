pub mod connections;

pub use connections::{
    Connection, ConnectionRow, ConnectionStatus, ModelError, ViewerStatus, ordered_pair,
};
