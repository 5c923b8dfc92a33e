//! The `svn://` wire protocol: item codec, connection and response parsers.

pub(crate) mod conn;
pub(crate) mod edit;
mod item;
pub(crate) mod parse;

pub use item::SvnItem;

pub(crate) use item::{encode_command, encode_item};
