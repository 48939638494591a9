//! File adapters used by the command-line front end. The numeric core never
//! touches the filesystem.

pub mod history;
pub mod samples;
pub mod text;
