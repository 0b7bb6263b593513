pub mod backend;
pub mod content;
pub mod geometry;
pub mod layout;
pub mod table;
