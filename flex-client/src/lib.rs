pub mod domain;
pub mod table;
