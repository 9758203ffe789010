pub mod cin;
pub mod domain;
pub mod error;
pub mod protocol;
