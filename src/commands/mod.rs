pub mod analyze;
pub mod compare;
pub mod embed;
mod inputs;
mod session;
pub mod sweep;
