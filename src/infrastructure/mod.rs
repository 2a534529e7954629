//! Infrastructure layer: concrete clients for the external collaborators

pub mod binance;
pub mod news;
pub mod oracle;
