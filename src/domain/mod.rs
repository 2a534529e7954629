//! Domain layer: decision contracts, validation and the gateway seams

pub mod decision;
pub mod gateway;
pub mod news;
pub mod plan;
