//! API handlers module

pub mod health;
pub mod join;
pub mod relays;
pub mod rooms;
pub mod tenants;
