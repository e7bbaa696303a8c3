//! Domain model module declarations.

pub mod delivery;
pub mod earnings;
pub mod location;
pub mod message;
pub mod offer;
