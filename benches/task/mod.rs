pub mod delivery;
pub mod frame;
