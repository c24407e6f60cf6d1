pub mod proxy;
pub mod saga;
pub mod status;
