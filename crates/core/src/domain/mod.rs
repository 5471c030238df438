pub mod currency;
pub mod snapshot;
pub mod subscription;
