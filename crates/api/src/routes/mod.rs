pub mod applications;
pub mod breakers;
pub mod health;
pub mod metrics;
pub mod sagas;
