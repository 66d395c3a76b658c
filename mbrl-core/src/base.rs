//! Interfaces of the collaborators driven by the trainer.
mod agent;
mod dynamics;
mod env;
mod space;
pub use agent::Agent;
pub use dynamics::{DynamicsModel, DynamicsPredictor, Prediction};
pub use env::{Env, Step};
pub use space::BoxSpace;
