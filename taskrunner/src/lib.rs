//! Consumidor de la cola de NBGWAS: toma tareas de `submitted`, consigue la
//! red, llama al motor de propagación y deja el resultado en `done`.

pub mod config;
pub mod engine;
pub mod fetch;
pub mod runner;

pub use config::RunnerArgs;
pub use engine::{CommandPropagator, PropagationInput, Propagator};
pub use fetch::{FetchError, HttpNetworkFetcher, NetworkFetcher, NetworkFormat};
pub use runner::{RunnerError, RunnerSettings, TaskRunner};
