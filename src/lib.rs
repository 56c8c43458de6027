//! Configuration-driven statistics over multivariate datasets.
//!
//! A YAML/JSON configuration names statistics (dataset → matrix), reducers
//! (matrix → scalar or vector) and reduced statistics (dataset → values). The
//! [`config::SchemeBuilder`] resolves each entry through a
//! [`registry::Resolver`], validates its parameters and instantiates it. A
//! [`calculator::Calculator`] then runs the resulting [`config::Scheme`] on a
//! [`data::Dataset`], memoizing every result in a
//! [`cache::ComputationCache`], and assembles a [`calculator::ResultsTable`].
//!
//! ```no_run
//! use rusty_spoc::{load_file, Calculator, LoadOptions, Scheme};
//!
//! # fn main() -> anyhow::Result<()> {
//! let scheme = Scheme::from_yaml_file("default", "config.yaml")?;
//! let dataset = load_file("data.csv".as_ref(), &LoadOptions::default())?;
//! let mut calculator = Calculator::new(dataset);
//! println!("{}", calculator.compute(&scheme));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod calculator;
pub mod component;
pub mod config;
pub mod data;
pub mod error;
pub mod library;
pub mod registry;

pub use calculator::{Calculator, ResultsTable};
pub use config::{Scheme, SchemeBuilder};
pub use data::{load_file, Dataset, LoadOptions};
pub use error::{ComputeError, ConfigError};
pub use registry::Resolver;
