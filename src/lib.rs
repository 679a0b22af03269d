//! D-efficient experimental designs for discrete choice experiments.
//!
//! The crate searches for a design matrix (one row per choice situation, one
//! column per attribute of each alternative) that minimizes the D-error of a
//! multinomial logit model evaluated at prior parameter values. It offers tools to
//!
//! - declare attributes, priors and alternative-specific constants (`attributes` module),
//! - compile row conditions such as `if alt1_time > 20 then alt1_price < 3` (`conditions` module),
//! - generate level-balanced initial designs (`generation` module),
//! - score designs by local or Bayesian D-error (`model`, `integration`, `criterion` modules),
//! - refine a design with the random swapping algorithm (`swapping` module), and
//! - run the whole pipeline with blocking and a utility-balance report (`design` module).
//!
//! # Quick start
//!
//! ```no_run
//! use choicedesign::attributes::{Asc, Attribute, DesignLayoutBuilder};
//! use choicedesign::{DesignOptions, RumDesign};
//!
//! let attributes = vec![
//!     Attribute::numeric("price", vec![2.0, 4.0, 6.0], -0.3),
//!     Attribute::numeric("time", vec![10.0, 20.0, 30.0], -0.05),
//!     Attribute::dummy("comfort", Attribute::levels(3), vec![0.4, 0.8]),
//! ];
//! let layout = DesignLayoutBuilder::new(attributes, 2)
//!     .optout(true)
//!     .asc(Asc::new(3, -0.5))
//!     .build()
//!     .expect("valid layout");
//!
//! let design = RumDesign::new(layout, 12).expect("at least two choice situations");
//! let options = DesignOptions::default()
//!     .with_condition("if alt1_time > 20 then alt1_price < 6")
//!     .with_blocks(2)
//!     .with_no_improvement_limit(2_000)
//!     .with_seed(42);
//!
//! let result = design.optimise(&options).expect("optimised design");
//! println!("D-error: {} -> {}", result.initial_d_error, result.final_d_error);
//! println!("{:?}", result.table.columns());
//! ```

pub mod attributes;
pub mod balance;
pub mod blocking;
pub mod conditions;
pub mod criterion;
pub mod design;
pub mod error;
pub mod generation;
pub mod integration;
pub mod model;
pub mod options;
pub mod swapping;

pub use attributes::{Asc, Attribute, Coding, DesignLayout, DesignLayoutBuilder, Parameter};
pub use criterion::{d_error, DesignCriterion, ModelEvaluator};
pub use design::{DesignResult, DesignTable, RumDesign};
pub use error::{DesignError, Result};
pub use options::DesignOptions;
pub use swapping::{StopReason, SwapOptions, SwapSearch, SwapSummary};
