pub mod coalition;
pub mod kernel_shap;
pub mod solver;

pub use coalition::{kernel_weight, CoalitionPlan};
pub use kernel_shap::{KernelAttributor, KernelShapConfig, KernelShapSamples};
pub use solver::solve_constrained;
