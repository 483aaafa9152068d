//! Matching engine: candidate generation, cost scoring, assignment, and
//! batch route planning, pulled together by the `scheduler` crate's fast
//! and batch ticks.

pub mod acceptance;
pub mod batch;
pub mod candidates;
pub mod costs;
pub mod eta;
pub mod solver_mcf;
pub mod types;

pub use acceptance::p_accept;
pub use batch::{cluster_jobs, nn_order_stops, pick_best_driver, plan_routes, build_time_matrix, PlannedRoute};
pub use candidates::generate_candidates;
pub use costs::{compute_cost, CostBreakdown};
pub use eta::refine_edges_with_router;
pub use solver_mcf::{solve_min_cost_flow, Match};
pub use types::{CostWeights, DispatchParams, DispatchSnapshot, Edge, Job};
