pub mod distributions;
pub mod error;
pub mod pareto_cnbd;
pub mod pareto_nbd;
pub mod quadrature;
pub mod slice;
