//! Graph analysis of a registry and scenario studies driven through the façade.
pub mod calibration;
pub mod policy;
pub mod sensitivity;
pub mod topology;
