//! Reference models expressed as kernel data.
pub mod freight;
