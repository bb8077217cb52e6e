//! Tests for the solver components


// Change limits, bounds and freezing
mod constraint_tests;
