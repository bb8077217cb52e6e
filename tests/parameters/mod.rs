//! Integration tests for the parameter system
//!
//! These tests verify parameter definitions and the transforms between the
//! model, control, active-control and numeric spaces.

// Tests for ParameterRecord / ParameterInfo
mod definition_tests;

// Tests for the transform chain
mod transform_tests;
