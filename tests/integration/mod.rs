//! Integration tests for feed joining, generation and activation

mod activation_runs;
mod end_to_end;
mod feed_join;
mod generation_properties;
mod rule_selection;
mod structure_generation;
mod test_utils;
