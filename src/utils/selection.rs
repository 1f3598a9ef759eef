// src/utils/selection.rs

use crate::{
    config::{SIMULATION_MULTIPLE_COUNT, SIMULATION_SINGLE_COUNT},
    error::AppError,
};

/// Fails unless the topic can fill the simulation profile.
pub fn ensure_simulation_capacity(single_available: usize, multiple_available: usize) -> Result<(), AppError> {
    if single_available < SIMULATION_SINGLE_COUNT || multiple_available < SIMULATION_MULTIPLE_COUNT {
        return Err(AppError::Capacity(format!(
            "Insufficient questions for a simulation test: need {} single-answer and {} multi-answer, topic has {} and {}",
            SIMULATION_SINGLE_COUNT, SIMULATION_MULTIPLE_COUNT, single_available, multiple_available
        )));
    }
    Ok(())
}

/// Builds the simulation question order: the single-answer block, then the multi-answer block.
pub fn assemble_simulation(single: &[i64], multiple: &[i64]) -> Result<Vec<i64>, AppError> {
    ensure_simulation_capacity(single.len(), multiple.len())?;

    let mut ordered = Vec::with_capacity(SIMULATION_SINGLE_COUNT + SIMULATION_MULTIPLE_COUNT);
    ordered.extend_from_slice(&single[..SIMULATION_SINGLE_COUNT]);
    ordered.extend_from_slice(&multiple[..SIMULATION_MULTIPLE_COUNT]);
    Ok(ordered)
}

/// Standard tests take whatever prefix the topic offers, but never nothing.
pub fn ensure_standard_selection(selected: &[i64]) -> Result<(), AppError> {
    if selected.is_empty() {
        return Err(AppError::Capacity(
            "The topic has no questions yet".to_string(),
        ));
    }
    Ok(())
}
