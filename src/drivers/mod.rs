//! Hardware initialisation, GPIO/ADC helpers and the reset button.

pub mod hw_init;
pub mod reset_button;
