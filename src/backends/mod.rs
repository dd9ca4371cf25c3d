//! Built-in recognizer backends.

pub mod whisper;
