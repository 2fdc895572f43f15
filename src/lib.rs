pub mod canvas;
pub mod compile;
pub mod controller;
pub mod gui;
pub mod loader;
pub mod logging;
pub mod settings;
pub mod synth;
