mod controller;
pub mod cpu;
pub mod freezer;
pub mod manager;
pub mod memory;
pub mod pids;
pub mod util;
