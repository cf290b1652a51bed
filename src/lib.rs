// ev3car runtime: UDP drive commands -> steering and traction motors
pub mod config;
pub mod interpreter;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod tracker;
pub mod transport;
