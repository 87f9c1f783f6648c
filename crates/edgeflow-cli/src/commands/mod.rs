pub mod compile;
pub mod gate;
pub mod rollout;
pub mod verify;
