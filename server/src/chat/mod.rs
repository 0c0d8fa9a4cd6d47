pub mod broadcast;
pub mod presence;
