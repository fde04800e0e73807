// src/models/mod.rs

pub mod answer;
pub mod event;
pub mod progress;
pub mod question;
pub mod user;
