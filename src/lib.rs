pub mod app;
pub mod bridge;
pub mod config;
pub mod context;
pub mod net;
pub mod platform;
pub mod reward;
pub mod session;

#[cfg(test)]
mod test_support;
