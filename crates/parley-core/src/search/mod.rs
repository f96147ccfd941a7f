pub mod config;
pub mod controller;
pub mod request;

#[cfg(test)]
mod tests;
