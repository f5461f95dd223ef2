pub mod app;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod filter;
pub mod logging;
pub mod output;
pub mod runner;
pub mod scanner;
pub mod utils;
pub mod wordlist;

#[cfg(test)]
mod tests;
