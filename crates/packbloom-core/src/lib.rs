pub mod bloom;
pub mod commands;
pub mod config;
pub mod enumerate;
pub mod index;
pub mod lookup;
pub mod maintenance;
pub mod reconcile;
pub mod store;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
